//! Multi-tenancy strategies.

use crate::config::MultiTenancyConfig;
use crate::error::{Result, SearchSyncError};
use serde_json::{json, Map, Value};

/// JSON field carrying the tenant of an Elasticsearch document.
pub const TENANT_ID_FIELD: &str = "__HSearch_TenantId";
/// JSON field carrying the mapper's identifier of an Elasticsearch document.
pub const ID_FIELD: &str = "__HSearch_Id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultiTenancyStrategy {
    #[default]
    None,
    /// All tenants share one index; documents carry a tenant discriminator.
    Discriminator,
}

impl From<MultiTenancyConfig> for MultiTenancyStrategy {
    fn from(config: MultiTenancyConfig) -> Self {
        match config {
            MultiTenancyConfig::None => MultiTenancyStrategy::None,
            MultiTenancyConfig::Discriminator => MultiTenancyStrategy::Discriminator,
        }
    }
}

impl MultiTenancyStrategy {
    pub fn is_multi_tenancy_supported(&self) -> bool {
        matches!(self, MultiTenancyStrategy::Discriminator)
    }

    /// Fails when a tenant is required but absent. A tenant supplied without
    /// multi-tenancy is ignored.
    pub fn check_tenant_id(&self, tenant_id: Option<&str>, backend_name: &str) -> Result<()> {
        match (self, tenant_id) {
            (MultiTenancyStrategy::Discriminator, None) => {
                Err(SearchSyncError::MissingTenantId(backend_name.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// The tenant to stamp on documents, `None` when tenancy is disabled.
    pub fn effective_tenant<'a>(&self, tenant_id: Option<&'a str>) -> Option<&'a str> {
        match self {
            MultiTenancyStrategy::None => None,
            MultiTenancyStrategy::Discriminator => tenant_id,
        }
    }

    pub fn to_elasticsearch_id(&self, tenant_id: Option<&str>, id: &str) -> String {
        match self.effective_tenant(tenant_id) {
            Some(tenant) => format!("{}_{}", tenant, id),
            None => id.to_string(),
        }
    }

    pub fn from_elasticsearch_id(&self, tenant_id: Option<&str>, elasticsearch_id: &str) -> String {
        let Some(tenant) = self.effective_tenant(tenant_id) else {
            return elasticsearch_id.to_string();
        };
        match elasticsearch_id
            .strip_prefix(tenant)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            Some(id) => id.to_string(),
            None => {
                tracing::warn!(
                    "document id '{}' does not belong to tenant '{}'",
                    elasticsearch_id,
                    tenant
                );
                elasticsearch_id.to_string()
            }
        }
    }

    /// Append the discriminator and identifier fields, in that order.
    pub fn contribute_to_document(
        &self,
        document: &mut Map<String, Value>,
        tenant_id: Option<&str>,
        id: &str,
    ) {
        if let Some(tenant) = self.effective_tenant(tenant_id) {
            document.insert(TENANT_ID_FIELD.to_string(), Value::String(tenant.to_string()));
            document.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        }
    }

    pub fn contribute_to_mapping(&self, properties: &mut Map<String, Value>) {
        if self.is_multi_tenancy_supported() {
            properties.insert(TENANT_ID_FIELD.to_string(), json!({"type": "keyword"}));
            properties.insert(ID_FIELD.to_string(), json!({"type": "keyword"}));
        }
    }

    /// Restrict an Elasticsearch query to one tenant's documents.
    pub fn decorate_json_query(&self, query: Value, tenant_id: Option<&str>) -> Value {
        match self.effective_tenant(tenant_id) {
            Some(tenant) => json!({
                "bool": {
                    "must": query,
                    "filter": {"term": {TENANT_ID_FIELD: tenant}}
                }
            }),
            None => query,
        }
    }
}
