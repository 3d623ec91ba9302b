use serde::{Deserialize, Serialize};

/// Tenant identifier, a plain string like `"acme"`.
pub type TenantId = String;
/// Document identifier as produced by the mapper.
pub type DocumentId = String;

/// Identifies the document an indexing call targets.
///
/// The routing key is an explicit shard-selection hint; backends that have a
/// single shard (the embedded engine) ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReference {
    pub id: DocumentId,
    pub routing_key: Option<String>,
}

impl DocumentReference {
    pub fn new(id: impl Into<String>) -> Self {
        DocumentReference {
            id: id.into(),
            routing_key: None,
        }
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }
}

/// Per-session information handed to workers when they are created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub tenant_id: Option<TenantId>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        SessionContext {
            tenant_id: Some(tenant_id.into()),
        }
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }
}

/// Operation carried by a work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    Add,
    Update,
    Delete,
    Flush,
    Refresh,
    Optimize,
    CreateIndex,
    DropIndexIfExists,
}

impl std::fmt::Display for WorkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkKind::Add => "add",
            WorkKind::Update => "update",
            WorkKind::Delete => "delete",
            WorkKind::Flush => "flush",
            WorkKind::Refresh => "refresh",
            WorkKind::Optimize => "optimize",
            WorkKind::CreateIndex => "create_index",
            WorkKind::DropIndexIfExists => "drop_index_if_exists",
        };
        f.write_str(s)
    }
}

/// A geographic point, encoded as `{"lat": .., "lon": ..}` in JSON documents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Results returned by an index manager's `search`.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// Total number of matching documents (before pagination).
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

/// A single hit, with the identifier mapped back to the mapper's identifier.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub index: String,
    pub id: DocumentId,
    pub score: Option<f32>,
    pub source: serde_json::Value,
}
