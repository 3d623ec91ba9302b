use super::client::{ElasticsearchClient, ElasticsearchRequest};
use super::work::{
    Elasticsearch5WorkFactory, Elasticsearch6WorkFactory, Elasticsearch7WorkFactory,
    ElasticsearchWorkFactory,
};
use crate::error::{Result, SearchSyncError};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
}

impl ServerVersion {
    /// Parse `"7.10.2"`, `"6.8"` or `"8.11.0-SNAPSHOT"`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.trim().split(['.', '-']);
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| SearchSyncError::UnsupportedVersion(raw.to_string()))?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Ok(ServerVersion { major, minor })
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Ask the cluster for its version (`GET /`).
pub async fn detect_version(client: &dyn ElasticsearchClient) -> Result<ServerVersion> {
    let request = ElasticsearchRequest::get("/");
    let response = client.execute(request.clone()).await?.into_result(&request)?;
    let number = response
        .body
        .pointer("/version/number")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            SearchSyncError::UnsupportedVersion(format!(
                "no version number in response: {}",
                response.body
            ))
        })?;
    let version = ServerVersion::parse(number)?;
    tracing::info!("detected Elasticsearch version {}", number);
    Ok(version)
}

/// The work factory speaking the protocol of `version`.
pub fn work_factory_for(version: ServerVersion) -> Result<Arc<dyn ElasticsearchWorkFactory>> {
    match (version.major, version.minor) {
        (5, _) | (6, 0..=1) => Ok(Arc::new(Elasticsearch5WorkFactory)),
        (6, _) => Ok(Arc::new(Elasticsearch6WorkFactory)),
        (7 | 8, _) => Ok(Arc::new(Elasticsearch7WorkFactory)),
        _ => Err(SearchSyncError::UnsupportedVersion(version.to_string())),
    }
}
