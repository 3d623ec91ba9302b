use crate::error::{Result, SearchSyncError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which physical backend the indexes live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Tantivy,
    Elasticsearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiTenancyConfig {
    #[default]
    None,
    Discriminator,
}

/// What happens to an index when its manager is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleStrategy {
    /// Assume the index exists.
    None,
    /// Create the index if it does not exist yet.
    #[default]
    Create,
    /// Drop any existing index, then create it.
    DropAndCreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryKind {
    #[default]
    Heap,
    Filesystem,
}

/// When the stream path commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Commits are coalesced by the orchestrator (threshold, interval, flush).
    #[default]
    Deferred,
    /// Every streamed work is committed before its future resolves.
    PerOperation,
}

fn parse_enum<T: for<'de> Deserialize<'de>>(var: &str, raw: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase()))
        .map_err(|_| SearchSyncError::Config(format!("Invalid {}: {}", var, raw)))
}

macro_rules! impl_from_str {
    ($($ty:ty => $var:literal),* $(,)?) => {
        $(impl FromStr for $ty {
            type Err = SearchSyncError;

            fn from_str(s: &str) -> Result<Self> {
                parse_enum($var, s)
            }
        })*
    };
}

impl_from_str!(
    BackendKind => "backend kind",
    MultiTenancyConfig => "multi-tenancy strategy",
    LifecycleStrategy => "lifecycle strategy",
    DirectoryKind => "directory kind",
    CommitPolicy => "commit policy",
);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Pretty-print JSON request and response bodies in debug logs.
    pub pretty_json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub url: String,
    /// Skips version detection when set (e.g. `"7.10.2"`).
    pub version: Option<String>,
    pub request_timeout_ms: u64,
    pub max_bulk_size: usize,
    pub queue_capacity: usize,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        ElasticsearchConfig {
            url: "http://localhost:9200".to_string(),
            version: None,
            request_timeout_ms: 30_000,
            max_bulk_size: 250,
            queue_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TantivyConfig {
    pub directory: DirectoryKind,
    /// Parent directory of the per-index directories (filesystem only).
    pub root: Option<PathBuf>,
    pub writer_heap_bytes: usize,
    pub writer_threads: usize,
    pub commit_interval_ms: u64,
    pub commit_threshold: usize,
    pub queue_capacity: usize,
    pub commit_policy: CommitPolicy,
    pub max_concurrent_writers: usize,
}

impl Default for TantivyConfig {
    fn default() -> Self {
        TantivyConfig {
            directory: DirectoryKind::Heap,
            root: None,
            writer_heap_bytes: 50_000_000,
            writer_threads: 1,
            commit_interval_ms: 100,
            commit_threshold: 10,
            queue_capacity: 1000,
            commit_policy: CommitPolicy::Deferred,
            max_concurrent_writers: 40,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub backend: BackendKind,
    pub multi_tenancy: MultiTenancyConfig,
    pub lifecycle: LifecycleStrategy,
    pub log: LogConfig,
    pub elasticsearch: ElasticsearchConfig,
    pub tantivy: TantivyConfig,
}

fn env_parse<T: FromStr>(var: &str) -> Result<Option<T>> {
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SearchSyncError::Config(format!("Invalid {}: {}", var, raw))),
        _ => Ok(None),
    }
}

impl BackendConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BackendConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build a configuration from `SEARCHSYNC_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> Result<Self> {
        let mut config = BackendConfig::default();

        if let Some(v) = env_parse("SEARCHSYNC_BACKEND")? {
            config.backend = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_MULTI_TENANCY")? {
            config.multi_tenancy = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_LIFECYCLE")? {
            config.lifecycle = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_LOG_PRETTY_JSON")? {
            config.log.pretty_json = v;
        }

        let es = &mut config.elasticsearch;
        if let Ok(url) = env::var("SEARCHSYNC_ES_URL") {
            es.url = url;
        }
        if let Ok(version) = env::var("SEARCHSYNC_ES_VERSION") {
            es.version = Some(version);
        }
        if let Some(v) = env_parse("SEARCHSYNC_ES_REQUEST_TIMEOUT_MS")? {
            es.request_timeout_ms = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_ES_MAX_BULK_SIZE")? {
            es.max_bulk_size = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_ES_QUEUE_CAPACITY")? {
            es.queue_capacity = v;
        }

        let tv = &mut config.tantivy;
        if let Some(v) = env_parse("SEARCHSYNC_TANTIVY_DIRECTORY")? {
            tv.directory = v;
        }
        if let Ok(root) = env::var("SEARCHSYNC_TANTIVY_ROOT") {
            tv.root = Some(PathBuf::from(root));
        }
        if let Some(v) = env_parse("SEARCHSYNC_TANTIVY_WRITER_HEAP_BYTES")? {
            tv.writer_heap_bytes = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_TANTIVY_WRITER_THREADS")? {
            tv.writer_threads = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_TANTIVY_COMMIT_INTERVAL_MS")? {
            tv.commit_interval_ms = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_TANTIVY_COMMIT_THRESHOLD")? {
            tv.commit_threshold = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_TANTIVY_QUEUE_CAPACITY")? {
            tv.queue_capacity = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_TANTIVY_COMMIT_POLICY")? {
            tv.commit_policy = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_TANTIVY_MAX_CONCURRENT_WRITERS")? {
            tv.max_concurrent_writers = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let es = &self.elasticsearch;
        if es.max_bulk_size == 0 {
            return Err(SearchSyncError::Config(
                "elasticsearch.max_bulk_size must be at least 1".into(),
            ));
        }
        if es.queue_capacity == 0 || self.tantivy.queue_capacity == 0 {
            return Err(SearchSyncError::Config(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if !es.url.starts_with("http://") && !es.url.starts_with("https://") {
            return Err(SearchSyncError::Config(format!(
                "elasticsearch.url must be an http(s) URL, got: {}",
                es.url
            )));
        }

        let tv = &self.tantivy;
        if tv.writer_threads == 0 {
            return Err(SearchSyncError::Config(
                "tantivy.writer_threads must be at least 1".into(),
            ));
        }
        if tv.commit_threshold == 0 {
            return Err(SearchSyncError::Config(
                "tantivy.commit_threshold must be at least 1".into(),
            ));
        }
        if tv.directory == DirectoryKind::Filesystem && tv.root.is_none() {
            return Err(SearchSyncError::Config(
                "tantivy.root is required for the filesystem directory".into(),
            ));
        }
        Ok(())
    }
}
