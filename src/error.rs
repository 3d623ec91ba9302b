use http::StatusCode;
use thiserror::Error;

/// One rejected item of an Elasticsearch bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemFailure {
    /// Position of the work in the submitted batch.
    pub position: usize,
    pub index: String,
    pub id: Option<String>,
    pub status: u16,
    pub reason: String,
}

impl std::fmt::Display for BulkItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {}/{}: status {} ({})",
            self.position,
            self.index,
            self.id.as_deref().unwrap_or("-"),
            self.status,
            self.reason
        )
    }
}

#[derive(Error, Debug, Clone)]
pub enum SearchSyncError {
    #[error("Field '{path}' is defined more than once")]
    FieldRedefinition { path: String },

    #[error("Invalid field name '{0}': names must be non-empty, without '.', and not start with '__'")]
    InvalidFieldName(String),

    #[error("Cannot apply an analyzer on field '{path}' of type {kind}")]
    AnalyzerOnNonTextField { path: String, kind: String },

    #[error("Cannot apply a normalizer on field '{path}' of type {kind}")]
    NormalizerOnNonStringField { path: String, kind: String },

    #[error("Cannot apply both an analyzer and a normalizer on field '{0}'")]
    AnalyzerAndNormalizer(String),

    #[error("Analyzed text field '{0}' cannot be sortable; use a normalizer instead")]
    SortableTextField(String),

    #[error("Null sentinel for field '{path}' is not a valid {kind} value")]
    InvalidNullSentinel { path: String, kind: String },

    #[error("Cannot guess field type for input type {0}")]
    UnknownValueType(String),

    #[error("Unknown analyzer or normalizer '{name}' on field '{path}'")]
    UnknownAnalyzer { path: String, name: String },

    #[error("Field handle does not belong to schema of index '{0}'")]
    ForeignFieldHandle(String),

    #[error("Multi-tenancy is enabled on backend '{0}' but no tenant id was provided")]
    MissingTenantId(String),

    #[error("Missing document identifier for a work on index '{0}'")]
    MissingIdentifier(String),

    #[error("Invalid index name '{0}'")]
    InvalidIndexName(String),

    #[error("Unsupported Elasticsearch version: {0}")]
    UnsupportedVersion(String),

    #[error("Illegal worker state: {0}")]
    IllegalState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unable to create index writer for index '{index}': {message}")]
    WriterCreation { index: String, message: String },

    #[error("Too many concurrent writers: {current} active, max {max}")]
    TooManyConcurrentWriters { current: usize, max: usize },

    #[error("Writer heap {requested} bytes outside allowed range [{min}, {max}]")]
    WriterHeapOutOfRange {
        requested: usize,
        min: usize,
        max: usize,
    },

    #[error("HTTP request {method} {path} failed with status {status}: {body}")]
    Http {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Bulk request on index '{index}' rejected {} item(s): {}", .failures.len(), format_failures(.failures))]
    BulkItems {
        index: String,
        failures: Vec<BulkItemFailure>,
    },

    #[error("Work queue full for index '{0}'")]
    QueueFull(String),

    #[error("Work orchestrator for index '{0}' is closed")]
    OrchestratorClosed(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Tantivy error: {0}")]
    Tantivy(String),

    #[error("JSON error: {0}")]
    Json(String),
}

fn format_failures(failures: &[BulkItemFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, SearchSyncError>;

/// Coarse classification of a [`SearchSyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Detected at schema-build or bootstrap time; never retried.
    Configuration,
    /// Surfaced through a failed future at execution time.
    Backend,
    /// Some items of a batch were rejected by the backend.
    PartialBatch,
}

impl From<std::io::Error> for SearchSyncError {
    fn from(e: std::io::Error) -> Self {
        SearchSyncError::Io(e.to_string())
    }
}

impl From<tantivy::TantivyError> for SearchSyncError {
    fn from(e: tantivy::TantivyError) -> Self {
        SearchSyncError::Tantivy(e.to_string())
    }
}

impl From<tantivy::directory::error::OpenDirectoryError> for SearchSyncError {
    fn from(e: tantivy::directory::error::OpenDirectoryError) -> Self {
        SearchSyncError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SearchSyncError {
    fn from(e: serde_json::Error) -> Self {
        SearchSyncError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for SearchSyncError {
    fn from(e: reqwest::Error) -> Self {
        SearchSyncError::Transport(e.to_string())
    }
}

impl SearchSyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchSyncError::FieldRedefinition { .. }
            | SearchSyncError::InvalidFieldName(_)
            | SearchSyncError::AnalyzerOnNonTextField { .. }
            | SearchSyncError::NormalizerOnNonStringField { .. }
            | SearchSyncError::AnalyzerAndNormalizer(_)
            | SearchSyncError::SortableTextField(_)
            | SearchSyncError::InvalidNullSentinel { .. }
            | SearchSyncError::UnknownValueType(_)
            | SearchSyncError::UnknownAnalyzer { .. }
            | SearchSyncError::ForeignFieldHandle(_)
            | SearchSyncError::MissingTenantId(_)
            | SearchSyncError::MissingIdentifier(_)
            | SearchSyncError::InvalidIndexName(_)
            | SearchSyncError::UnsupportedVersion(_)
            | SearchSyncError::IllegalState(_)
            | SearchSyncError::Config(_)
            | SearchSyncError::WriterHeapOutOfRange { .. } => ErrorKind::Configuration,
            SearchSyncError::BulkItems { .. } => ErrorKind::PartialBatch,
            SearchSyncError::WriterCreation { .. }
            | SearchSyncError::TooManyConcurrentWriters { .. }
            | SearchSyncError::Http { .. }
            | SearchSyncError::Transport(_)
            | SearchSyncError::QueueFull(_)
            | SearchSyncError::OrchestratorClosed(_)
            | SearchSyncError::Io(_)
            | SearchSyncError::Tantivy(_)
            | SearchSyncError::Json(_) => ErrorKind::Backend,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    /// HTTP status an integration layer should report for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            SearchSyncError::Http { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            SearchSyncError::Transport(_) => StatusCode::BAD_GATEWAY,
            SearchSyncError::BulkItems { .. } => StatusCode::MULTI_STATUS,
            SearchSyncError::QueueFull(_) | SearchSyncError::TooManyConcurrentWriters { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SearchSyncError::OrchestratorClosed(_)
            | SearchSyncError::WriterCreation { .. }
            | SearchSyncError::Io(_)
            | SearchSyncError::Tantivy(_)
            | SearchSyncError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SearchSyncError::MissingTenantId(_)
            | SearchSyncError::MissingIdentifier(_)
            | SearchSyncError::IllegalState(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
