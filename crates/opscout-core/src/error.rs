use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpscoutError {
    // Scoring errors
    #[error("Score validation failed: {0}")]
    Validation(String),

    // Analysis errors
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    // Gateway errors
    #[error("External service error: {service}: {message}")]
    ExternalService { service: String, message: String },

    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("Knowledge query failed: {0}")]
    KnowledgeQuery(String),

    #[error("Embedding request failed: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Database(String),

    // Engine errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Duplicate node identity: {0}")]
    DuplicateNode(String),

    #[error("Node '{node}' depends on unknown node '{predecessor}'")]
    UnknownPredecessor { node: String, predecessor: String },

    #[error("Dependency cycle detected among nodes: {0}")]
    CycleDetected(String),

    #[error("Output key '{0}' written more than once")]
    DuplicateOutputKey(String),

    #[error("Node failed: {node}: {message}")]
    NodeFailed { node: String, message: String },

    #[error("Node timeout after {timeout_ms}ms: {node}")]
    NodeTimeout { node: String, timeout_ms: u64 },

    #[error("Workflow cancelled")]
    Cancelled,

    #[error("Workflow completed without a final report")]
    NoReport,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OpscoutError {
    /// Wrap a gateway failure with the name of the service that produced it.
    pub fn external(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error aborts a workflow run even when a non-fatal node raised it.
    ///
    /// Timeouts are excluded: a non-fatal node that times out degrades instead.
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::ConfigNotFound(_)
                | Self::DuplicateNode(_)
                | Self::UnknownPredecessor { .. }
                | Self::CycleDetected(_)
                | Self::DuplicateOutputKey(_)
                | Self::NodeFailed { .. }
                | Self::Cancelled
                | Self::NoReport
        )
    }
}

pub type Result<T> = std::result::Result<T, OpscoutError>;
