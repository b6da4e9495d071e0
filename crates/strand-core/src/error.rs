use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrandError {
    // Chat completion errors
    #[error("Chat request failed: {0}")]
    ChatRequest(String),

    #[error("Chat response parse error: {0}")]
    ChatParse(String),

    #[error("Chat provider not supported: {0}")]
    UnsupportedProvider(String),

    // Graph errors
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Invalid connection {source_id} -> {target_id}: {reason}")]
    InvalidConnection {
        source_id: String,
        target_id: String,
        reason: String,
    },

    // Expression errors
    #[error("Expression error at {position}: {message}")]
    Expression { position: usize, message: String },

    // Execution errors
    #[error("No behavior registered for node type: {0}")]
    UnknownNodeType(String),

    #[error("Node {node_id} failed: {message}")]
    NodeExecution { node_id: String, message: String },

    #[error("Node {node_id} timed out after {timeout_secs}s")]
    NodeTimeout { node_id: String, timeout_secs: u64 },

    #[error("Merge node {node_id} waited more than {timeout_secs}s for incoming branches")]
    MergeTimeout { node_id: String, timeout_secs: u64 },

    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StrandError {
    /// Shorthand for a processor-reported failure.
    pub fn node(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeExecution {
            node_id: node_id.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StrandError>;
