use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphAgentError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    // Retrieval errors
    #[error("Retrieval backend unavailable: {0}")]
    Retrieval(String),

    // Workflow errors
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Workflow '{name}' is invalid: {reason}")]
    WorkflowInvalid { name: String, reason: String },

    #[error("Node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },

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

pub type Result<T> = std::result::Result<T, GraphAgentError>;
