use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerdictError {
    // Graph construction errors (build time only)
    #[error("Graph construction error: {0}")]
    GraphConstruction(String),

    #[error("Pipeline needs at least one root node")]
    EmptyPipeline,

    // Generation backend errors
    #[error("No generation backend registered for model: {0}")]
    UnknownModel(String),

    #[error("Generation failed: {model}: {message}")]
    GenerationFailed {
        model: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Generation response parse error: {0}")]
    GenerationParse(String),

    // Retrieval errors
    #[error("Search throttled (HTTP {status}) after {attempts} attempts")]
    RetrievalThrottled { status: u16, attempts: u32 },

    #[error("Search returned HTTP {0}")]
    RetrievalStatus(u16),

    #[error("Search request failed: {0}")]
    RetrievalTransport(String),

    #[error("Search response parse error: {0}")]
    RetrievalParse(String),

    // Evaluation errors
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

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

impl VerdictError {
    /// Whether a generation failure is worth retrying (throttling, server
    /// overload, or a broken connection).
    pub fn is_retryable_generation(&self) -> bool {
        match self {
            VerdictError::GenerationFailed { status, message, .. } => match status {
                Some(code) => matches!(code, 429 | 500 | 502 | 503),
                None => {
                    let msg = message.to_lowercase();
                    msg.contains("timeout") || msg.contains("connection")
                }
            },
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, VerdictError>;
