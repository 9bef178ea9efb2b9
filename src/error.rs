use thiserror::Error;

/// Failures talking to the TAP endpoint (query or schema service).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("Query timed out. Try adding LIMIT or more filters.")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid JSON response: {0}")]
    MalformedBody(String),
}

impl RemoteError {
    /// Timeouts and transport hiccups are worth another attempt by the caller.
    pub fn is_retriable(&self) -> bool {
        matches!(self, RemoteError::Timeout | RemoteError::Transport(_))
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::MalformedBody(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum AnalystError {
    #[error("Invalid SQL: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Could not parse LLM response as JSON ({reason}): {response_prefix}")]
    TranslationParse {
        reason: String,
        response_prefix: String,
    },

    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Unknown table '{table}'. Available: {available:?}")]
    SchemaNotFound {
        table: String,
        available: Vec<String>,
    },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalystError>;
