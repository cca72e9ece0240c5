use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("upstream {operation} failed: {message}")]
    Upstream {
        operation: &'static str,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl BridgeError {
    pub fn upstream(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            operation,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
