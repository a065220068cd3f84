//! Access-control store error types.

use thiserror::Error;

/// Result type for access-control operations.
pub type AclResult<T> = Result<T, AclError>;

/// Errors that can occur talking to the access-control store.
#[derive(Debug, Error)]
pub enum AclError {
    #[error("Failed to configure access-control client: {0}")]
    ConfigError(String),

    #[error("Access-control store returned {status}: {detail}")]
    RequestFailed { status: u16, detail: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl AclError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn from_http_status(status: u16, detail: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            detail: detail.into(),
        }
    }

    /// HTTP status reported by the store, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AclError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}
