use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures talking to a hosted embedding or generation service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Transport-level failure (connect, DNS, TLS, body read)
    #[error("request to {provider} failed: {message}")]
    Request { provider: String, message: String },

    /// Non-2xx response
    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    /// 2xx response that could not be decoded
    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("{provider} timed out after {}s", .after.as_secs_f32())]
    Timeout { provider: String, after: Duration },

    /// Missing credentials or endpoint
    #[error("{provider} is not configured: {message}")]
    NotConfigured { provider: String, message: String },
}

impl ProviderError {
    pub fn request(provider: &str, err: impl std::fmt::Display) -> Self {
        Self::Request {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }

    pub fn invalid_response(provider: &str, err: impl std::fmt::Display) -> Self {
        Self::InvalidResponse {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

/// Errors raised by the retrieval pipeline.
#[derive(Error, Debug)]
pub enum RagError {
    /// Invalid chunking parameters or retrieval settings
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Persisted index exists but cannot be read. Remediation is deleting
    /// the index directory; it is never repaired automatically.
    #[error("vector index at {path} is unreadable: {reason}")]
    IndexCorruption { path: PathBuf, reason: String },

    #[error("index storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type RagResult<T> = std::result::Result<T, RagError>;
