//! Error types for Vigil.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error
//! chains. The envelope and admission variants are deliberately distinct so
//! that transport layers can map them to the right observable failure
//! (4xx vs. a failed-counter increment) without string matching.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Vigil operations.
pub type Result<T> = std::result::Result<T, VigilError>;

/// Main error type for Vigil.
#[derive(Error, Debug)]
pub enum VigilError {
    // Validation errors
    #[error("metric {id}: {kind} requires the `{field}` field")]
    MissingPayload { id: String, kind: &'static str, field: &'static str },

    #[error("metric id must not be empty")]
    EmptyId,

    #[error("unknown metric type: {0}")]
    UnknownKind(String),

    #[error("invalid metric payload: {0}")]
    Json(#[from] serde_json::Error),

    // Lookup errors
    #[error("metric not found: {id}")]
    NotFound { id: String },

    // Lifecycle errors
    #[error("operation aborted by shutdown")]
    Cancelled,

    // Envelope / admission errors
    #[error("payload hash mismatch")]
    HashMismatch,

    #[error("sender address {ip:?} is outside the trusted subnet")]
    Forbidden { ip: String },

    #[error("payload encryption failed: {reason}")]
    Encrypt { reason: String },

    #[error("payload decryption failed: {reason}")]
    Decrypt { reason: String },

    #[error("payload marked encrypted but no private key is loaded")]
    MissingPrivateKey,

    #[error("payload decompression failed: {reason}")]
    Decompress { reason: String },

    // Key material errors (fatal at startup)
    #[error("failed to load key {path:?}: {reason}")]
    Key { path: PathBuf, reason: String },

    // Backend errors
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("transport error: {reason}")]
    Transport { reason: String },

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    // Generic errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VigilError {
    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }

    /// Whether retrying the failed operation can reasonably succeed.
    ///
    /// Database errors are transient only when their SQLSTATE class is `08`
    /// (connection exception); transport errors are always worth a retry.
    /// Everything else (validation, auth, not-found) is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Database(sqlx::Error::Io(_)) | Self::Database(sqlx::Error::PoolTimedOut) => true,
            Self::Database(sqlx::Error::Database(db)) => {
                db.code().map(|c| c.starts_with("08")).unwrap_or(false)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_is_retryable() {
        let err = VigilError::Transport { reason: "connection refused".into() };
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_and_auth_are_permanent() {
        assert!(!VigilError::HashMismatch.is_retryable());
        assert!(!VigilError::UnknownKind("histogram".into()).is_retryable());
        assert!(!VigilError::Forbidden { ip: "10.0.0.1".into() }.is_retryable());
        assert!(!VigilError::NotFound { id: "PollCount".into() }.is_retryable());
    }
}
