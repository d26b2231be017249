//! Error types for resprelay
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type for relay operations
#[derive(Debug, Error)]
pub enum RelayError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Encode error: {0}")]
    Encode(String),

    // -------------------------------------------------------------------------
    // Fan-out Errors
    // -------------------------------------------------------------------------
    #[error("Downstream {remote}: {reason}")]
    Downstream { remote: String, reason: String },

    #[error("Insufficient responses: {successes} of {required} required successes")]
    InsufficientResponses { successes: usize, required: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// Wrap any failure against one backend as a DownstreamError
    pub fn downstream(remote: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        RelayError::Downstream {
            remote: remote.into(),
            reason: reason.to_string(),
        }
    }

    /// True if this is an EOF hit while a frame was being read
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self, RelayError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
