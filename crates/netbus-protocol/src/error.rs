//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur during protocol operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Delimiter cannot be used to separate JSON frames.
    #[error("invalid delimiter {delimiter:?}: {reason}")]
    InvalidDelimiter {
        delimiter: String,
        reason: &'static str,
    },

    /// Peer sent more bytes than allowed without a delimiter.
    #[error("frame too large: {size} bytes buffered without a delimiter (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Failed to serialize a frame to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Creates an invalid delimiter error.
    pub fn invalid_delimiter(delimiter: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidDelimiter {
            delimiter: delimiter.into(),
            reason,
        }
    }

    /// Returns true if the connection that produced this error must be closed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. })
    }
}
