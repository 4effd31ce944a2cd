//! Client error types.

use thiserror::Error;

use netbus_protocol::ProtocolError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Framing or delimiter error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection to server failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Operation timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arguments could not be converted to JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<netbus_server::ServerError> for ClientError {
    fn from(err: netbus_server::ServerError) -> Self {
        match err {
            netbus_server::ServerError::Io(err) => Self::Io(err),
            netbus_server::ServerError::Protocol(err) => Self::Protocol(err),
            other => Self::Config(other.to_string()),
        }
    }
}
