//! IPC error types

use thiserror::Error;

/// IPC error types
#[derive(Debug, Error)]
pub enum IpcError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Message decoded but cannot be routed
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

impl IpcError {
    /// Whether the error is about a single message rather than the channel
    pub fn is_message_error(&self) -> bool {
        matches!(
            self,
            IpcError::DeserializationError(_) | IpcError::InvalidMessage(_)
        )
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        IpcError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            IpcError::IoError(err.to_string())
        } else if err.is_data() || err.is_syntax() || err.is_eof() {
            IpcError::DeserializationError(err.to_string())
        } else {
            IpcError::SerializationError(err.to_string())
        }
    }
}
