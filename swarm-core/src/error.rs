//! Core error types

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while building or validating domain values
#[derive(Debug, Error)]
pub enum CoreError {
    /// A benchmark request failed validation
    #[error("Invalid benchmark request {id}: {reason}")]
    InvalidRequest { id: u64, reason: String },

    /// The target could not be turned into a URL
    #[error("Invalid target URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
