//! Event bus protocol for the swarm coordinator
//!
//! This crate defines the inbound messages the coordinator consumes, the
//! notifications it publishes, and a newline-delimited JSON transport used
//! to carry both.

pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use error::IpcError;
pub use protocol::{
    InboundMessage, MessageEnvelope, Notification, ProgressNotification, ResultNotification,
    PROTOCOL_VERSION,
};
pub use transport::{LineReader, LineWriter};
