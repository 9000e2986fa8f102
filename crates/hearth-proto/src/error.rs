//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// A message could not be serialized to JSON.
    #[error("failed to serialize message: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A received line could not be parsed as a protocol message.
    #[error("failed to parse message: {0}")]
    Parse(#[source] serde_json::Error),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
