//! Connection error types.

use std::io;
use thiserror::Error;

use crate::serialization::SerializationError;

/// Errors arising inside the connection layer.
///
/// None of these are surfaced synchronously to a message-sending caller;
/// they are classified into a [`CloseReason`](crate::CloseReason) and
/// observed through the disconnect notification.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to serialize or deserialize a message.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Message exceeds the maximum allowed size.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Invalid network magic bytes; the inbound stream is unrecoverable.
    #[error("Invalid network magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    /// The socket read timeout elapsed with no complete frame.
    #[error("Read timeout")]
    ReadTimeout,

    /// A framed write did not complete within the send timeout; the peer
    /// has stopped draining the stream.
    #[error("Send timeout")]
    SendTimeout,
}

impl From<SerializationError> for ConnectionError {
    fn from(err: SerializationError) -> Self {
        ConnectionError::Serialization(err.to_string())
    }
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;
