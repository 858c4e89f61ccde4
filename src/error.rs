//! Error types for the chat client.

use thiserror::Error;

/// Errors that can occur when using the chat client.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Failed to send a signal through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a signal from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol signal.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A REST request to the chat backend failed at the HTTP layer.
    #[cfg(feature = "backend-http")]
    #[error("backend request error: {0}")]
    Http(#[from] reqwest::Error),

    /// The chat backend rejected a request.
    #[error("backend error: {0}")]
    Backend(String),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to chat service")]
    NotConnected,

    /// Automatic reconnection exhausted its retry budget. Only an explicit
    /// `reconnect()` resumes dialing.
    #[error("connection failed after {attempts} attempts: {last_error}")]
    ConnectionFailed {
        /// Consecutive connection attempts that failed.
        attempts: u32,
        /// Description of the most recent failure.
        last_error: String,
    },

    /// The durable message write failed. Nothing was broadcast and no local
    /// state was mutated; the caller may resubmit.
    #[error("message delivery failed: {0}")]
    Delivery(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for chat client operations.
pub type Result<T> = std::result::Result<T, ChatError>;
