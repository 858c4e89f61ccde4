//! Transport abstraction for the realtime chat connection.
//!
//! The [`Transport`] trait defines a bidirectional text message channel
//! between the client and the chat service. Signals are JSON text messages,
//! so every transport implementation must handle message framing internally
//! (e.g., WebSocket frames, length-prefixed TCP).
//!
//! The [`Connector`] trait is the factory the session uses to establish a
//! transport — and to re-establish one after a drop. Reconnection dials
//! through the same connector with exponential backoff, so implementations
//! must be able to produce any number of fresh connections.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use creatorlink_chat::error::ChatError;
//! use creatorlink_chat::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), ChatError> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ChatError>> {
//!         // Receive the next JSON text message
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ChatError> {
//!         // Gracefully shut down the connection
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ChatError;

/// A bidirectional text message transport for the chat protocol.
///
/// Implementors shuttle serialized JSON signals between the client and the
/// chat service. Each call to [`send`](Transport::send) transmits one
/// complete JSON message; each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it
/// is used inside `tokio::select!`. If `recv` is cancelled before
/// completion, calling it again must not lose data. Channel-based
/// implementations (e.g., wrapping `mpsc::Receiver`) are naturally
/// cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the chat service.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::TransportSend`] if the message could not be sent
    /// (e.g., connection broken, write buffer full).
    async fn send(&mut self, message: String) -> Result<(), ChatError>;

    /// Receive the next JSON text message from the chat service.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the remote side
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, ChatError>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to [`send`](Transport::send)
    /// and [`recv`](Transport::recv) may return errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations
    /// should still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), ChatError>;
}

/// A re-dialable factory for [`Transport`] connections.
///
/// The session owns one connector for its whole lifetime and calls
/// [`connect`](Connector::connect) on the initial dial and on every
/// reconnection attempt.
#[async_trait]
pub trait Connector: Send + 'static {
    /// Transport type produced by this connector.
    type Transport: Transport;

    /// Establish a fresh connection to the chat service.
    ///
    /// # Errors
    ///
    /// Returns any [`ChatError`] the underlying dial produces; the session
    /// translates repeated failures into backoff and, past the retry budget,
    /// a terminal failed state.
    async fn connect(&mut self) -> Result<Self::Transport, ChatError>;
}
