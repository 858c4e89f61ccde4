//! # CreatorLink Chat Client
//!
//! Transport-agnostic Rust client for the CreatorLink marketplace real-time
//! chat service.
//!
//! The marketplace connects content creators and brands; this crate is the
//! one subsystem of it with real coordination work: it owns a persistent
//! bidirectional connection to the chat service, joins and leaves
//! conversation rooms, reconciles messages written through REST against
//! their broadcast echoes, tracks ephemeral typing state, and synchronizes
//! read receipts across participants.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] and [`Connector`]
//!   traits for any backend; `transport-websocket` (default) provides
//!   [`WebSocketTransport`] / [`WebSocketConnector`]
//! - **Backend-agnostic** — implement [`ChatBackend`] for the REST side;
//!   `backend-http` (default) provides the reqwest-based [`HttpBackend`]
//! - **Event-driven** — receive typed [`ChatEvent`]s via a channel, observe
//!   connection status through a `watch` channel
//! - **Self-healing** — automatic reconnection with exponential backoff,
//!   identity and presence re-announcement, and active-room rejoin
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use creatorlink_chat::{
//!     ChatClient, ChatConfig, ChatEvent, HttpBackend, Identity, Role, WebSocketConnector,
//! };
//!
//! let connector = WebSocketConnector::new("ws://localhost:3001");
//! let backend = HttpBackend::new("http://localhost:8000/api").with_auth_token(token);
//! let config = ChatConfig::new(Identity::new(user_id, "Alex", Role::Brand));
//!
//! let (client, mut events) = ChatClient::start(connector, backend, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChatEvent::RoomsUpdated(rooms) => { /* … */ }
//!         ChatEvent::MessageAppended(message) => { /* … */ }
//!         ChatEvent::StatusChanged(status) => { /* … */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

#[cfg(feature = "transport-websocket")]
pub mod transports;

mod typing;

// Re-export primary types for ergonomic imports.
pub use backend::{AttachmentUpload, ChatBackend, OutgoingMessage};
#[cfg(feature = "backend-http")]
pub use backend::HttpBackend;
pub use client::{ChatClient, ChatConfig, ChatEvent, Identity};
pub use error::ChatError;
pub use protocol::{ClientSignal, Message, MessageKind, Role, Room, ServerSignal};
pub use session::{ConnectionStatus, LifecycleGuard, ReconnectPolicy};
pub use transport::{Connector, Transport};
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
