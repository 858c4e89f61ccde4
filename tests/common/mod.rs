#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for chat client integration tests.
//!
//! Provides a channel-fed [`MockTransport`] (signals can be injected while
//! the client runs), a [`MockConnector`] that scripts connection outcomes
//! across reconnect cycles, and a [`MockBackend`] with configurable REST
//! responses and recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use creatorlink_chat::backend::{ChatBackend, OutgoingMessage};
use creatorlink_chat::client::{ChatConfig, ChatEvent, Identity};
use creatorlink_chat::error::ChatError;
use creatorlink_chat::protocol::{
    ClientSignal, Message, MessageId, MessageKind, MessagePush, MessagesReadPayload, Participant,
    Role, Room, RoomId, ServerSignal, UserTypingPayload,
};
use creatorlink_chat::transport::{Connector, Transport};

/// The local test identity: user 7, "Alex", brand side.
pub const SELF_ID: i64 = 7;

/// The counterpart in most fixtures.
pub const OTHER_ID: i64 = 2;

// ── MockTransport ───────────────────────────────────────────────────

type Frame = Option<Result<String, ChatError>>;

/// A channel-fed mock transport.
///
/// Frames pushed through the [`TransportHandle`] are yielded by `recv()` in
/// order; an explicit `None` frame simulates a clean remote close. All
/// messages sent by the client are recorded.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// Test-side handle feeding and inspecting a [`MockTransport`].
#[derive(Clone)]
pub struct TransportHandle {
    tx: mpsc::UnboundedSender<Frame>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl TransportHandle {
    /// Deliver a server signal to the client.
    pub fn push_signal(&self, signal: &ServerSignal) {
        let json = serde_json::to_string(signal).unwrap();
        self.tx.send(Some(Ok(json))).unwrap();
    }

    /// Deliver a raw text frame to the client.
    pub fn push_raw(&self, raw: &str) {
        self.tx.send(Some(Ok(raw.to_string()))).unwrap();
    }

    /// Deliver a transport error to the client.
    pub fn push_error(&self, message: &str) {
        self.tx
            .send(Some(Err(ChatError::TransportReceive(message.to_string()))))
            .unwrap();
    }

    /// Simulate the remote side closing the connection.
    pub fn close_from_server(&self) {
        self.tx.send(None).unwrap();
    }

    /// All signals the client has sent on this transport, parsed.
    pub fn sent_signals(&self) -> Vec<ClientSignal> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|json| serde_json::from_str(json).unwrap())
            .collect()
    }
}

/// Create a connected transport/handle pair.
pub fn transport_pair() -> (MockTransport, TransportHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sent = Arc::new(StdMutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let transport = MockTransport {
        incoming: rx,
        sent: Arc::clone(&sent),
        closed: Arc::clone(&closed),
    };
    (transport, TransportHandle { tx, sent, closed })
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), ChatError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ChatError>> {
        match self.incoming.recv().await {
            Some(frame) => frame,
            // Handle dropped — keep the link up until shutdown.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// One scripted outcome of a connection attempt.
pub enum ConnectOutcome {
    Transport(MockTransport),
    Error,
}

/// A [`Connector`] replaying scripted outcomes; an exhausted script fails
/// every further attempt.
pub struct MockConnector {
    outcomes: Arc<StdMutex<VecDeque<ConnectOutcome>>>,
    attempts: Arc<AtomicU32>,
}

/// Test-side handle for a [`MockConnector`].
#[derive(Clone)]
pub struct ConnectorHandle {
    outcomes: Arc<StdMutex<VecDeque<ConnectOutcome>>>,
    attempts: Arc<AtomicU32>,
}

impl ConnectorHandle {
    /// Queue a successful outcome, returning the handle for its transport.
    pub fn push_transport(&self) -> TransportHandle {
        let (transport, handle) = transport_pair();
        self.outcomes
            .lock()
            .unwrap()
            .push_back(ConnectOutcome::Transport(transport));
        handle
    }

    /// Queue a failed connection attempt.
    pub fn push_failure(&self) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(ConnectOutcome::Error);
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl MockConnector {
    /// A connector with an empty script; queue outcomes via the handle.
    pub fn new() -> (Self, ConnectorHandle) {
        let outcomes = Arc::new(StdMutex::new(VecDeque::new()));
        let attempts = Arc::new(AtomicU32::new(0));
        let connector = Self {
            outcomes: Arc::clone(&outcomes),
            attempts: Arc::clone(&attempts),
        };
        (connector, ConnectorHandle { outcomes, attempts })
    }

    /// A connector whose first attempt succeeds with a single transport.
    pub fn single() -> (Self, TransportHandle, ConnectorHandle) {
        let (connector, handle) = Self::new();
        let transport = handle.push_transport();
        (connector, transport, handle)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&mut self) -> Result<MockTransport, ChatError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        match self.outcomes.lock().unwrap().pop_front() {
            Some(ConnectOutcome::Transport(transport)) => Ok(transport),
            Some(ConnectOutcome::Error) | None => Err(ChatError::TransportClosed),
        }
    }
}

// ── MockBackend ─────────────────────────────────────────────────────

/// Configurable responses and recorded calls for the REST seam.
#[derive(Default)]
pub struct BackendState {
    /// Returned by every `fetch_rooms` call.
    pub rooms: Vec<Room>,
    /// Per-room history returned by `fetch_history`.
    pub history: HashMap<RoomId, Vec<Message>>,
    /// Scripted outcomes for `post_message`, consumed in order.
    pub send_results: VecDeque<Result<Message, String>>,
    /// When true, `post_read` fails.
    pub fail_read: bool,
    /// Recorded `post_read` calls.
    pub read_calls: Vec<(RoomId, Vec<MessageId>)>,
    /// Recorded `post_presence` calls.
    pub presence_calls: Vec<(bool, String)>,
    /// Number of `fetch_rooms` calls.
    pub rooms_fetches: u32,
}

pub type BackendHandle = Arc<StdMutex<BackendState>>;

/// A [`ChatBackend`] driven by a shared [`BackendState`].
pub struct MockBackend {
    state: BackendHandle,
}

impl MockBackend {
    pub fn new() -> (Self, BackendHandle) {
        let state: BackendHandle = Arc::default();
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn fetch_rooms(&self) -> Result<Vec<Room>, ChatError> {
        let mut state = self.state.lock().unwrap();
        state.rooms_fetches += 1;
        Ok(state.rooms.clone())
    }

    async fn fetch_history(&self, room_id: &str) -> Result<Vec<Message>, ChatError> {
        let state = self.state.lock().unwrap();
        Ok(state.history.get(room_id).cloned().unwrap_or_default())
    }

    async fn post_message(&self, draft: &OutgoingMessage) -> Result<Message, ChatError> {
        let mut state = self.state.lock().unwrap();
        match state.send_results.pop_front() {
            Some(Ok(message)) => Ok(message),
            Some(Err(reason)) => Err(ChatError::Backend(reason)),
            None => Err(ChatError::Backend(format!(
                "no scripted send result for room {}",
                draft.room_id
            ))),
        }
    }

    async fn post_read(&self, room_id: &str, message_ids: &[MessageId]) -> Result<(), ChatError> {
        let mut state = self.state.lock().unwrap();
        state
            .read_calls
            .push((room_id.to_string(), message_ids.to_vec()));
        if state.fail_read {
            Err(ChatError::Backend("read endpoint unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    async fn post_presence(&self, online: bool, connection_id: &str) -> Result<(), ChatError> {
        let mut state = self.state.lock().unwrap();
        state
            .presence_calls
            .push((online, connection_id.to_string()));
        Ok(())
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub fn identity() -> Identity {
    Identity::new(SELF_ID, "Alex", Role::Brand)
}

pub fn test_config() -> ChatConfig {
    ChatConfig::new(identity())
}

pub fn room(room_id: &str, unread: u32) -> Room {
    Room {
        room_id: room_id.to_string(),
        campaign_id: 11,
        campaign_title: "Summer Product Showcase".to_string(),
        other_user: Participant {
            id: OTHER_ID,
            name: "Jamie".to_string(),
            avatar: None,
            online: true,
        },
        last_message: None,
        unread_count: unread,
        last_message_at: None,
    }
}

pub fn message(id: MessageId, room_id: &str, sender_id: i64, body: &str) -> Message {
    Message {
        id,
        room_id: room_id.to_string(),
        body: body.to_string(),
        message_type: MessageKind::Text,
        sender_id,
        sender_name: if sender_id == SELF_ID {
            "Alex".to_string()
        } else {
            "Jamie".to_string()
        },
        sender_avatar: None,
        is_sender: sender_id == SELF_ID,
        attachment: None,
        is_read: false,
        read_at: None,
        created_at: "2026-01-10T12:00:00Z".to_string(),
    }
}

pub fn new_message_push(id: MessageId, room_id: &str, sender_id: i64, body: &str) -> ServerSignal {
    ServerSignal::NewMessage(MessagePush {
        room_id: room_id.to_string(),
        message_id: id,
        message: body.to_string(),
        sender_id,
        sender_name: if sender_id == SELF_ID {
            "Alex".to_string()
        } else {
            "Jamie".to_string()
        },
        sender_avatar: None,
        message_type: MessageKind::Text,
        file_data: None,
        timestamp: Some("2026-01-10T12:00:00Z".to_string()),
    })
}

pub fn typing_push(room_id: &str, user_name: &str, is_typing: bool) -> ServerSignal {
    ServerSignal::UserTyping(UserTypingPayload {
        room_id: room_id.to_string(),
        is_typing,
        user_name: user_name.to_string(),
    })
}

pub fn receipts_push(room_id: &str, ids: Vec<MessageId>, timestamp: &str) -> ServerSignal {
    ServerSignal::MessagesRead(MessagesReadPayload {
        room_id: room_id.to_string(),
        message_ids: ids,
        read_by: OTHER_ID,
        timestamp: Some(timestamp.to_string()),
    })
}

// ── Event helpers ───────────────────────────────────────────────────

/// Receive the next event, failing the test after a generous timeout.
pub async fn next_event(events: &mut mpsc::Receiver<ChatEvent>) -> ChatEvent {
    tokio::time::timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("timed out waiting for chat event")
        .expect("event channel closed")
}

/// Drain events until one matches the predicate, returning it.
pub async fn wait_for(
    events: &mut mpsc::Receiver<ChatEvent>,
    pred: impl Fn(&ChatEvent) -> bool,
) -> ChatEvent {
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Drain events until the given status is observed.
pub async fn wait_status(
    events: &mut mpsc::Receiver<ChatEvent>,
    status: creatorlink_chat::ConnectionStatus,
) {
    wait_for(events, |event| {
        matches!(event, ChatEvent::StatusChanged(s) if *s == status)
    })
    .await;
}

/// Give the driver a moment to process queued commands.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
