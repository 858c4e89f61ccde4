//! Async client for the CreatorLink chat service.
//!
//! [`ChatClient`] is a thin handle that communicates with a background
//! driver task via an unbounded MPSC channel. The driver owns the transport,
//! the active-room pointer, and every piece of mutable conversation state —
//! a single writer, so room membership, message merging, and typing state
//! need no locking discipline beyond the ordering of the driver loop itself.
//! Events are emitted on a bounded channel returned from
//! [`ChatClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("ws://localhost:3001");
//! let backend = HttpBackend::new("http://localhost:8000/api").with_auth_token(token);
//! let config = ChatConfig::new(Identity::new(7, "Alex", Role::Brand));
//! let (client, mut events) = ChatClient::start(connector, backend, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChatEvent::RoomsUpdated(rooms) => { /* render the sidebar */ }
//!         ChatEvent::MessageAppended(message) => { /* render the bubble */ }
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{ChatBackend, OutgoingMessage};
use crate::error::{ChatError, Result};
use crate::protocol::{
    ClientSignal, MarkReadSignal, Message, MessageId, MessagePush, MessagesReadPayload, Role, Room,
    RoomId, RoomSignal, ServerSignal, TypingSignal, UserId, UserJoinSignal, UserTypingPayload,
};
use crate::session::{ConnectionStatus, LifecycleGuard, ReconnectPolicy};
use crate::transport::{Connector, Transport};
use crate::typing::{LocalTyping, RemoteTyping};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout for a single connection attempt.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Inactivity window after which the local typing indicator stops.
const DEFAULT_TYPING_IDLE_AFTER: Duration = Duration::from_secs(1);

/// Safety TTL after which a remote typing name expires without a stop signal.
const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(3);

/// Stand-in deadline when no timer is pending; far enough to never fire.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 30)
}

// ── Configuration ───────────────────────────────────────────────────

/// The authenticated identity this session connects as.
///
/// Stamped onto the `user_join` announcement and every typing / read signal.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Backend user id.
    pub user_id: UserId,
    /// Display name shown to other participants (typing indicators).
    pub display_name: String,
    /// Marketplace role.
    pub role: Role,
}

impl Identity {
    /// Create an identity from the fields issued at login.
    pub fn new(user_id: UserId, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            role,
        }
    }
}

/// Configuration for a [`ChatClient`] session.
///
/// Only the identity is required; all other knobs have defaults matching the
/// production service.
///
/// # Example
///
/// ```
/// use creatorlink_chat::client::{ChatConfig, Identity};
/// use creatorlink_chat::protocol::Role;
///
/// let config = ChatConfig::new(Identity::new(7, "Alex", Role::Brand));
/// assert_eq!(config.identity.user_id, 7);
/// assert_eq!(config.event_channel_capacity, 256);
/// ```
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// The authenticated identity to announce on connect.
    pub identity: Identity,
    /// Reconnection backoff policy.
    pub reconnect: ReconnectPolicy,
    /// Timeout for a single connection attempt.
    pub connect_timeout: Duration,
    /// Inactivity window after which the local typing indicator stops.
    pub typing_idle_after: Duration,
    /// Safety TTL for remote typing names.
    pub typing_ttl: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning
    /// logged) to avoid blocking the driver. The final
    /// `StatusChanged(Disconnected)` event is always delivered regardless of
    /// capacity. Defaults to **256**; values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown before the driver task is aborted.
    pub shutdown_timeout: Duration,
}

impl ChatConfig {
    /// Create a configuration with the given identity and default values.
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            typing_idle_after: DEFAULT_TYPING_IDLE_AFTER,
            typing_ttl: DEFAULT_TYPING_TTL,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the reconnection backoff policy.
    #[must_use]
    pub fn with_reconnect_policy(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the timeout for a single connection attempt.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the local typing inactivity window.
    #[must_use]
    pub fn with_typing_idle_after(mut self, idle_after: Duration) -> Self {
        self.typing_idle_after = idle_after;
        self
    }

    /// Set the remote typing safety TTL.
    #[must_use]
    pub fn with_typing_ttl(mut self, ttl: Duration) -> Self {
        self.typing_ttl = ttl;
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Events ──────────────────────────────────────────────────────────

/// Events emitted to the UI collaborator.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Connection status transition.
    StatusChanged(ConnectionStatus),
    /// Room listing refreshed (previews, unread counts, presence).
    RoomsUpdated(Vec<Room>),
    /// History loaded for the newly active (or rejoined) room.
    HistoryLoaded {
        room_id: RoomId,
        messages: Vec<Message>,
    },
    /// A message was appended to the active room's list.
    MessageAppended(Message),
    /// The set of typing display names for the active room changed.
    TypingChanged { room_id: RoomId, names: Vec<String> },
    /// Read receipts were merged into the active room's list.
    ReceiptsApplied {
        room_id: RoomId,
        message_ids: Vec<MessageId>,
    },
}

// ── Shared state ────────────────────────────────────────────────────

/// Snapshot state shared between the driver (sole writer) and the handle.
#[derive(Default)]
struct SharedState {
    rooms: Mutex<Vec<Room>>,
    active_room: Mutex<Option<Room>>,
    messages: Mutex<Vec<Message>>,
    typing_names: Mutex<Vec<String>>,
    last_error: Mutex<Option<String>>,
}

// ── Commands ────────────────────────────────────────────────────────

/// Commands sent from the handle to the driver.
enum Command {
    SelectRoom(Box<Room>),
    Send {
        draft: OutgoingMessage,
        reply: oneshot::Sender<Result<Message>>,
    },
    Keystroke,
    InputBlur,
    MarkRead {
        room_id: RoomId,
        message_ids: Vec<MessageId>,
    },
    Reconnect,
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the CreatorLink chat service.
///
/// Created via [`ChatClient::start`], which spawns the background driver and
/// returns this handle together with an event receiver.
///
/// Command methods queue work to the driver and return immediately; only
/// [`send`](ChatClient::send) awaits a round-trip (its contract is the
/// canonical persisted message).
pub struct ChatClient {
    /// Sender half of the command channel to the driver.
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// Snapshot state updated by the driver.
    state: Arc<SharedState>,
    /// Lifecycle guard; retired when teardown begins.
    guard: LifecycleGuard,
    /// Latest connection status.
    status_rx: watch::Receiver<ConnectionStatus>,
    /// Handle to the background driver task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the driver to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl ChatClient {
    /// Start the chat session and return a handle plus event receiver.
    ///
    /// The driver fetches the room listing, dials through `connector`, and
    /// announces `identity` as soon as the transport is up. Reconnection,
    /// room rejoin, and presence re-announcement are automatic until the
    /// retry budget is exhausted.
    #[must_use = "the event receiver must be consumed to observe chat events"]
    pub fn start<C, B>(
        connector: C,
        backend: B,
        config: ChatConfig,
    ) -> (Self, mpsc::Receiver<ChatEvent>)
    where
        C: Connector,
        B: ChatBackend,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ChatEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

        let state = Arc::new(SharedState::default());
        let guard = LifecycleGuard::new();
        let shutdown_timeout = config.shutdown_timeout;

        let driver = Driver {
            connector,
            backend,
            local_typing: LocalTyping::new(config.typing_idle_after),
            remote_typing: RemoteTyping::new(config.typing_ttl),
            connection_id: Uuid::new_v4().to_string(),
            config,
            state: Arc::clone(&state),
            guard: guard.clone(),
            status_tx,
            event_tx,
            active_room: None,
            joined_room: None,
            failures: 0,
            ever_connected: false,
        };

        let task = tokio::spawn(driver.run(cmd_rx, shutdown_rx));

        let client = Self {
            cmd_tx,
            state,
            guard,
            status_rx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Make `room` the active conversation.
    ///
    /// The driver leaves the previous room, clears typing state, loads the
    /// new room's history, and joins it. Re-selecting the already-active
    /// room is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotConnected`] if the session has been torn down.
    pub fn select_room(&self, room: Room) -> Result<()> {
        self.command(Command::SelectRoom(Box::new(room)))
    }

    /// Send a message to `room_id`, optionally with an attachment.
    ///
    /// Performs the durable backend write first and resolves with the
    /// canonical persisted [`Message`]; the lightweight broadcast to other
    /// participants is emitted only after the write succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Delivery`] when the durable write fails (no
    /// state is mutated and nothing is broadcast — resubmit is safe),
    /// [`ChatError::NotConnected`] while disconnected, or
    /// [`ChatError::ConnectionFailed`] once the retry budget is exhausted.
    pub async fn send(
        &self,
        room_id: impl Into<RoomId>,
        text: impl Into<String>,
        attachment: Option<crate::backend::AttachmentUpload>,
    ) -> Result<Message> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::Send {
            draft: OutgoingMessage {
                room_id: room_id.into(),
                text: text.into(),
                attachment,
            },
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| ChatError::NotConnected)?
    }

    /// Record a keystroke in the active room's input.
    ///
    /// The first keystroke emits `typing_start` immediately; the indicator
    /// stops after the configured inactivity window.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotConnected`] if the session has been torn down.
    pub fn keystroke(&self) -> Result<()> {
        self.command(Command::Keystroke)
    }

    /// The input lost focus; stop the typing indicator immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotConnected`] if the session has been torn down.
    pub fn input_blur(&self) -> Result<()> {
        self.command(Command::InputBlur)
    }

    /// Mark `message_ids` in `room_id` as read.
    ///
    /// Best-effort: the backend write is attempted once and a `mark_read`
    /// broadcast follows on success; failures are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotConnected`] if the session has been torn down.
    pub fn mark_read(&self, room_id: impl Into<RoomId>, message_ids: Vec<MessageId>) -> Result<()> {
        self.command(Command::MarkRead {
            room_id: room_id.into(),
            message_ids,
        })
    }

    /// Resume dialing after the session entered the `Failed` status.
    ///
    /// Also skips a pending backoff delay. A no-op while connected.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotConnected`] if the session has been torn down.
    pub fn reconnect(&self) -> Result<()> {
        self.command(Command::Reconnect)
    }

    /// Shut down the session, closing the transport and stopping the driver.
    ///
    /// The driver stops typing indicators, leaves the active room, closes
    /// the transport, and emits a final `StatusChanged(Disconnected)` event.
    /// After this method returns the event receiver will yield `None`.
    pub async fn shutdown(&mut self) {
        debug!("ChatClient: shutdown requested");

        // Signal the driver to shut down gracefully.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the driver with a timeout. If it doesn't exit in time, abort
        // it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("chat driver terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("chat driver did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("chat driver aborted: {join_err}");
                    }
                }
            }
        }

        self.guard.retire();
    }

    // ── State accessors ─────────────────────────────────────────────

    /// The current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// A watch receiver observing every status transition.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Snapshot of the room listing.
    pub async fn rooms(&self) -> Vec<Room> {
        self.state.rooms.lock().await.clone()
    }

    /// The currently active room, if one is selected.
    pub async fn active_room(&self) -> Option<Room> {
        self.state.active_room.lock().await.clone()
    }

    /// Snapshot of the active room's ordered message list.
    pub async fn messages(&self) -> Vec<Message> {
        self.state.messages.lock().await.clone()
    }

    /// Display names currently typing in the active room, sorted.
    pub async fn typing_names(&self) -> Vec<String> {
        self.state.typing_names.lock().await.clone()
    }

    /// Description of the most recent connection failure, if any.
    pub async fn last_error(&self) -> Option<String> {
        self.state.last_error.lock().await.clone()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue a command to the driver.
    fn command(&self, cmd: Command) -> Result<()> {
        if !self.guard.is_alive() {
            return Err(ChatError::NotConnected);
        }
        self.cmd_tx.send(cmd).map_err(|_| ChatError::NotConnected)
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("status", &self.status())
            .field("alive", &self.guard.is_alive())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown. The
        // only safe action is to abort the spawned task, which causes the
        // driver future to be dropped immediately. The `shutdown_tx` oneshot
        // is intentionally *not* sent here: sending it would trigger a
        // graceful path that awaits `transport.close()`, but there is no
        // executor context to drive it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Merge helpers ───────────────────────────────────────────────────

/// Append a message unless its canonical id is already present.
fn merge_message(messages: &mut Vec<Message>, message: Message) -> bool {
    if messages.iter().any(|m| m.id == message.id) {
        return false;
    }
    messages.push(message);
    true
}

/// Flip the read flag on matching unread messages. Returns the ids that
/// actually changed, so re-applied receipts are invisible.
fn apply_receipts(
    messages: &mut [Message],
    message_ids: &[MessageId],
    timestamp: Option<&str>,
) -> Vec<MessageId> {
    let mut applied = Vec::new();
    for message in messages.iter_mut() {
        if message_ids.contains(&message.id) && !message.is_read {
            message.is_read = true;
            message.read_at = timestamp.map(str::to_string);
            applied.push(message.id);
        }
    }
    applied
}

// ── Driver ──────────────────────────────────────────────────────────

/// Connection state of the driver loop.
enum Link<T> {
    /// Transport established.
    Up(T),
    /// Waiting out the backoff delay before the next attempt.
    Backoff { until: Instant },
    /// About to dial.
    Connecting,
    /// Retry budget exhausted; only a manual `reconnect()` resumes dialing.
    Failed,
}

/// Receive from the transport when one is up; otherwise park the branch.
async fn recv_signal<T: Transport>(
    link: &mut Link<T>,
) -> Option<std::result::Result<String, ChatError>> {
    match link {
        Link::Up(transport) => transport.recv().await,
        _ => std::future::pending().await,
    }
}

/// Background task owning the transport and all conversation state.
struct Driver<C: Connector, B: ChatBackend> {
    connector: C,
    backend: B,
    config: ChatConfig,
    state: Arc<SharedState>,
    guard: LifecycleGuard,
    status_tx: watch::Sender<ConnectionStatus>,
    event_tx: mpsc::Sender<ChatEvent>,
    local_typing: LocalTyping,
    remote_typing: RemoteTyping,
    /// Per-connection identifier announced with presence updates.
    connection_id: String,
    /// The active conversation; this task is its sole writer.
    active_room: Option<Room>,
    /// Room a `join_room` signal is outstanding for (idempotent join/leave).
    joined_room: Option<RoomId>,
    /// Consecutive failed connection attempts.
    failures: u32,
    ever_connected: bool,
}

impl<C: Connector, B: ChatBackend> Driver<C, B> {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!("chat driver started");

        // The room listing is useful before the transport comes up.
        self.refresh_rooms().await;

        let mut link: Link<C::Transport> = Link::Connecting;

        loop {
            if matches!(link, Link::Connecting) {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        self.teardown(&mut link).await;
                        return;
                    }
                    attempt = self.attempt_connect() => match attempt {
                        Ok(transport) => {
                            link = Link::Up(transport);
                            self.on_connected(&mut link).await;
                        }
                        Err(e) => self.on_connect_failure(&mut link, &e).await,
                    }
                }
                continue;
            }

            let backoff_until = match &link {
                Link::Backoff { until } => Some(*until),
                _ => None,
            };
            let timer_deadline = self.next_timer_deadline();

            tokio::select! {
                _ = &mut shutdown_rx => {
                    self.teardown(&mut link).await;
                    return;
                }

                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd, &mut link).await,
                    // Command channel closed — client handle dropped.
                    None => {
                        debug!("command channel closed, shutting down chat driver");
                        self.teardown(&mut link).await;
                        return;
                    }
                },

                incoming = recv_signal(&mut link) => match incoming {
                    Some(Ok(text)) => self.handle_incoming(&text, &mut link).await,
                    Some(Err(e)) => {
                        warn!("transport receive error: {e}");
                        self.begin_reconnect(&mut link, format!("transport receive error: {e}")).await;
                    }
                    // Remote side closed the connection; retry immediately.
                    None => {
                        debug!("transport closed by server");
                        self.begin_reconnect(&mut link, "connection closed by server".to_string()).await;
                    }
                },

                _ = sleep_until(backoff_until.unwrap_or_else(far_future)) => {
                    link = Link::Connecting;
                }

                _ = sleep_until(timer_deadline.unwrap_or_else(far_future)) => {
                    self.on_timer(&mut link).await;
                }
            }
        }
    }

    // ── Connection lifecycle ────────────────────────────────────────

    async fn attempt_connect(&mut self) -> Result<C::Transport> {
        // Only the very first dial of a fresh cycle is "connecting"; retries
        // stay in "reconnecting".
        let status = if self.ever_connected || self.failures > 0 {
            ConnectionStatus::Reconnecting
        } else {
            ConnectionStatus::Connecting
        };
        self.set_status(status);

        debug!(failures = self.failures, "attempting connection");
        match tokio::time::timeout(self.config.connect_timeout, self.connector.connect()).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::Timeout),
        }
    }

    async fn on_connected(&mut self, link: &mut Link<C::Transport>) {
        // A successful connection resets the attempt counter.
        self.failures = 0;
        self.ever_connected = true;
        *self.state.last_error.lock().await = None;
        self.set_status(ConnectionStatus::Connected);
        info!("connected to chat service");

        // Identity announcement rides first on every fresh transport.
        let identity = UserJoinSignal {
            user_id: self.config.identity.user_id,
            role: self.config.identity.role,
        };
        self.emit_signal(link, &ClientSignal::UserJoin(identity))
            .await;

        if let Err(e) = self
            .backend
            .post_presence(true, &self.connection_id)
            .await
        {
            warn!("presence update failed: {e}");
        }

        self.refresh_rooms().await;

        // Rejoin the active room so pushes missed during an outage are not
        // silently lost; the history re-fetch fills the gap.
        if let Some(room_id) = self.active_room.as_ref().map(|r| r.room_id.clone()) {
            self.load_history(&room_id).await;
            self.joined_room = Some(room_id.clone());
            self.emit_signal(link, &ClientSignal::JoinRoom(RoomSignal { room_id }))
                .await;
        }
    }

    async fn on_connect_failure(&mut self, link: &mut Link<C::Transport>, error: &ChatError) {
        self.failures += 1;
        warn!(failures = self.failures, "connection attempt failed: {error}");
        *self.state.last_error.lock().await = Some(error.to_string());

        if self.config.reconnect.exhausted(self.failures) {
            error!(
                failures = self.failures,
                "reconnection budget exhausted; manual reconnect required"
            );
            *link = Link::Failed;
            self.set_status(ConnectionStatus::Failed);
        } else {
            let delay = self.config.reconnect.delay(self.failures - 1);
            debug!(?delay, "scheduling reconnection");
            *link = Link::Backoff {
                until: Instant::now() + delay,
            };
            self.set_status(ConnectionStatus::Reconnecting);
        }
    }

    /// Transition from an established transport into an immediate redial.
    async fn begin_reconnect(&mut self, link: &mut Link<C::Transport>, reason: String) {
        *self.state.last_error.lock().await = Some(reason);
        self.failures = 0;
        *link = Link::Connecting;
        self.set_status(ConnectionStatus::Reconnecting);
    }

    // ── Command handling ────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command, link: &mut Link<C::Transport>) {
        match cmd {
            Command::SelectRoom(room) => self.select_room(*room, link).await,
            Command::Send { draft, reply } => {
                let outcome = self.dispatch_message(draft, link).await;
                if reply.send(outcome).is_err() {
                    debug!("send caller went away before the reply");
                }
            }
            Command::Keystroke => self.on_keystroke(link).await,
            Command::InputBlur => self.stop_local_typing(link).await,
            Command::MarkRead {
                room_id,
                message_ids,
            } => {
                self.acknowledge_read(&room_id, &message_ids, link).await;
            }
            Command::Reconnect => {
                if matches!(link, Link::Failed | Link::Backoff { .. }) {
                    debug!("manual reconnect requested");
                    self.failures = 0;
                    *link = Link::Connecting;
                }
            }
        }
    }

    /// Switch the active conversation. Ordered: leave previous → stop local
    /// typing → clear remote typing → activate → load history → join.
    async fn select_room(&mut self, room: Room, link: &mut Link<C::Transport>) {
        if self
            .active_room
            .as_ref()
            .is_some_and(|active| active.room_id == room.room_id)
        {
            debug!(room = %room.room_id, "room already active, ignoring re-selection");
            return;
        }

        if let Some(previous) = self.joined_room.take() {
            self.emit_signal(link, &ClientSignal::LeaveRoom(RoomSignal { room_id: previous }))
                .await;
        }

        self.stop_local_typing(link).await;
        self.remote_typing.clear();

        let room_id = room.room_id.clone();
        self.active_room = Some(room.clone());
        *self.state.active_room.lock().await = Some(room);
        self.state.messages.lock().await.clear();
        self.publish_typing().await;

        self.load_history(&room_id).await;

        self.joined_room = Some(room_id.clone());
        self.emit_signal(link, &ClientSignal::JoinRoom(RoomSignal { room_id }))
            .await;
    }

    /// The message dispatch pipeline: durable write, local merge, broadcast.
    async fn dispatch_message(
        &mut self,
        draft: OutgoingMessage,
        link: &mut Link<C::Transport>,
    ) -> Result<Message> {
        if !matches!(link, Link::Up(_)) {
            return Err(match link {
                Link::Failed => ChatError::ConnectionFailed {
                    attempts: self.failures,
                    last_error: self
                        .state
                        .last_error
                        .lock()
                        .await
                        .clone()
                        .unwrap_or_else(|| "connection failed".to_string()),
                },
                _ => ChatError::NotConnected,
            });
        }

        // Durable write first; a failed write aborts the whole send.
        let message = self
            .backend
            .post_message(&draft)
            .await
            .map_err(|e| ChatError::Delivery(e.to_string()))?;

        if !self.guard.is_alive() {
            // Delivered, but the session is gone; surface the canonical
            // message without touching state.
            return Ok(message);
        }

        if self
            .active_room
            .as_ref()
            .is_some_and(|active| active.room_id == message.room_id)
        {
            let appended = {
                let mut messages = self.state.messages.lock().await;
                merge_message(&mut messages, message.clone())
            };
            if appended {
                self.emit(ChatEvent::MessageAppended(message.clone()));
            }
        }

        // Only now announce it; other participants receive the push, and our
        // own echo is suppressed by the sender-id rule.
        self.emit_signal(
            link,
            &ClientSignal::SendMessage(MessagePush::from_message(&message)),
        )
        .await;

        // A successful send always ends the typing window.
        self.stop_local_typing(link).await;

        Ok(message)
    }

    async fn on_keystroke(&mut self, link: &mut Link<C::Transport>) {
        let Some(room_id) = self.active_room.as_ref().map(|r| r.room_id.clone()) else {
            return;
        };
        if !matches!(link, Link::Up(_)) {
            return;
        }
        if self.local_typing.keystroke(Instant::now()) {
            let signal = self.typing_signal(&room_id);
            self.emit_signal(link, &ClientSignal::TypingStart(signal))
                .await;
        }
    }

    /// Force the local typing machine to Idle, emitting the stop signal for
    /// the active room when the machine was Typing.
    async fn stop_local_typing(&mut self, link: &mut Link<C::Transport>) {
        if !self.local_typing.force_stop() {
            return;
        }
        let Some(room_id) = self.active_room.as_ref().map(|r| r.room_id.clone()) else {
            return;
        };
        let signal = self.typing_signal(&room_id);
        self.emit_signal(link, &ClientSignal::TypingStop(signal))
            .await;
    }

    /// Read receipts: persist, then broadcast. Best-effort by design — a
    /// failed acknowledgement is logged and dropped.
    async fn acknowledge_read(
        &mut self,
        room_id: &str,
        message_ids: &[MessageId],
        link: &mut Link<C::Transport>,
    ) {
        if message_ids.is_empty() {
            return;
        }
        if let Err(e) = self.backend.post_read(room_id, message_ids).await {
            warn!(room = %room_id, "read acknowledgement failed: {e}");
            return;
        }
        if !self.guard.is_alive() {
            return;
        }
        self.emit_signal(
            link,
            &ClientSignal::MarkRead(MarkReadSignal {
                room_id: room_id.to_string(),
                message_ids: message_ids.to_vec(),
                user_id: self.config.identity.user_id,
            }),
        )
        .await;
    }

    // ── Inbound signals ─────────────────────────────────────────────

    async fn handle_incoming(&mut self, text: &str, link: &mut Link<C::Transport>) {
        let signal: ServerSignal = match serde_json::from_str(text) {
            Ok(signal) => signal,
            Err(e) => {
                warn!("failed to deserialize server signal: {e} — raw: {text}");
                return;
            }
        };

        match signal {
            ServerSignal::NewMessage(push) => self.on_new_message(push, link).await,
            ServerSignal::UserTyping(payload) => self.on_user_typing(payload).await,
            ServerSignal::MessagesRead(payload) => self.on_messages_read(payload).await,
        }
    }

    async fn on_new_message(&mut self, push: MessagePush, link: &mut Link<C::Transport>) {
        if push.sender_id == self.config.identity.user_id {
            // Echo of our own send; the canonical copy arrived with the write.
            debug!(message = push.message_id, "suppressing own-message echo");
        } else if self
            .active_room
            .as_ref()
            .is_some_and(|active| active.room_id == push.room_id)
        {
            let room_id = push.room_id.clone();
            let message_id = push.message_id;
            let message = push.into_message();

            let appended = {
                let mut messages = self.state.messages.lock().await;
                merge_message(&mut messages, message.clone())
            };
            if appended {
                self.emit(ChatEvent::MessageAppended(message));
                // A message we are looking at is read the moment it lands.
                self.acknowledge_read(&room_id, &[message_id], link).await;
            }
        }

        // Previews and unread counts are backend-owned; refresh for every
        // room, not just the active one.
        self.refresh_rooms().await;
    }

    async fn on_user_typing(&mut self, payload: UserTypingPayload) {
        if !self
            .active_room
            .as_ref()
            .is_some_and(|active| active.room_id == payload.room_id)
        {
            return;
        }
        if self
            .remote_typing
            .apply(&payload.user_name, payload.is_typing, Instant::now())
        {
            self.publish_typing().await;
        }
    }

    async fn on_messages_read(&mut self, payload: MessagesReadPayload) {
        if !self
            .active_room
            .as_ref()
            .is_some_and(|active| active.room_id == payload.room_id)
        {
            return;
        }
        let applied = {
            let mut messages = self.state.messages.lock().await;
            apply_receipts(
                &mut messages,
                &payload.message_ids,
                payload.timestamp.as_deref(),
            )
        };
        if !applied.is_empty() {
            self.emit(ChatEvent::ReceiptsApplied {
                room_id: payload.room_id,
                message_ids: applied,
            });
        }
    }

    // ── Timers ──────────────────────────────────────────────────────

    fn next_timer_deadline(&self) -> Option<Instant> {
        match (self.local_typing.deadline(), self.remote_typing.next_expiry()) {
            (Some(local), Some(remote)) => Some(local.min(remote)),
            (local, remote) => local.or(remote),
        }
    }

    async fn on_timer(&mut self, link: &mut Link<C::Transport>) {
        let now = Instant::now();
        if self.local_typing.tick(now) {
            if let Some(room_id) = self.active_room.as_ref().map(|r| r.room_id.clone()) {
                let signal = self.typing_signal(&room_id);
                self.emit_signal(link, &ClientSignal::TypingStop(signal))
                    .await;
            }
        }
        if self.remote_typing.tick(now) {
            self.publish_typing().await;
        }
    }

    // ── Shared state & events ───────────────────────────────────────

    async fn refresh_rooms(&mut self) {
        match self.backend.fetch_rooms().await {
            Ok(rooms) => {
                if !self.guard.is_alive() {
                    return;
                }
                *self.state.rooms.lock().await = rooms.clone();
                self.emit(ChatEvent::RoomsUpdated(rooms));
            }
            Err(e) => warn!("room listing refresh failed: {e}"),
        }
    }

    async fn load_history(&mut self, room_id: &str) {
        match self.backend.fetch_history(room_id).await {
            Ok(messages) => {
                if !self.guard.is_alive() {
                    return;
                }
                // A switch may have superseded this fetch.
                if self.active_room.as_ref().map(|r| r.room_id.as_str()) != Some(room_id) {
                    debug!(room = %room_id, "discarding history for inactive room");
                    return;
                }
                *self.state.messages.lock().await = messages.clone();
                self.emit(ChatEvent::HistoryLoaded {
                    room_id: room_id.to_string(),
                    messages,
                });
            }
            Err(e) => warn!(room = %room_id, "history fetch failed: {e}"),
        }
    }

    async fn publish_typing(&mut self) {
        let names = self.remote_typing.names();
        *self.state.typing_names.lock().await = names.clone();
        if let Some(room_id) = self.active_room.as_ref().map(|r| r.room_id.clone()) {
            self.emit(ChatEvent::TypingChanged { room_id, names });
        }
    }

    fn typing_signal(&self, room_id: &str) -> TypingSignal {
        TypingSignal {
            room_id: room_id.to_string(),
            user_id: self.config.identity.user_id,
            user_name: self.config.identity.display_name.clone(),
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            debug!(?status, "connection status changed");
            self.emit(ChatEvent::StatusChanged(status));
        }
    }

    /// Emit an event. If the channel is full, log a warning and drop the
    /// event to avoid blocking the driver.
    fn emit(&self, event: ChatEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Serialize and send a signal over the transport; a send failure tears
    /// the link down and starts a reconnect cycle.
    async fn emit_signal(&mut self, link: &mut Link<C::Transport>, signal: &ClientSignal) {
        let json = match serde_json::to_string(signal) {
            Ok(json) => json,
            Err(e) => {
                // Serialization errors are programming bugs; don't kill the loop.
                error!("failed to serialize client signal: {e}");
                return;
            }
        };

        let send_error = match link {
            Link::Up(transport) => transport.send(json).await.err(),
            _ => {
                debug!(
                    "transport down, dropping outbound signal: {:?}",
                    std::mem::discriminant(signal)
                );
                return;
            }
        };

        if let Some(e) = send_error {
            warn!("transport send error: {e}");
            self.begin_reconnect(link, format!("transport send error: {e}"))
                .await;
        }
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Ordered teardown: final typing-stop, leave the active room, close the
    /// transport, retire the guard, emit the final status event.
    async fn teardown(&mut self, link: &mut Link<C::Transport>) {
        debug!("chat driver teardown started");

        self.stop_local_typing(link).await;

        if let Some(room_id) = self.joined_room.take() {
            self.emit_signal(link, &ClientSignal::LeaveRoom(RoomSignal { room_id }))
                .await;
        }

        if let Link::Up(transport) = link {
            if let Err(e) = transport.close().await {
                debug!("transport close failed: {e}");
            }
        }

        self.guard.retire();

        let changed = self.status_tx.send_if_modified(|current| {
            if *current == ConnectionStatus::Disconnected {
                false
            } else {
                *current = ConnectionStatus::Disconnected;
                true
            }
        });
        if changed {
            // Uses `send().await` (blocking) instead of `try_send` because the
            // final status event must never be silently dropped.
            if self
                .event_tx
                .send(ChatEvent::StatusChanged(ConnectionStatus::Disconnected))
                .await
                .is_err()
            {
                debug!("event channel closed, receiver dropped");
            }
        }

        debug!("chat driver exited");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::MessageKind;

    fn message(id: MessageId, body: &str) -> Message {
        Message {
            id,
            room_id: "room-1".to_string(),
            body: body.to_string(),
            message_type: MessageKind::Text,
            sender_id: 2,
            sender_name: "Jamie".to_string(),
            sender_avatar: None,
            is_sender: false,
            attachment: None,
            is_read: false,
            read_at: None,
            created_at: "2026-01-10T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn config_defaults() {
        let config = ChatConfig::new(Identity::new(7, "Alex", Role::Brand));
        assert_eq!(config.identity.user_id, 7);
        assert_eq!(config.identity.display_name, "Alex");
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.typing_idle_after, Duration::from_secs(1));
        assert_eq!(config.typing_ttl, Duration::from_secs(3));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn config_builder_methods() {
        let config = ChatConfig::new(Identity::new(7, "Alex", Role::Brand))
            .with_event_channel_capacity(512)
            .with_connect_timeout(Duration::from_secs(3))
            .with_typing_idle_after(Duration::from_millis(750))
            .with_typing_ttl(Duration::from_secs(5))
            .with_shutdown_timeout(Duration::from_secs(2));
        assert_eq!(config.event_channel_capacity, 512);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.typing_idle_after, Duration::from_millis(750));
        assert_eq!(config.typing_ttl, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config =
            ChatConfig::new(Identity::new(7, "Alex", Role::Brand)).with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn merge_message_deduplicates_by_id() {
        let mut messages = Vec::new();
        assert!(merge_message(&mut messages, message(1, "hello")));
        assert!(merge_message(&mut messages, message(2, "world")));
        // Same id, different body — still a duplicate.
        assert!(!merge_message(&mut messages, message(1, "echo")));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, "hello");
    }

    #[test]
    fn apply_receipts_flips_matching_unread() {
        let mut messages = vec![message(1, "a"), message(2, "b"), message(3, "c")];
        let applied = apply_receipts(&mut messages, &[1, 3, 99], Some("2026-01-10T12:05:00Z"));
        assert_eq!(applied, vec![1, 3]);
        assert!(messages[0].is_read);
        assert_eq!(messages[0].read_at.as_deref(), Some("2026-01-10T12:05:00Z"));
        assert!(!messages[1].is_read);
        assert!(messages[2].is_read);
    }

    #[test]
    fn apply_receipts_is_idempotent() {
        let mut messages = vec![message(1, "a")];
        let first = apply_receipts(&mut messages, &[1], Some("t1"));
        assert_eq!(first, vec![1]);

        // A second receipt for the same id changes nothing, including read_at.
        let second = apply_receipts(&mut messages, &[1], Some("t2"));
        assert!(second.is_empty());
        assert_eq!(messages[0].read_at.as_deref(), Some("t1"));
    }

    #[test]
    fn apply_receipts_ignores_unknown_ids() {
        let mut messages = vec![message(1, "a")];
        let applied = apply_receipts(&mut messages, &[42], Some("t1"));
        assert!(applied.is_empty());
        assert!(!messages[0].is_read);
    }
}
