//! Wire types for the CreatorLink chat service.
//!
//! Two families live here:
//!
//! - **Transport signals** ([`ClientSignal`] outbound, [`ServerSignal`]
//!   inbound): the named events exchanged over the realtime connection,
//!   serialized as `{"event": "...", "data": {...}}` envelopes with
//!   camelCase payload fields.
//! - **REST models** ([`Room`], [`Message`], ...): the records returned by
//!   the backend's HTTP API, with snake_case fields.
//!
//! Timestamps are carried as ISO 8601 strings exactly as the backend
//! produces them. Display ordering is the backend's concern; this client
//! never re-sorts.

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for participants.
pub type UserId = i64;

/// Unique identifier for messages, assigned by the durable backend write.
pub type MessageId = i64;

/// Unique identifier for rooms.
pub type RoomId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// Marketplace role of a participant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A brand running campaigns.
    Brand,
    /// A content creator applying to campaigns.
    Creator,
    /// Platform moderation staff.
    Admin,
}

/// Payload kind of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text body.
    #[default]
    Text,
    /// Image attachment, body optionally carries a caption.
    Image,
    /// Generic file attachment.
    File,
}

// ── REST models ─────────────────────────────────────────────────────

/// A marketplace participant as seen from chat.
///
/// Read-only snapshot received from the backend; only the presence flag
/// changes between room-listing refreshes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: UserId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub online: bool,
}

/// Attachment metadata for image/file messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    /// Storage path assigned by the upload endpoint.
    pub file_path: String,
    /// Original file name.
    pub file_name: String,
    /// Size in bytes as reported by the upload endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    /// Public download URL resolved by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

/// A chat message as returned by the durable write or a history fetch.
///
/// `id` is the authoritative identifier assigned by the backend write; no
/// two entries with the same `id` coexist in a room's list after merging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    /// Body text. For attachment messages this is the caption or file name.
    #[serde(rename = "message")]
    pub body: String,
    #[serde(default)]
    pub message_type: MessageKind,
    pub sender_id: UserId,
    pub sender_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    /// True when the local identity authored this message.
    #[serde(default)]
    pub is_sender: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<String>,
    pub created_at: String,
}

/// Preview of the most recent message in a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastMessage {
    pub id: MessageId,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(default)]
    pub message_type: MessageKind,
    pub sender_id: UserId,
    #[serde(default)]
    pub is_sender: bool,
    pub created_at: String,
}

/// A two-party conversation scoped to one campaign relationship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub room_id: RoomId,
    pub campaign_id: i64,
    pub campaign_title: String,
    /// The counterpart participant in this conversation.
    pub other_user: Participant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<String>,
}

// ── Signal payloads ─────────────────────────────────────────────────

/// Payload for the outbound `send_message` announcement and the inbound
/// `new_message` relay.
///
/// Carries the canonical id assigned by the durable write so receivers can
/// deduplicate against their own copies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePush {
    pub room_id: RoomId,
    pub message_id: MessageId,
    pub message: String,
    pub sender_id: UserId,
    pub sender_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    pub message_type: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<Attachment>,
    /// Creation timestamp propagated by the relay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl MessagePush {
    /// Build the broadcast payload for a canonical message returned by the
    /// durable write.
    pub fn from_message(message: &Message) -> Self {
        Self {
            room_id: message.room_id.clone(),
            message_id: message.id,
            message: message.body.clone(),
            sender_id: message.sender_id,
            sender_name: message.sender_name.clone(),
            sender_avatar: message.sender_avatar.clone(),
            message_type: message.message_type,
            file_data: message.attachment.clone(),
            timestamp: Some(message.created_at.clone()),
        }
    }

    /// Materialize a full [`Message`] for a push received from another
    /// participant.
    pub fn into_message(self) -> Message {
        Message {
            id: self.message_id,
            room_id: self.room_id,
            body: self.message,
            message_type: self.message_type,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            sender_avatar: self.sender_avatar,
            is_sender: false,
            attachment: self.file_data,
            is_read: false,
            read_at: None,
            created_at: self.timestamp.unwrap_or_default(),
        }
    }
}

/// Payload for the outbound `typing_start` / `typing_stop` signals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub user_name: String,
}

/// Payload for the inbound `user_typing` relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserTypingPayload {
    pub room_id: RoomId,
    pub is_typing: bool,
    pub user_name: String,
}

/// Payload for the outbound `mark_read` signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadSignal {
    pub room_id: RoomId,
    pub message_ids: Vec<MessageId>,
    pub user_id: UserId,
}

/// Payload for the inbound `messages_read` relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagesReadPayload {
    pub room_id: RoomId,
    pub message_ids: Vec<MessageId>,
    /// Participant who read the messages.
    pub read_by: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Payload for the `user_join` identity announcement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinSignal {
    pub user_id: UserId,
    pub role: Role,
}

/// Payload for `join_room` / `leave_room`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSignal {
    pub room_id: RoomId,
}

// ── Signals ─────────────────────────────────────────────────────────

/// Signals sent from the client to the chat service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientSignal {
    /// Identity announcement; MUST be the first signal on a fresh transport.
    UserJoin(UserJoinSignal),
    /// Enter a conversation room.
    JoinRoom(RoomSignal),
    /// Leave a conversation room.
    LeaveRoom(RoomSignal),
    /// Announce an already-persisted message to the other room participants.
    SendMessage(MessagePush),
    /// The local user started typing.
    TypingStart(TypingSignal),
    /// The local user stopped typing.
    TypingStop(TypingSignal),
    /// Messages were read; lets the author flip read flags without a re-fetch.
    MarkRead(MarkReadSignal),
}

/// Signals relayed from the chat service to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerSignal {
    /// A message from another participant, or the echo of our own send.
    NewMessage(MessagePush),
    /// A participant's typing state changed.
    UserTyping(UserTypingPayload),
    /// Another participant read a set of messages.
    MessagesRead(MessagesReadPayload),
}
