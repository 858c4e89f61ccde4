//! REST backend contract and the default HTTP implementation.
//!
//! The realtime connection only announces what already happened; every
//! durable effect goes through the REST operations defined by
//! [`ChatBackend`]. The message write is the source of truth for message
//! identity — the canonical [`Message`] with its server-assigned id comes
//! back from [`post_message`](ChatBackend::post_message), and only then is
//! the lightweight broadcast emitted.
//!
//! [`HttpBackend`] is the production implementation (reqwest, bearer auth,
//! `{"data": ...}` response envelopes), available behind the default
//! `backend-http` feature.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{Message, MessageId, Room, RoomId};

/// A file attachment staged for upload alongside a message.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    /// Original file name, forwarded to the upload endpoint.
    pub file_name: String,
    /// MIME type; the backend falls back to sniffing when absent.
    pub mime_type: Option<String>,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl AttachmentUpload {
    /// Stage an attachment from raw bytes.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: None,
            bytes,
        }
    }

    /// Set an explicit MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Draft of a message before the durable write.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub room_id: RoomId,
    /// Body text; may be empty for pure attachment messages.
    pub text: String,
    pub attachment: Option<AttachmentUpload>,
}

/// REST operations the chat client consumes from the marketplace backend.
///
/// Every method returns backend-authoritative records; the client never
/// invents ids, timestamps, or unread counts.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Fetch the room listing with previews and unread counts, ordered by
    /// last activity.
    async fn fetch_rooms(&self) -> Result<Vec<Room>>;

    /// Fetch the ordered message history of one room.
    async fn fetch_history(&self, room_id: &str) -> Result<Vec<Message>>;

    /// Persist a message. Returns the canonical record including the
    /// server-assigned id, timestamps, and resolved attachment URL.
    async fn post_message(&self, draft: &OutgoingMessage) -> Result<Message>;

    /// Persist read state for a set of messages in a room.
    async fn post_read(&self, room_id: &str, message_ids: &[MessageId]) -> Result<()>;

    /// Announce presence for this connection.
    async fn post_presence(&self, online: bool, connection_id: &str) -> Result<()>;
}

#[cfg(feature = "backend-http")]
mod http {
    use reqwest::Method;
    use serde::{Deserialize, Serialize};

    use super::{async_trait, ChatBackend, Message, MessageId, OutgoingMessage, Result, Room};
    use crate::error::ChatError;

    /// Response envelope the backend wraps every payload in.
    #[derive(Debug, Deserialize)]
    struct Envelope<T> {
        data: T,
    }

    #[derive(Debug, Deserialize)]
    struct HistoryPage {
        messages: Vec<Message>,
    }

    #[derive(Debug, Serialize)]
    struct SendBody<'a> {
        room_id: &'a str,
        message: &'a str,
    }

    #[derive(Debug, Serialize)]
    struct ReadBody<'a> {
        room_id: &'a str,
        message_ids: &'a [MessageId],
    }

    #[derive(Debug, Serialize)]
    struct PresenceBody<'a> {
        is_online: bool,
        socket_id: &'a str,
    }

    /// reqwest-backed [`ChatBackend`] implementation.
    ///
    /// # Example
    ///
    /// ```
    /// use creatorlink_chat::HttpBackend;
    ///
    /// let backend = HttpBackend::new("https://api.creatorlink.app/api")
    ///     .with_auth_token("token-from-login");
    /// ```
    #[derive(Debug, Clone)]
    pub struct HttpBackend {
        http: reqwest::Client,
        base_url: String,
        auth_token: Option<String>,
    }

    impl HttpBackend {
        /// Create a backend rooted at `base_url` (trailing slashes are
        /// stripped) with a default reqwest client.
        pub fn new(base_url: impl Into<String>) -> Self {
            let base_url = base_url.into().trim_end_matches('/').to_string();
            Self {
                http: reqwest::Client::new(),
                base_url,
                auth_token: None,
            }
        }

        /// Attach a bearer token sent with every request.
        #[must_use]
        pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
            self.auth_token = Some(token.into());
            self
        }

        /// Use a pre-configured reqwest client (timeouts, proxies, TLS).
        #[must_use]
        pub fn with_client(mut self, http: reqwest::Client) -> Self {
            self.http = http;
            self
        }

        fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
            let mut request = self.http.request(method, format!("{}{path}", self.base_url));
            if let Some(token) = &self.auth_token {
                request = request.bearer_auth(token);
            }
            request
        }
    }

    #[async_trait]
    impl ChatBackend for HttpBackend {
        async fn fetch_rooms(&self) -> Result<Vec<Room>> {
            let envelope: Envelope<Vec<Room>> = self
                .request(Method::GET, "/chat/rooms")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok(envelope.data)
        }

        async fn fetch_history(&self, room_id: &str) -> Result<Vec<Message>> {
            let envelope: Envelope<HistoryPage> = self
                .request(Method::GET, &format!("/chat/rooms/{room_id}/messages"))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok(envelope.data.messages)
        }

        async fn post_message(&self, draft: &OutgoingMessage) -> Result<Message> {
            let request = self.request(Method::POST, "/chat/messages");
            let request = match &draft.attachment {
                Some(upload) => {
                    let mut part = reqwest::multipart::Part::bytes(upload.bytes.clone())
                        .file_name(upload.file_name.clone());
                    if let Some(mime) = &upload.mime_type {
                        part = part.mime_str(mime).map_err(|e| {
                            ChatError::Backend(format!("invalid attachment mime type: {e}"))
                        })?;
                    }
                    let mut form = reqwest::multipart::Form::new()
                        .text("room_id", draft.room_id.clone())
                        .part("file", part);
                    if !draft.text.is_empty() {
                        form = form.text("message", draft.text.clone());
                    }
                    request.multipart(form)
                }
                None => request.json(&SendBody {
                    room_id: &draft.room_id,
                    message: &draft.text,
                }),
            };

            let envelope: Envelope<Message> = request
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok(envelope.data)
        }

        async fn post_read(&self, room_id: &str, message_ids: &[MessageId]) -> Result<()> {
            self.request(Method::POST, "/chat/messages/read")
                .json(&ReadBody {
                    room_id,
                    message_ids,
                })
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        }

        async fn post_presence(&self, online: bool, connection_id: &str) -> Result<()> {
            self.request(Method::POST, "/chat/online-status")
                .json(&PresenceBody {
                    is_online: online,
                    socket_id: connection_id,
                })
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        }
    }

}

#[cfg(feature = "backend-http")]
pub use http::HttpBackend;
