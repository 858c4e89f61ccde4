//! # Basic Chat Example
//!
//! Demonstrates a complete chat client lifecycle:
//!
//! 1. Connect to the chat service via WebSocket (with automatic reconnect)
//! 2. Announce the authenticated identity
//! 3. Open the first conversation room
//! 4. React to pushes (messages, typing indicators, read receipts)
//! 5. Send lines typed on stdin, shut down gracefully on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Point at a running chat service, then:
//! cargo run --example basic_chat
//!
//! # Override the endpoints and credentials:
//! CHAT_WS_URL=ws://my-host:3001 \
//! CHAT_API_URL=http://my-host:8000/api \
//! CHAT_TOKEN=token-from-login \
//! cargo run --example basic_chat
//! ```

use creatorlink_chat::{
    ChatClient, ChatConfig, ChatEvent, HttpBackend, Identity, Role, WebSocketConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Default realtime endpoint when `CHAT_WS_URL` is not set.
const DEFAULT_WS_URL: &str = "ws://localhost:3001";

/// Default REST endpoint when `CHAT_API_URL` is not set.
const DEFAULT_API_URL: &str = "http://localhost:8000/api";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let ws_url = std::env::var("CHAT_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string());
    let api_url = std::env::var("CHAT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    tracing::info!("Connecting to {ws_url} (REST at {api_url})");

    let connector = WebSocketConnector::new(ws_url);
    let mut backend = HttpBackend::new(api_url);
    if let Ok(token) = std::env::var("CHAT_TOKEN") {
        backend = backend.with_auth_token(token);
    }

    // Replace with the identity issued by your login flow.
    let config = ChatConfig::new(Identity::new(7, "RustDemo", Role::Brand));

    // Start the client. This spawns a background driver that owns the
    // transport and emits events on `event_rx`.
    let (mut client, mut event_rx) = ChatClient::start(connector, backend, config);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut active_room: Option<String> = None;

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            // Branch 1: events from the chat session.
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    ChatEvent::StatusChanged(status) => {
                        tracing::info!("Connection status: {status:?}");
                    }

                    ChatEvent::RoomsUpdated(rooms) => {
                        // Open the first conversation once the listing lands.
                        if active_room.is_none() {
                            if let Some(room) = rooms.first() {
                                tracing::info!(
                                    "Opening room {} ({})",
                                    room.room_id,
                                    room.campaign_title
                                );
                                active_room = Some(room.room_id.clone());
                                client.select_room(room.clone())?;
                            }
                        }
                        for room in &rooms {
                            tracing::info!(
                                "  {} — {} unread, counterpart {}",
                                room.room_id,
                                room.unread_count,
                                room.other_user.name
                            );
                        }
                    }

                    ChatEvent::HistoryLoaded { room_id, messages } => {
                        tracing::info!("{} messages in {room_id}", messages.len());
                        for message in &messages {
                            tracing::info!("  [{}] {}: {}", message.created_at, message.sender_name, message.body);
                        }
                    }

                    ChatEvent::MessageAppended(message) => {
                        tracing::info!("{}: {}", message.sender_name, message.body);
                        // Visible messages from the counterpart are acknowledged
                        // automatically by the client; nothing to do here.
                    }

                    ChatEvent::TypingChanged { names, .. } => {
                        if names.is_empty() {
                            tracing::info!("(nobody is typing)");
                        } else {
                            tracing::info!("{} typing…", names.join(", "));
                        }
                    }

                    ChatEvent::ReceiptsApplied { message_ids, .. } => {
                        tracing::info!("Read receipts for {message_ids:?}");
                    }
                }
            }

            // Branch 2: a line typed on stdin is sent to the active room.
            line = stdin.next_line() => {
                let Ok(Some(line)) = line else { break };
                let Some(room_id) = active_room.clone() else {
                    tracing::warn!("No active room yet");
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match client.send(room_id, line.trim(), None).await {
                    Ok(message) => tracing::info!("Delivered as message {}", message.id),
                    Err(e) => tracing::error!("Send failed: {e}"),
                }
            }

            // Branch 3: Ctrl+C shuts down gracefully.
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    client.shutdown().await;
    tracing::info!("Goodbye");
    Ok(())
}
