/// Overlay fan-out.
///
/// Everything the pipeline wants an overlay to show goes through
/// [`OverlayHub::emit`]. The hub is a broadcast channel: the daemon's own
/// observer and every websocket client served by [`serve`] receive the same
/// messages, and emitting with nobody listening is not an error.
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OverlayMessage {
    pub event: String,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct OverlayHub {
    tx: broadcast::Sender<OverlayMessage>,
}

impl Default for OverlayHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl OverlayHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes `payload` under `event` and returns how many observers got it.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        let message = OverlayMessage {
            event: event.to_string(),
            payload,
        };
        match self.tx.send(message) {
            Ok(n) => n,
            Err(_) => {
                tracing::trace!(event, "No overlay observers attached");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OverlayMessage> {
        self.tx.subscribe()
    }
}

// ── Websocket server ──────────────────────────────────────────────────────────

fn router(hub: OverlayHub) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/ws", get(ws_handler))
        .with_state(hub)
}

/// Serves remote overlays on `addr` until the task is dropped.
pub async fn serve(addr: SocketAddr, hub: OverlayHub) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind overlay server on {addr}"))?;
    tracing::info!(%addr, "Overlay server listening");
    axum::serve(listener, router(hub))
        .await
        .context("Overlay server stopped")
}

async fn banner() -> &'static str {
    "StreamLink Overlay Server Running"
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<OverlayHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: OverlayHub) {
    tracing::info!("Overlay client connected");
    let mut messages = hub.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            msg = messages.recv() => match msg {
                Ok(msg) => {
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to encode overlay message");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Overlay client lagging; dropped messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Overlays are receive-only; anything they send is ignored.
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!("Overlay client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emit_without_observers_is_not_an_error() {
        let hub = OverlayHub::default();
        assert_eq!(hub.emit("overlay-image", json!({ "filePath": "a.png" })), 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_same_message() {
        let hub = OverlayHub::new(8);
        let mut local = hub.subscribe();
        let mut remote = hub.subscribe();

        assert_eq!(hub.emit("renderer-effect", json!({ "type": "tts", "text": "hi" })), 2);

        let a = local.recv().await.unwrap();
        let b = remote.recv().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.event, "renderer-effect");
        assert_eq!(a.payload["text"], "hi");
    }

    #[test]
    fn message_serializes_as_event_and_payload() {
        let msg = OverlayMessage {
            event: "log".into(),
            payload: json!("Triggered: roses (gift)"),
        };
        let text = serde_json::to_string(&msg).unwrap();
        assert_eq!(text, r#"{"event":"log","payload":"Triggered: roses (gift)"}"#);
    }

    #[tokio::test]
    async fn banner_identifies_server() {
        assert_eq!(banner().await, "StreamLink Overlay Server Running");
    }
}
