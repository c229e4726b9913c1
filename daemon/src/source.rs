/// Live-event sources.
///
/// A source pushes [`DaemonEvent::Live`] notifications and
/// [`DaemonEvent::Connection`] changes into the daemon channel. Only the
/// replay backend ships here; it reads newline-delimited JSON from a file or
/// stdin.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::event::DaemonEvent;
use crate::live_event::RawEvent;

/// Disconnect reason reported when the input runs out.
pub const STREAM_ENDED: &str = "Stream Ended";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("already connected to {0}")]
    AlreadyConnected(String),
    #[error("not connected")]
    NotConnected,
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not available from this source")]
    Unsupported(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub state: ConnectionState,
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConnectionStatus {
    pub fn new(state: ConnectionState, identifier: Option<String>) -> Self {
        Self {
            connected: state == ConnectionState::Connected,
            state,
            identifier,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub viewer_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub diamond_count: u64,
}

#[async_trait]
pub trait LiveEventSource: Send + Sync {
    async fn connect(&self, identifier: &str) -> Result<(), SourceError>;
    async fn disconnect(&self) -> Result<(), SourceError>;
    async fn fetch_room_info(&self) -> Result<RoomInfo, SourceError>;
    async fn fetch_available_gifts(&self) -> Result<Vec<GiftInfo>, SourceError>;
}

// ── Replay backend ────────────────────────────────────────────────────────────

#[derive(Default)]
struct ReplayState {
    /// Bumped on every connect so a finished reader only clears its own session.
    session: u64,
    identifier: Option<String>,
    reader: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Catalog {
    room_info: Option<RoomInfo>,
    gifts: Option<Vec<GiftInfo>>,
}

/// Replays recorded events, one JSON [`RawEvent`] per line.
///
/// Lines of kind `roomInfo` and `gifts` are not forwarded; they populate what
/// [`LiveEventSource::fetch_room_info`] and
/// [`LiveEventSource::fetch_available_gifts`] return for the latest session.
/// End of input disconnects the source, after which it can connect again.
pub struct ReplaySource {
    tx: mpsc::Sender<DaemonEvent>,
    state: Arc<Mutex<ReplayState>>,
    catalog: Arc<Mutex<Catalog>>,
}

impl ReplaySource {
    pub fn new(tx: mpsc::Sender<DaemonEvent>) -> Self {
        Self {
            tx,
            state: Arc::new(Mutex::new(ReplayState::default())),
            catalog: Arc::new(Mutex::new(Catalog::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, ReplayState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn status(&self, status: ConnectionStatus) {
        let _ = self.tx.send(DaemonEvent::Connection(status)).await;
    }

    /// Reports `status` without waiting for room in the daemon channel. Used
    /// on paths the daemon loop itself awaits.
    fn status_now(&self, status: ConnectionStatus) {
        let state = status.state;
        if self.tx.try_send(DaemonEvent::Connection(status)).is_err() {
            tracing::debug!(?state, "Daemon channel full or closed; status not delivered");
        }
    }
}

#[async_trait]
impl LiveEventSource for ReplaySource {
    async fn connect(&self, identifier: &str) -> Result<(), SourceError> {
        let session = {
            let mut state = self.state();
            if let Some(current) = &state.identifier {
                return Err(SourceError::AlreadyConnected(current.clone()));
            }
            state.session += 1;
            state.identifier = Some(identifier.to_string());
            state.session
        };
        *self.catalog.lock().unwrap_or_else(|p| p.into_inner()) = Catalog::default();
        let id = Some(identifier.to_string());
        self.status(ConnectionStatus::new(ConnectionState::Connecting, id.clone())).await;

        let input: Box<dyn AsyncRead + Send + Unpin> = if identifier == "-" {
            Box::new(tokio::io::stdin())
        } else {
            let path = PathBuf::from(identifier);
            match tokio::fs::File::open(&path).await {
                Ok(file) => Box::new(file),
                Err(source) => {
                    self.state().identifier = None;
                    let err = SourceError::Open { path, source };
                    self.status(
                        ConnectionStatus::new(ConnectionState::Disconnected, id)
                            .with_reason(err.to_string()),
                    )
                    .await;
                    return Err(err);
                }
            }
        };

        tracing::info!(identifier, "Replay source connected");
        self.status(ConnectionStatus::new(ConnectionState::Connected, id.clone())).await;

        let mut state = self.state();
        if state.session != session || state.identifier.is_none() {
            // Disconnected while the connect was still reporting.
            return Ok(());
        }
        let reader = ReaderSession {
            session,
            identifier: id,
            tx: self.tx.clone(),
            state: Arc::clone(&self.state),
            catalog: Arc::clone(&self.catalog),
        };
        state.reader = Some(tokio::spawn(read_lines(input, reader)));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SourceError> {
        let (identifier, reader) = {
            let mut state = self.state();
            let Some(identifier) = state.identifier.take() else {
                return Err(SourceError::NotConnected);
            };
            (identifier, state.reader.take())
        };

        // Stop the reader first: it may be parked on a full daemon channel.
        if let Some(reader) = reader {
            reader.abort();
            let _ = reader.await;
        }
        let id = Some(identifier);
        self.status_now(ConnectionStatus::new(ConnectionState::Disconnecting, id.clone()));
        self.status_now(ConnectionStatus::new(ConnectionState::Disconnected, id));
        tracing::info!("Replay source disconnected");
        Ok(())
    }

    async fn fetch_room_info(&self) -> Result<RoomInfo, SourceError> {
        self.catalog
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .room_info
            .clone()
            .ok_or(SourceError::Unsupported("room info"))
    }

    async fn fetch_available_gifts(&self) -> Result<Vec<GiftInfo>, SourceError> {
        self.catalog
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .gifts
            .clone()
            .ok_or(SourceError::Unsupported("gift list"))
    }
}

struct ReaderSession {
    session: u64,
    identifier: Option<String>,
    tx: mpsc::Sender<DaemonEvent>,
    state: Arc<Mutex<ReplayState>>,
    catalog: Arc<Mutex<Catalog>>,
}

async fn read_lines(input: Box<dyn AsyncRead + Send + Unpin>, session: ReaderSession) {
    let ReaderSession { session, identifier, tx, state, catalog } = session;
    let mut input = BufReader::new(input);
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    let reason = loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf).await {
            Ok(0) => break STREAM_ENDED.to_string(),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Replay input failed");
                break e.to_string();
            }
        }
        line_no += 1;

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping replay line that is not UTF-8");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        let raw: RawEvent = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed replay line");
                continue;
            }
        };

        match raw.kind.as_str() {
            "roomInfo" => update_catalog(&catalog, line_no, raw.data, |c, info: RoomInfo| c.room_info = Some(info)),
            "gifts" => update_catalog(&catalog, line_no, raw.data, |c, gifts: Vec<GiftInfo>| c.gifts = Some(gifts)),
            _ => {
                if tx.send(DaemonEvent::Live(raw)).await.is_err() {
                    break "daemon channel closed".to_string();
                }
            }
        }
    };

    {
        let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
        if state.session == session {
            state.identifier = None;
            state.reader = None;
        }
    }
    let status = ConnectionStatus::new(ConnectionState::Disconnected, identifier).with_reason(reason);
    let _ = tx.send(DaemonEvent::Connection(status)).await;
}

fn update_catalog<T: serde::de::DeserializeOwned>(
    catalog: &Mutex<Catalog>,
    line_no: usize,
    data: Value,
    apply: impl FnOnce(&mut Catalog, T),
) {
    match serde_json::from_value::<T>(data) {
        Ok(value) => apply(&mut catalog.lock().unwrap_or_else(|p| p.into_inner()), value),
        Err(e) => tracing::warn!(line = line_no, error = %e, "Skipping malformed replay catalog line"),
    }
}
