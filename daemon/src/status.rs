use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::source::{ConnectionState, ConnectionStatus};

/// Runtime status written by the daemon to `<app data dir>/status.toml`.
/// External tools read this file to display connection and trigger activity.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Connection state of the live-event source.
    pub state: ConnectionState,
    /// Stream identifier the source is attached to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Notice text of the most recently fired trigger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_trigger: Option<String>,
    /// RFC 3339 timestamp of the most recently fired trigger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_trigger_timestamp: Option<String>,
    pub triggers_fired: u64,
    /// Why the source last disconnected or failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonStatus {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: ConnectionState::Disconnected,
            identifier: None,
            last_trigger: None,
            last_trigger_timestamp: None,
            triggers_fired: 0,
            error: None,
        }
    }

    pub fn apply_connection(&mut self, status: &ConnectionStatus) {
        self.state = status.state;
        self.identifier = status.identifier.clone();
        match status.state {
            ConnectionState::Connecting | ConnectionState::Connected => self.error = None,
            ConnectionState::Disconnected | ConnectionState::Disconnecting => {
                if status.reason.is_some() {
                    self.error = status.reason.clone();
                }
            }
        }
    }

    pub fn record_trigger(&mut self, message: &str, at: DateTime<Utc>) {
        self.last_trigger = Some(message.to_string());
        self.last_trigger_timestamp = Some(at.to_rfc3339());
        self.triggers_fired += 1;
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist. Failures are logged and
/// otherwise ignored.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(dir = %parent.display(), error = %e, "Failed to create status directory");
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                tracing::warn!(error = %e, "Failed to write status file");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to serialize status"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // ── DaemonStatus::new ─────────────────────────────────────────────────────

    #[test]
    fn new_starts_disconnected() {
        let s = DaemonStatus::new();
        assert_eq!(s.state, ConnectionState::Disconnected);
        assert_eq!(s.triggers_fired, 0);
        assert_eq!(s.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn new_has_no_optional_fields() {
        let s = DaemonStatus::new();
        assert!(s.identifier.is_none());
        assert!(s.last_trigger.is_none());
        assert!(s.last_trigger_timestamp.is_none());
        assert!(s.error.is_none());
    }

    // ── updates ───────────────────────────────────────────────────────────────

    #[test]
    fn connection_changes_track_state_and_reason() {
        let mut s = DaemonStatus::new();
        s.apply_connection(&ConnectionStatus::new(ConnectionState::Connected, Some("@host".into())));
        assert_eq!(s.state, ConnectionState::Connected);
        assert_eq!(s.identifier.as_deref(), Some("@host"));

        s.apply_connection(
            &ConnectionStatus::new(ConnectionState::Disconnected, Some("@host".into()))
                .with_reason("Stream Ended"),
        );
        assert_eq!(s.state, ConnectionState::Disconnected);
        assert_eq!(s.error.as_deref(), Some("Stream Ended"));

        // Reconnecting clears the stale reason.
        s.apply_connection(&ConnectionStatus::new(ConnectionState::Connecting, Some("@host".into())));
        assert!(s.error.is_none());
    }

    #[test]
    fn record_trigger_counts_and_stamps() {
        let mut s = DaemonStatus::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 20, 30, 0).unwrap();
        s.record_trigger("Triggered: roses (gift)", at);
        s.record_trigger("Triggered: jump (chat)", at);

        assert_eq!(s.triggers_fired, 2);
        assert_eq!(s.last_trigger.as_deref(), Some("Triggered: jump (chat)"));
        assert_eq!(s.last_trigger_timestamp.as_deref(), Some("2024-05-01T20:30:00+00:00"));
    }

    // ── serialization ─────────────────────────────────────────────────────────

    #[test]
    fn state_serializes_to_lowercase() {
        let mut s = DaemonStatus::new();
        assert!(toml::to_string_pretty(&s).unwrap().contains("state = \"disconnected\""));

        s.state = ConnectionState::Connected;
        assert!(toml::to_string_pretty(&s).unwrap().contains("state = \"connected\""));

        s.state = ConnectionState::Disconnecting;
        assert!(toml::to_string_pretty(&s).unwrap().contains("state = \"disconnecting\""));
    }

    // ── write_status ──────────────────────────────────────────────────────────

    #[test]
    fn write_status_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dir").join("status.toml");
        write_status(&path, &DaemonStatus::new());
        assert!(path.exists());
    }

    #[test]
    fn write_status_content_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");

        let mut original = DaemonStatus::new();
        original.state = ConnectionState::Connected;
        original.identifier = Some("@host".to_string());
        original.record_trigger("Triggered: roses (gift)", Utc::now());

        write_status(&path, &original);

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: DaemonStatus = toml::from_str(&content).unwrap();

        assert_eq!(parsed.state, ConnectionState::Connected);
        assert_eq!(parsed.identifier.as_deref(), Some("@host"));
        assert_eq!(parsed.triggers_fired, 1);
        assert_eq!(parsed.last_trigger, original.last_trigger);
    }

    #[test]
    fn write_status_omits_none_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");
        write_status(&path, &DaemonStatus::new());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("identifier"));
        assert!(!content.contains("last_trigger"));
        assert!(!content.contains("error"));
    }

    #[test]
    fn write_status_into_unwritable_location_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        // Parent "directory" is a regular file, so creation fails.
        write_status(&blocker.join("status.toml"), &DaemonStatus::new());
        assert!(!blocker.join("status.toml").exists());
    }
}
