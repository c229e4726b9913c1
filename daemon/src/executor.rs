/// Runs a single [`Action`] against the side-effecting collaborators.
///
/// The executor has no queueing logic of its own; [`crate::queue::ActionQueue`]
/// guarantees it is never asked to run two actions at once.
use async_trait::async_trait;
use serde_json::json;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::{sleep, Instant};

use crate::action::{Action, ActionKind};
use crate::audio::AudioPlayer;
use crate::config::{ConfigStore, Settings};
use crate::input::{InjectError, InputInjector, MouseButton};
use crate::keys::{parse_key, Key};
use crate::overlay::OverlayHub;

/// Interval between taps while a repeating `key_hold` runs (~20 Hz).
const REPEAT_TAP_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("unknown key '{0}'")]
    UnknownKey(String),
    #[error("input device error: {0}")]
    Device(String),
    #[error("audio error: {0}")]
    Audio(String),
    #[error("failed to spawn command: {0}")]
    Spawn(String),
}

impl From<InjectError> for ExecutionError {
    fn from(e: InjectError) -> Self {
        ExecutionError::Device(e.0)
    }
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action) -> Result<(), ExecutionError>;
}

pub struct Executor {
    input: Arc<dyn InputInjector>,
    audio: Arc<dyn AudioPlayer>,
    overlay: OverlayHub,
    settings: Option<ConfigStore>,
}

impl Executor {
    pub fn new(input: Arc<dyn InputInjector>, audio: Arc<dyn AudioPlayer>, overlay: OverlayHub) -> Self {
        Self { input, audio, overlay, settings: None }
    }

    /// Reads the TTS and overlay switches from `store` at execution time. The
    /// switches travel with the emitted effect; observers decide whether to
    /// render it.
    pub fn with_settings(mut self, store: ConfigStore) -> Self {
        self.settings = Some(store);
        self
    }

    fn settings(&self) -> Settings {
        self.settings
            .as_ref()
            .map(|store| store.get_all().settings.clone())
            .unwrap_or_default()
    }

    fn speak(&self, text: &str) {
        let settings = self.settings();
        self.overlay.emit(
            "renderer-effect",
            json!({
                "type": "tts",
                "text": text,
                "volume": settings.tts_volume,
                "enabled": settings.enable_tts,
            }),
        );
    }

    async fn show_image(&self, file_path: &str, duration_ms: u64) {
        let enabled = self.settings().enable_overlay;
        self.overlay.emit(
            "overlay-image",
            json!({ "filePath": file_path, "duration": duration_ms, "enabled": enabled }),
        );
        // The queue is held for the full duration whether or not it is shown.
        sleep(Duration::from_millis(duration_ms)).await;
    }

    fn tap_key(&self, name: &str) -> Result<(), ExecutionError> {
        let key = resolve_key(name)?;
        self.input.tap(key)?;
        Ok(())
    }

    async fn hold_key(&self, name: &str, duration: Duration, repeat: bool) -> Result<(), ExecutionError> {
        let key = resolve_key(name)?;

        if repeat {
            let deadline = Instant::now() + duration;
            while Instant::now() < deadline {
                self.input.tap(key)?;
                sleep(REPEAT_TAP_INTERVAL).await;
            }
            return Ok(());
        }

        self.input.key_down(key)?;
        let held = HeldKey::new(Arc::clone(&self.input), key);
        sleep(duration).await;
        held.release()?;
        Ok(())
    }

    fn click_mouse(&self, x: i32, y: i32, button: MouseButton) -> Result<(), ExecutionError> {
        self.input.move_to(x, y)?;
        self.input.click(button)?;
        Ok(())
    }

    fn run_command(&self, command: &str) -> Result<(), ExecutionError> {
        let child = shell(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecutionError::Spawn(e.to_string()))?;

        // The queue entry completes now; the command reports on its own.
        let command = command.to_string();
        tokio::spawn(async move {
            match child.wait_with_output().await {
                Ok(output) => {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    if !stdout.trim().is_empty() {
                        tracing::info!(%command, stdout = %stdout.trim(), "Command output");
                    }
                    if !stderr.trim().is_empty() {
                        tracing::warn!(%command, stderr = %stderr.trim(), "Command error output");
                    }
                    if !output.status.success() {
                        tracing::warn!(%command, status = %output.status, "Command exited unsuccessfully");
                    }
                }
                Err(e) => tracing::warn!(%command, error = %e, "Failed to wait for command"),
            }
        });
        Ok(())
    }
}

#[async_trait]
impl ActionExecutor for Executor {
    async fn execute(&self, action: &Action) -> Result<(), ExecutionError> {
        match &action.kind {
            ActionKind::KeyTap { key } => self.tap_key(key),
            ActionKind::KeyHold { key, duration_ms, repeat } => {
                self.hold_key(key, Duration::from_millis(*duration_ms), *repeat).await
            }
            ActionKind::MouseClick { x, y, button } => self.click_mouse(*x, *y, *button),
            ActionKind::Tts { text } => {
                self.speak(text);
                Ok(())
            }
            ActionKind::Sound { file_path } => self.audio.play(file_path).await,
            ActionKind::OverlayImage { file_path, duration_ms } => {
                self.show_image(file_path, *duration_ms).await;
                Ok(())
            }
            ActionKind::Command { command } => self.run_command(command),
        }
    }
}

fn resolve_key(name: &str) -> Result<Key, ExecutionError> {
    parse_key(name).ok_or_else(|| ExecutionError::UnknownKey(name.to_string()))
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", command]);
    cmd
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", command]);
    cmd
}

/// A key that has been pressed down and must be released exactly once.
///
/// [`HeldKey::release`] retries a failed key-up once. If the guard is dropped
/// without being released (the hold future was cancelled) the key-up is
/// issued from `Drop`.
struct HeldKey {
    input: Arc<dyn InputInjector>,
    key: Key,
    released: bool,
}

impl HeldKey {
    fn new(input: Arc<dyn InputInjector>, key: Key) -> Self {
        Self { input, key, released: false }
    }

    fn release(mut self) -> Result<(), InjectError> {
        self.released = true;
        match self.input.key_up(self.key) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Key release failed; forcing release");
                if let Err(retry) = self.input.key_up(self.key) {
                    tracing::error!(key = %self.key, error = %retry, "Forced key release failed");
                }
                Err(e)
            }
        }
    }
}

impl Drop for HeldKey {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.input.key_up(self.key) {
                tracing::error!(key = %self.key, error = %e, "Failed to release held key");
            }
        }
    }
}
