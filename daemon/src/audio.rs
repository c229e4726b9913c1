/// Sound playback through the operating system's command-line player.
///
/// The executor awaits [`AudioPlayer::play`] so a queued sound finishes before
/// the next action starts.
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::executor::ExecutionError;

#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Plays `path` and returns once playback has finished.
    async fn play(&self, path: &Path) -> Result<(), ExecutionError>;
}

/// Runs the platform player (or a configured override) as a child process.
#[derive(Debug, Default)]
pub struct SystemAudioPlayer {
    program: Option<String>,
}

impl SystemAudioPlayer {
    pub fn new(program: Option<String>) -> Self {
        Self { program }
    }

    fn command(&self, path: &Path) -> Command {
        if let Some(program) = &self.program {
            let mut cmd = Command::new(program);
            cmd.arg(path);
            return cmd;
        }
        platform_command(path)
    }
}

#[cfg(target_os = "macos")]
fn platform_command(path: &Path) -> Command {
    let mut cmd = Command::new("afplay");
    cmd.arg(path);
    cmd
}

#[cfg(windows)]
fn platform_command(path: &Path) -> Command {
    // Single quotes are escaped by doubling inside a PowerShell literal.
    let literal = path.to_string_lossy().replace('\'', "''");
    let mut cmd = Command::new("powershell");
    cmd.args([
        "-NoProfile",
        "-NonInteractive",
        "-Command",
        &format!("(New-Object Media.SoundPlayer '{literal}').PlaySync()"),
    ]);
    cmd
}

#[cfg(not(any(windows, target_os = "macos")))]
fn platform_command(path: &Path) -> Command {
    let mut cmd = Command::new("paplay");
    cmd.arg(path);
    cmd
}

#[async_trait]
impl AudioPlayer for SystemAudioPlayer {
    async fn play(&self, path: &Path) -> Result<(), ExecutionError> {
        if !path.exists() {
            return Err(ExecutionError::Audio(format!(
                "sound file not found: {}",
                path.display()
            )));
        }

        tracing::debug!(path = %path.display(), "Playing sound");
        let output = self
            .command(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ExecutionError::Audio(format!("failed to start sound player: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ExecutionError::Audio(format!(
                "sound player exited with {}: {}",
                output.status,
                stderr.trim()
            )))
        }
    }
}
