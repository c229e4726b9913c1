/// Keyboard and mouse injection seam.
///
/// The executor only talks to [`InputInjector`]. OS-level injection backends
/// plug in behind it; the daemon ships [`DryRunInjector`], which logs every
/// injection so trigger setups can be exercised without touching the desktop.
use serde::Deserialize;
use thiserror::Error;

use crate::keys::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// A failure reported by the injection backend.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct InjectError(pub String);

/// Synchronous input primitives. Implementations must be callable from any
/// thread; the executor calls them from the queue's drain task.
pub trait InputInjector: Send + Sync {
    fn key_down(&self, key: Key) -> Result<(), InjectError>;

    fn key_up(&self, key: Key) -> Result<(), InjectError>;

    /// Single key-down + key-up.
    fn tap(&self, key: Key) -> Result<(), InjectError> {
        self.key_down(key)?;
        self.key_up(key)
    }

    fn move_to(&self, x: i32, y: i32) -> Result<(), InjectError>;

    fn click(&self, button: MouseButton) -> Result<(), InjectError>;
}

/// Logs injections instead of performing them.
#[derive(Debug, Default)]
pub struct DryRunInjector;

impl InputInjector for DryRunInjector {
    fn key_down(&self, key: Key) -> Result<(), InjectError> {
        tracing::info!(%key, "key down");
        Ok(())
    }

    fn key_up(&self, key: Key) -> Result<(), InjectError> {
        tracing::info!(%key, "key up");
        Ok(())
    }

    fn move_to(&self, x: i32, y: i32) -> Result<(), InjectError> {
        tracing::info!(x, y, "mouse move");
        Ok(())
    }

    fn click(&self, button: MouseButton) -> Result<(), InjectError> {
        tracing::info!(?button, "mouse click");
        Ok(())
    }
}
