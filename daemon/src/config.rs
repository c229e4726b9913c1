use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::action::Action;
use crate::event::DaemonEvent;
use crate::trigger::Trigger;

pub const DEFAULT_ACTION_PACING_MS: u64 = 100;
pub const DEFAULT_OVERLAY_BIND: &str = "127.0.0.1:3000";

/// Root configuration structure. Deserialized from `<app data dir>/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    /// Evaluated in file order.
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Master switch: when off, live events never fire triggers.
    #[serde(default = "default_true")]
    pub enable_automation: bool,
    /// When off, `tts` actions are skipped. Speech is synthesized by overlay
    /// observers, never locally.
    #[serde(default = "default_true")]
    pub enable_tts: bool,
    /// When off, `overlay_image` actions are skipped.
    #[serde(default = "default_true")]
    pub enable_overlay: bool,
    /// 0.0–1.0, forwarded with speech effects.
    #[serde(default = "default_tts_volume")]
    pub tts_volume: f32,
    /// Pause between two queued actions.
    #[serde(default = "default_action_pacing_ms")]
    pub action_pacing_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_automation: true,
            enable_tts: true,
            enable_overlay: true,
            tts_volume: default_tts_volume(),
            action_pacing_ms: DEFAULT_ACTION_PACING_MS,
        }
    }
}

impl Settings {
    pub fn action_pacing(&self) -> Duration {
        Duration::from_millis(self.action_pacing_ms)
    }
}

/// Websocket server that remote overlays (e.g. a browser source) connect to.
#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_overlay_bind")]
    pub bind: SocketAddr,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_overlay_bind(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioConfig {
    /// Overrides the platform sound player (e.g. "aplay", "mpv").
    pub player: Option<String>,
}

impl Config {
    /// Returns human-readable problems that do not prevent loading: duplicate
    /// ids and trigger action references that resolve to nothing.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let mut trigger_ids = HashSet::new();
        for t in &self.triggers {
            if !trigger_ids.insert(t.id.as_str()) {
                warnings.push(format!("duplicate trigger id '{}'", t.id));
            }
        }

        let mut action_ids = HashSet::new();
        for a in &self.actions {
            if !action_ids.insert(a.id.as_str()) {
                warnings.push(format!("duplicate action id '{}'", a.id));
            }
        }

        for t in &self.triggers {
            for id in &t.actions {
                if !action_ids.contains(id.as_str()) {
                    warnings.push(format!("trigger '{}' references unknown action '{id}'", t.id));
                }
            }
        }
        warnings
    }

    /// First action with the given id.
    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }
}

/// Partial update for [`ConfigStore::set`]. Present sections replace the
/// stored ones wholesale; absent sections are left untouched.
#[derive(Debug, Default)]
pub struct ConfigPatch {
    pub settings: Option<Settings>,
    pub triggers: Option<Vec<Trigger>>,
    pub actions: Option<Vec<Action>>,
}

/// Shared, last-write-wins holder of the current [`Config`].
///
/// Readers get a cheap [`Arc`] snapshot that stays consistent for the whole
/// evaluation of one event even if a reload lands meanwhile.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    current: Arc<RwLock<Arc<Config>>>,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn get_all(&self) -> Arc<Config> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn set(&self, patch: ConfigPatch) {
        let mut guard = self.current.write().unwrap_or_else(|p| p.into_inner());
        let mut next = Config::clone(&guard);
        if let Some(settings) = patch.settings {
            next.settings = settings;
        }
        if let Some(triggers) = patch.triggers {
            next.triggers = triggers;
        }
        if let Some(actions) = patch.actions {
            next.actions = actions;
        }
        *guard = Arc::new(next);
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    for warning in config.warnings() {
        tracing::warn!(path = %path.display(), "{warning}");
    }
    Ok(config)
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the config
/// file is created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create config file watcher");
            return;
        }
    };

    // Watch the parent directory rather than the file directly so we catch
    // editor-style atomic saves (write-new + rename).
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            tracing::error!(path = %path.display(), "Config path has no parent directory");
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        tracing::error!(error = %e, dir = %watch_dir.display(), "Failed to watch config directory");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Failed to reload config: {e:#}"),
            }
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_tts_volume() -> f32 {
    1.0
}

fn default_action_pacing_ms() -> u64 {
    DEFAULT_ACTION_PACING_MS
}

fn default_overlay_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}
