mod action;
mod audio;
mod config;
mod evaluator;
mod event;
mod executor;
mod input;
mod keys;
mod live_event;
mod overlay;
mod paths;
mod queue;
mod source;
mod status;
mod trigger;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::event::DaemonEvent;
use crate::source::{ConnectionState, LiveEventSource};

#[derive(Parser)]
#[command(name = "streamlink-daemon", version, about = "Turns live-stream events into automated actions")]
struct Cli {
    /// Config file (defaults to config.toml in the app data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replay recorded live events from a JSON-lines file, or "-" for stdin
    #[arg(short, long)]
    events: Option<String>,

    /// Do not start the overlay websocket server
    #[arg(long)]
    no_overlay: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "streamlink_daemon=debug"
    } else {
        "streamlink_daemon=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = paths::app_data_dir();
    std::fs::create_dir_all(&app_dir)
        .with_context(|| format!("Failed to create app data directory {}", app_dir.display()))?;

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = match cli.config {
        Some(path) => std::path::absolute(&path)
            .with_context(|| format!("Invalid config path {}", path.display()))?,
        None => paths::config_file_path(),
    };
    let initial_config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        tracing::error!("Config error (using defaults): {e:#}");
        config::Config::default()
    });
    let overlay_settings = initial_config.overlay.clone();
    let audio_player = initial_config.audio.player.clone();
    let pacing = initial_config.settings.action_pacing();
    let store = config::ConfigStore::new(initial_config);

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths::status_file_path();
    let mut current_status = status::DaemonStatus::new();
    status::write_status(&status_path, &current_status);

    // ── Pipeline ──────────────────────────────────────────────────────────────
    let hub = overlay::OverlayHub::default();
    let executor = executor::Executor::new(
        Arc::new(input::DryRunInjector),
        Arc::new(audio::SystemAudioPlayer::new(audio_player)),
        hub.clone(),
    )
    .with_settings(store.clone());
    let queue = queue::ActionQueue::new(Arc::new(executor), pacing);

    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    let evaluator = evaluator::TriggerEvaluator::new(store.clone(), queue.clone()).with_notices(notice_tx);

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(256);

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));

    if overlay_settings.enabled && !cli.no_overlay {
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = overlay::serve(overlay_settings.bind, hub).await {
                tracing::error!("{e:#}");
            }
        });
    }

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    let source = source::ReplaySource::new(event_tx.clone());
    if let Some(identifier) = &cli.events {
        if let Err(e) = source.connect(identifier).await {
            tracing::error!(%identifier, error = %e, "Failed to connect live event source");
        }
    }

    tracing::info!("streamlink-daemon v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            Some(evt) = event_rx.recv() => match evt {
                DaemonEvent::Live(raw) => {
                    let Some(event) = live_event::normalize(&raw) else {
                        continue;
                    };
                    tracing::debug!(kind = event.overlay_name(), user = event.user().display_name(), "Live event");
                    hub.emit(event.overlay_name(), event.to_payload());
                    evaluator.process(&event);
                }

                DaemonEvent::Connection(conn) => {
                    match &conn.reason {
                        Some(reason) => tracing::info!(state = ?conn.state, %reason, "Live source status"),
                        None => tracing::info!(state = ?conn.state, "Live source status"),
                    }
                    current_status.apply_connection(&conn);
                    status::write_status(&status_path, &current_status);
                    hub.emit("status", serde_json::to_value(&conn).unwrap_or_default());

                    // The replay catalog is complete once the input is exhausted.
                    if conn.state == ConnectionState::Disconnected
                        && conn.reason.as_deref() == Some(source::STREAM_ENDED)
                    {
                        match source.fetch_room_info().await {
                            Ok(info) => tracing::info!(room = ?info, "Room info"),
                            Err(e) => tracing::debug!(error = %e, "Room info unavailable"),
                        }
                        match source.fetch_available_gifts().await {
                            Ok(gifts) => tracing::info!(count = gifts.len(), "Available gifts"),
                            Err(e) => tracing::debug!(error = %e, "Gift list unavailable"),
                        }
                    }
                }

                DaemonEvent::ConfigReloaded(new_config) => {
                    tracing::info!(
                        triggers = new_config.triggers.len(),
                        actions = new_config.actions.len(),
                        "Config reloaded"
                    );
                    // Overlay and audio settings apply on restart.
                    queue.set_pacing(new_config.settings.action_pacing());
                    store.set(config::ConfigPatch {
                        settings: Some(new_config.settings),
                        triggers: Some(new_config.triggers),
                        actions: Some(new_config.actions),
                    });
                }

                DaemonEvent::Shutdown => {
                    tracing::info!(queue = ?queue.state(), "Shutting down");
                    if !queue.is_empty() {
                        tracing::info!(pending = queue.len(), "Discarding queued actions");
                    }
                    let cancelled = queue.clear();
                    if cancelled > 0 {
                        tracing::info!(cancelled, "Cancelled queued actions");
                    }
                    if let Err(e) = source.disconnect().await {
                        tracing::debug!(error = %e, "Live source was not connected");
                    }
                    current_status.state = ConnectionState::Disconnected;
                    current_status.error = None;
                    status::write_status(&status_path, &current_status);
                    break;
                }
            },

            Some(notice) = notice_rx.recv() => {
                tracing::info!(trigger_id = %notice.trigger_id, enqueued = notice.enqueued, "{}", notice.message);
                if notice.enqueued == 0 {
                    tracing::warn!(trigger_id = %notice.trigger_id, "Trigger fired without enqueuing any action");
                }
                current_status.record_trigger(&notice.message, chrono::Utc::now());
                status::write_status(&status_path, &current_status);
                hub.emit("log", serde_json::Value::String(notice.message));
            }

            else => break,
        }
    }

    Ok(())
}
