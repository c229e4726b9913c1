use crate::config::Config;
use crate::live_event::RawEvent;
use crate::source::ConnectionStatus;

pub enum DaemonEvent {
    /// A notification from the live-event source, not yet normalized.
    Live(RawEvent),
    /// The live-event source changed connection state.
    Connection(ConnectionStatus),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; the daemon should clear the queue and exit.
    Shutdown,
}
