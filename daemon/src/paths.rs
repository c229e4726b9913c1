/// Canonical file paths for StreamLink data files.
///
/// Both files live in the application data directory:
///   - config.toml  Triggers, actions and settings, read by the daemon.
///   - status.toml  Written by the daemon for external tools.
///
/// The directory is `%APPDATA%\StreamLink` on Windows and
/// `$XDG_CONFIG_HOME/StreamLink` (falling back to `~/.config/StreamLink`)
/// elsewhere.
use std::path::PathBuf;

const APP_DIR_NAME: &str = "StreamLink";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

pub fn app_data_dir() -> PathBuf {
    base_dir(|key| std::env::var_os(key)).join(APP_DIR_NAME)
}

fn base_dir(var: impl Fn(&str) -> Option<std::ffi::OsString>) -> PathBuf {
    let non_empty = |key: &str| var(key).filter(|v| !v.is_empty()).map(PathBuf::from);
    non_empty("APPDATA")
        .or_else(|| non_empty("XDG_CONFIG_HOME"))
        .or_else(|| non_empty("HOME").map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

pub fn status_file_path() -> PathBuf {
    app_data_dir().join(STATUS_FILE_NAME)
}
