//! Default paths for coachd components
//!
//! All defaults are user-writable:
//! - Socket: `$XDG_RUNTIME_DIR/coachd/coachd.sock` or `/tmp/coachd-$USER/coachd.sock`
//! - Data: `$XDG_DATA_HOME/coachd` or `~/.local/share/coachd`
//! - Config: `$XDG_CONFIG_HOME/coachd/config.toml` or `~/.config/coachd/config.toml`
//! - Logs: `$XDG_STATE_HOME/coachd` or `~/.local/state/coachd`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const COACH_SOCKET_ENV: &str = "COACH_SOCKET";

/// Environment variable for overriding the data directory
pub const COACH_DATA_DIR_ENV: &str = "COACH_DATA_DIR";

const SOCKET_FILENAME: &str = "coachd.sock";
const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "coachd";

/// Socket path, honouring `$COACH_SOCKET` first
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(COACH_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Socket path ignoring `$COACH_SOCKET`, for config defaults
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Data directory, honouring `$COACH_DATA_DIR` first
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(COACH_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Data directory ignoring `$COACH_DATA_DIR`, for config defaults
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share").join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Configuration file location
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Log directory
pub fn default_log_dir() -> PathBuf {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("state").join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("logs")
}
