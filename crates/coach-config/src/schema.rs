//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Session scheduling and status rules
    #[serde(default)]
    pub sessions: RawSessionRules,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Log directory
    pub log_dir: Option<PathBuf>,

    /// Data directory for the session database
    pub data_dir: Option<PathBuf>,

    /// Per-client request budget per second
    pub requests_per_second: Option<u32>,
}

/// Session rules
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSessionRules {
    /// Hours before the start during which cancellation is refused
    pub cancellation_window_hours: Option<u32>,

    /// How often pending sessions are scanned for upcoming reminders
    pub reminder_scan_seconds: Option<u64>,

    /// Allow booking sessions whose start is already in the past
    #[serde(default)]
    pub allow_past_booking: bool,

    /// Maximum length of the notes field, in characters
    pub max_notes_chars: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [service]
            socket_path = "/run/coachd/coachd.sock"
            data_dir = "/var/lib/coachd"
            requests_per_second = 10

            [sessions]
            cancellation_window_hours = 4
            reminder_scan_seconds = 30
            allow_past_booking = true
            max_notes_chars = 500
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.requests_per_second, Some(10));
        assert_eq!(config.sessions.cancellation_window_hours, Some(4));
        assert!(config.sessions.allow_past_booking);
        assert_eq!(config.sessions.max_notes_chars, Some(500));
    }

    #[test]
    fn sections_are_optional() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.service.socket_path.is_none());
        assert!(config.sessions.cancellation_window_hours.is_none());
        assert!(!config.sessions.allow_past_booking);
    }
}
