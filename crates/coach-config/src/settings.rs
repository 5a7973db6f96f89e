//! Validated configuration structures

use crate::schema::{RawConfig, RawServiceConfig, RawSessionRules};
use std::path::PathBuf;
use std::time::Duration;

/// Default cancellation window, in hours
pub const DEFAULT_CANCELLATION_WINDOW_HOURS: u32 = 2;

/// Default interval between reminder scans
pub const DEFAULT_REMINDER_SCAN: Duration = Duration::from_secs(60);

/// Default per-client request budget
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 30;

/// Default notes length limit
pub const DEFAULT_MAX_NOTES_CHARS: usize = 10_000;

/// Validated configuration ready for use by the core engine
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub service: ServiceConfig,
    pub sessions: SessionRules,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            sessions: SessionRules::from_raw(raw.sessions),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub log_dir: PathBuf,
    pub data_dir: PathBuf,
    pub requests_per_second: u32,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        let defaults = Self::default();
        Self {
            socket_path: raw.socket_path.unwrap_or(defaults.socket_path),
            log_dir: raw.log_dir.unwrap_or(defaults.log_dir),
            data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
            requests_per_second: raw
                .requests_per_second
                .unwrap_or(defaults.requests_per_second),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: coach_util::socket_path_without_env(),
            log_dir: coach_util::default_log_dir(),
            data_dir: coach_util::data_dir_without_env(),
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }
}

/// Session scheduling and status rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRules {
    /// Cancellation is refused while the start is strictly less than this
    /// many whole hours away (and not yet reached)
    pub cancellation_window_hours: u32,
    pub reminder_scan_interval: Duration,
    pub allow_past_booking: bool,
    pub max_notes_chars: usize,
}

impl SessionRules {
    fn from_raw(raw: RawSessionRules) -> Self {
        Self {
            cancellation_window_hours: raw
                .cancellation_window_hours
                .unwrap_or(DEFAULT_CANCELLATION_WINDOW_HOURS),
            reminder_scan_interval: raw
                .reminder_scan_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REMINDER_SCAN),
            allow_past_booking: raw.allow_past_booking,
            max_notes_chars: raw.max_notes_chars.unwrap_or(DEFAULT_MAX_NOTES_CHARS),
        }
    }
}

impl Default for SessionRules {
    fn default() -> Self {
        Self::from_raw(RawSessionRules::default())
    }
}
