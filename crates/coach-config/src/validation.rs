//! Configuration validation

use crate::schema::RawConfig;
use thiserror::Error;

/// Longest cancellation window accepted (one week)
pub const MAX_CANCELLATION_WINDOW_HOURS: u32 = 168;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("cancellation_window_hours must be between 1 and {max}, got {value}")]
    CancellationWindowOutOfRange { value: u32, max: u32 },

    #[error("reminder_scan_seconds must be greater than zero")]
    ZeroReminderInterval,

    #[error("requests_per_second must be greater than zero")]
    ZeroRequestBudget,

    #[error("max_notes_chars must be greater than zero")]
    ZeroNotesLimit,

    #[error("{field} must not be an empty path")]
    EmptyPath { field: &'static str },
}

/// Validate a raw configuration, collecting every problem found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let service = &config.service;
    for (field, path) in [
        ("socket_path", &service.socket_path),
        ("data_dir", &service.data_dir),
        ("log_dir", &service.log_dir),
    ] {
        if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            errors.push(ValidationError::EmptyPath { field });
        }
    }

    if service.requests_per_second == Some(0) {
        errors.push(ValidationError::ZeroRequestBudget);
    }

    let sessions = &config.sessions;
    if let Some(hours) = sessions.cancellation_window_hours
        && !(1..=MAX_CANCELLATION_WINDOW_HOURS).contains(&hours)
    {
        errors.push(ValidationError::CancellationWindowOutOfRange {
            value: hours,
            max: MAX_CANCELLATION_WINDOW_HOURS,
        });
    }

    if sessions.reminder_scan_seconds == Some(0) {
        errors.push(ValidationError::ZeroReminderInterval);
    }

    if sessions.max_notes_chars == Some(0) {
        errors.push(ValidationError::ZeroNotesLimit);
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawServiceConfig, RawSessionRules};
    use std::path::PathBuf;

    fn config_with(sessions: RawSessionRules) -> RawConfig {
        RawConfig {
            config_version: 1,
            service: RawServiceConfig::default(),
            sessions,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let errors = validate_config(&config_with(RawSessionRules::default()));
        assert!(errors.is_empty());
    }

    #[test]
    fn window_bounds() {
        for (hours, ok) in [(0, false), (1, true), (2, true), (168, true), (169, false)] {
            let errors = validate_config(&config_with(RawSessionRules {
                cancellation_window_hours: Some(hours),
                ..Default::default()
            }));
            assert_eq!(errors.is_empty(), ok, "window of {} hours", hours);
        }
    }

    #[test]
    fn collects_every_error() {
        let config = RawConfig {
            config_version: 1,
            service: RawServiceConfig {
                socket_path: Some(PathBuf::new()),
                requests_per_second: Some(0),
                ..Default::default()
            },
            sessions: RawSessionRules {
                reminder_scan_seconds: Some(0),
                max_notes_chars: Some(0),
                ..Default::default()
            },
        };

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::EmptyPath {
            field: "socket_path"
        }));
        assert!(errors.contains(&ValidationError::ZeroReminderInterval));
    }
}
