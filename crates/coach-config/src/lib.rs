//! Configuration parsing and validation for coachd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Service paths and request budget
//! - Session rules (cancellation window, reminders, booking limits)
//! - Validation with clear error messages

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = content.len(), "Read config file");
    parse_config(&content)
}

/// Load configuration, falling back to defaults when the file does not exist
pub fn load_config_or_default(path: impl AsRef<Path>) -> ConfigResult<Config> {
    match load_config(path.as_ref()) {
        Err(ConfigError::ReadError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.as_ref().display(), "No config file, using defaults");
            Ok(Config::default())
        }
        other => other,
    }
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Config::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let config = parse_config("config_version = 1").unwrap();
        assert_eq!(config.sessions.cancellation_window_hours, 2);
    }

    #[test]
    fn parse_custom_window() {
        let config = parse_config(
            r#"
            config_version = 1

            [sessions]
            cancellation_window_hours = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.sessions.cancellation_window_hours, 6);
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values() {
        let result = parse_config(
            r#"
            config_version = 1

            [sessions]
            cancellation_window_hours = 0
            "#,
        );
        match result {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn reject_malformed_toml() {
        assert!(matches!(
            parse_config("config_version = "),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "config_version = 1\n[sessions]\nmax_notes_chars = 42").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.sessions.max_notes_chars, 42);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.sessions, SessionRules::default());

        assert!(matches!(
            load_config(dir.path().join("absent.toml")),
            Err(ConfigError::ReadError(_))
        ));
    }
}
