//! Config validation CLI tool
//!
//! Validates a coachd configuration file and reports any errors.

use coach_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a coachd configuration file.");
            eprintln!();
            eprintln!("Default location: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match coach_config::load_config(&config_path) {
        Ok(config) => {
            let rules = &config.sessions;
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", coach_config::CURRENT_CONFIG_VERSION);
            println!("  Socket: {}", config.service.socket_path.display());
            println!("  Data dir: {}", config.service.data_dir.display());
            println!("  Log dir: {}", config.service.log_dir.display());
            println!(
                "  Request budget: {}/s per client",
                config.service.requests_per_second
            );
            println!(
                "  Cancellation window: {} hours",
                rules.cancellation_window_hours
            );
            println!(
                "  Reminder scan: {}",
                coach_util::format_duration(rules.reminder_scan_interval)
            );
            println!("  Past booking allowed: {}", rules.allow_past_booking);
            println!("  Notes limit: {} chars", rules.max_notes_chars);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                coach_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                coach_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                coach_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                coach_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        coach_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
