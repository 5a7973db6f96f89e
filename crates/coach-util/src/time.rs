//! Time utilities for coachd
//!
//! Every decision in coachd takes `now` as a parameter. The only place the
//! system clock is read is [`now()`], which the daemon calls at the edge of
//! each request or tick.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `COACH_MOCK_TIME` environment variable can be set
//! to shift the clock. The mocked clock keeps advancing in real time.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)
//!
//! ```bash
//! COACH_MOCK_TIME="2025-12-25 14:30:00" coachd
//! ```

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "COACH_MOCK_TIME";

/// Format accepted by [`parse_local_datetime`] and `COACH_MOCK_TIME`
pub const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SECONDS_PER_HOUR: i64 = 3600;

static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)]
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match parse_local_datetime(&mock_time_str) {
                    Some(mock_dt) => {
                        let offset = mock_dt.signed_duration_since(chrono::Local::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    None => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = LOCAL_DATETIME_FORMAT,
                            "Invalid mock time, using system clock"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Current local time, shifted by `COACH_MOCK_TIME` in debug builds.
#[allow(clippy::disallowed_methods)]
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS` as a local time.
///
/// Returns `None` for malformed input and for local times that do not exist
/// or are ambiguous (DST transitions).
pub fn parse_local_datetime(s: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), LOCAL_DATETIME_FORMAT).ok()?;
    Local.from_local_datetime(&naive).single()
}

/// Whole hours from `now` until `target`, rounded toward negative infinity.
///
/// 1h59m is 1, exactly 2h is 2, 30 minutes ago is -1.
pub fn whole_hours_until<Tz1: TimeZone, Tz2: TimeZone>(
    target: &DateTime<Tz1>,
    now: &DateTime<Tz2>,
) -> i64 {
    let secs = target
        .clone()
        .signed_duration_since(now.clone())
        .num_seconds();
    secs.div_euclid(SECONDS_PER_HOUR)
}

/// Format a DateTime with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format(LOCAL_DATETIME_FORMAT).to_string()
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Utc};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, h, m, 0).unwrap()
    }

    #[test]
    fn whole_hours_floor_positive() {
        let now = at(10, 0);
        assert_eq!(whole_hours_until(&at(12, 0), &now), 2);
        assert_eq!(whole_hours_until(&at(11, 59), &now), 1);
        assert_eq!(whole_hours_until(&at(10, 30), &now), 0);
        assert_eq!(whole_hours_until(&at(10, 0), &now), 0);
    }

    #[test]
    fn whole_hours_floor_negative() {
        let now = at(10, 0);
        assert_eq!(whole_hours_until(&at(9, 30), &now), -1);
        assert_eq!(whole_hours_until(&at(9, 0), &now), -1);
        assert_eq!(whole_hours_until(&at(8, 59), &now), -2);
    }

    #[test]
    fn whole_hours_ignores_time_zone_of_operands() {
        let now_utc = at(10, 0);
        let now_local = now_utc.with_timezone(&Local);
        assert_eq!(
            whole_hours_until(&at(13, 0), &now_local),
            whole_hours_until(&at(13, 0), &now_utc)
        );
    }

    #[test]
    fn parse_local_datetime_accepts_expected_format() {
        let dt = parse_local_datetime("2025-12-25 14:30:00").unwrap();
        assert_eq!(format_datetime_full(&dt), "2025-12-25 14:30:00");
    }

    #[test]
    fn parse_local_datetime_rejects_other_formats() {
        for input in [
            "2025-12-25",
            "14:30:00",
            "2025/12/25 14:30:00",
            "2025-12-25T14:30:00",
            "",
            "not a date",
        ] {
            assert!(parse_local_datetime(input).is_none(), "accepted {:?}", input);
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_now_returns_time() {
        let t = now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }

    #[test]
    fn test_now_advances() {
        let t1 = now();
        std::thread::sleep(Duration::from_millis(20));
        let t2 = now();
        assert!(t2 > t1);
    }
}
