//! Time utilities for beckon
//!
//! Monotonic time drives idle timeouts and elapsed-time stamps. It is read
//! from the tokio clock, so it follows `tokio::time::pause()` in tests.
//! Wall-clock time is only used to stamp and name session logs.
//!
//! In debug builds `BECKON_MOCK_TIME` (`YYYY-MM-DD HH:MM:SS`) shifts the
//! wall clock, which makes log file names predictable during development.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable that shifts the wall clock in debug builds
pub const MOCK_TIME_ENV_VAR: &str = "BECKON_MOCK_TIME";

const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        if !cfg!(debug_assertions) {
            return None;
        }
        let value = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
        parse_mock_time(&value, Local::now())
    })
}

/// Offset from `real_now` to the instant described by `value`
fn parse_mock_time(value: &str, real_now: DateTime<Local>) -> Option<chrono::Duration> {
    let mock = NaiveDateTime::parse_from_str(value, MOCK_TIME_FORMAT)
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).single());

    match mock {
        Some(mock) => {
            let offset = mock.signed_duration_since(real_now);
            tracing::info!(mock_time = %value, offset_secs = offset.num_seconds(), "Mock time enabled");
            Some(offset)
        }
        None => {
            tracing::warn!(mock_time = %value, expected_format = MOCK_TIME_FORMAT, "Ignoring invalid mock time");
            None
        }
    }
}

pub fn is_mock_time_active() -> bool {
    mock_time_offset().is_some()
}

/// Current local time, shifted by the mock offset if one is set
pub fn now() -> DateTime<Local> {
    let real_now = Local::now();
    match mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Format an elapsed duration as decimal seconds with millisecond precision
pub fn format_elapsed_seconds(d: Duration) -> String {
    format!("{:.3}", d.as_millis() as f64 / 1000.0)
}

/// A point in monotonic time, immune to wall-clock changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicInstant(tokio::time::Instant);

impl MonotonicInstant {
    pub fn now() -> Self {
        Self(tokio::time::Instant::now())
    }

    /// Duration since `earlier`, or zero if `earlier` is later than `self`
    pub fn duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MonotonicInstant(self.0 + rhs)
    }
}
