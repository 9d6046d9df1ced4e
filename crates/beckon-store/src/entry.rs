//! Session log records

use beckon_api::LogTag;
use beckon_util::{MonotonicInstant, format_elapsed_seconds};
use std::path::Path;
use std::time::Duration;

use crate::{LogError, LogResult};

/// One line of a session log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub tag: LogTag,
    pub value: i64,
    /// Time since the session started
    pub elapsed: Duration,
}

impl LogEntry {
    pub fn new(tag: LogTag, value: i64, elapsed: Duration) -> Self {
        Self { tag, value, elapsed }
    }

    /// Render as `tag\tvalue\telapsed\n`
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\n",
            self.tag,
            self.value,
            format_elapsed_seconds(self.elapsed)
        )
    }

    /// Parse a single record, with or without the trailing newline
    pub fn parse_line(line: &str) -> LogResult<Self> {
        let malformed = || LogError::Malformed(line.to_string());

        let mut fields = line.trim_end_matches(['\r', '\n']).split('\t');
        let (Some(tag), Some(value), Some(elapsed), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed());
        };

        let tag = tag.parse::<LogTag>().map_err(|_| malformed())?;
        let value = value.parse::<i64>().map_err(|_| malformed())?;
        let seconds = elapsed.parse::<f64>().map_err(|_| malformed())?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(malformed());
        }

        // Records carry millisecond precision
        let millis = (seconds * 1000.0).round() as u64;
        Ok(Self::new(tag, value, Duration::from_millis(millis)))
    }
}

/// Read every record of a session log file
pub fn read_log(path: impl AsRef<Path>) -> LogResult<Vec<LogEntry>> {
    std::fs::read_to_string(path)?
        .lines()
        .filter(|line| !line.is_empty())
        .map(LogEntry::parse_line)
        .collect()
}

/// Elapsed-time source for one open session
///
/// Never reports less than it already reported, so records stay ordered
/// even if callers pass slightly stale instants.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ElapsedClock {
    started_at: MonotonicInstant,
    last: Duration,
}

impl ElapsedClock {
    pub(crate) fn new(started_at: MonotonicInstant) -> Self {
        Self {
            started_at,
            last: Duration::ZERO,
        }
    }

    pub(crate) fn elapsed_at(&mut self, now: MonotonicInstant) -> Duration {
        let elapsed = now.duration_since(self.started_at).max(self.last);
        self.last = elapsed;
        elapsed
    }
}
