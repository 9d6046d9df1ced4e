//! Session log trait definitions

use beckon_api::LogTag;
use beckon_util::{MonotonicInstant, SessionId};
use chrono::{DateTime, Local};

use crate::{LogEntry, LogResult};

/// Append-only recorder for one session at a time
///
/// Implementations serialize access to their sink with their own lock, so
/// the log can be shared freely between tasks.
pub trait SessionLog: Send + Sync {
    /// Open a fresh sink for a session. A sink left open by a previous
    /// session is closed first.
    fn open(
        &self,
        session_id: &SessionId,
        started_at: DateTime<Local>,
        started_at_mono: MonotonicInstant,
    ) -> LogResult<()>;

    /// Append a record stamped with the time elapsed since the session start
    fn append(&self, tag: LogTag, value: i64, now: MonotonicInstant) -> LogResult<LogEntry>;

    /// Flush and release the sink. Closing a closed log is a no-op.
    fn close(&self) -> LogResult<()>;

    /// Whether a sink is currently open
    fn is_open(&self) -> bool;
}
