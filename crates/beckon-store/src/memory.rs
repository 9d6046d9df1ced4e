//! In-memory session log

use beckon_api::LogTag;
use beckon_util::{MonotonicInstant, SessionId};
use chrono::{DateTime, Local};
use std::sync::{Mutex, MutexGuard};

use crate::{ElapsedClock, LogEntry, LogError, LogResult, SessionLog};

/// Records of one session kept by [`MemorySessionLog`]
#[derive(Debug, Clone)]
pub struct RecordedSession {
    pub session_id: SessionId,
    pub started_at: DateTime<Local>,
    pub entries: Vec<LogEntry>,
    pub closed: bool,
}

#[derive(Default)]
struct MemoryState {
    clock: Option<ElapsedClock>,
    sessions: Vec<RecordedSession>,
}

/// Session log that keeps every record in memory
#[derive(Default)]
pub struct MemorySessionLog {
    state: Mutex<MemoryState>,
}

impl MemorySessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of the most recent session
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock()
            .sessions
            .last()
            .map(|s| s.entries.clone())
            .unwrap_or_default()
    }

    /// Every session recorded so far, oldest first
    pub fn sessions(&self) -> Vec<RecordedSession> {
        self.lock().sessions.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionLog for MemorySessionLog {
    fn open(
        &self,
        session_id: &SessionId,
        started_at: DateTime<Local>,
        started_at_mono: MonotonicInstant,
    ) -> LogResult<()> {
        let mut state = self.lock();
        if let Some(previous) = state.sessions.last_mut() {
            previous.closed = true;
        }
        state.clock = Some(ElapsedClock::new(started_at_mono));
        state.sessions.push(RecordedSession {
            session_id: session_id.clone(),
            started_at,
            entries: Vec::new(),
            closed: false,
        });
        Ok(())
    }

    fn append(&self, tag: LogTag, value: i64, now: MonotonicInstant) -> LogResult<LogEntry> {
        let mut state = self.lock();
        let clock = state.clock.as_mut().ok_or(LogError::NotOpen)?;
        let entry = LogEntry::new(tag, value, clock.elapsed_at(now));

        state
            .sessions
            .last_mut()
            .ok_or(LogError::NotOpen)?
            .entries
            .push(entry.clone());
        Ok(entry)
    }

    fn close(&self) -> LogResult<()> {
        let mut state = self.lock();
        if state.clock.take().is_some()
            && let Some(session) = state.sessions.last_mut()
        {
            session.closed = true;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lock().clock.is_some()
    }
}
