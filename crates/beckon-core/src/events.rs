//! Core events emitted by the engine

use beckon_api::{CallKind, SessionOutcome};
use beckon_util::SessionId;
use chrono::{DateTime, Local};

/// Events emitted by the call engine
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// Session started
    SessionStarted {
        session_id: SessionId,
        started_at: DateTime<Local>,
    },

    /// A valid face detection was counted
    FaceCounted { session_id: SessionId, count: u32 },

    /// The relay finished a call attempt
    CallAcknowledged { session_id: SessionId, iteration: u32 },

    /// The child should be called
    CallChild {
        session_id: SessionId,
        kind: CallKind,
        attempt: u32,
    },

    /// The session reached a conclusion and should be stopped
    SessionConcluded {
        session_id: SessionId,
        outcome: SessionOutcome,
    },
}

impl CoreEvent {
    /// Session the event belongs to
    pub fn session_id(&self) -> &SessionId {
        match self {
            CoreEvent::SessionStarted { session_id, .. }
            | CoreEvent::FaceCounted { session_id, .. }
            | CoreEvent::CallAcknowledged { session_id, .. }
            | CoreEvent::CallChild { session_id, .. }
            | CoreEvent::SessionConcluded { session_id, .. } => session_id,
        }
    }
}
