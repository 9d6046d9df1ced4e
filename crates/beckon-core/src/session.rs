//! Session state machine

use beckon_api::{CallKind, EventValue, SessionInfo, SessionOutcome, SessionState};
use beckon_config::SchedulerPolicy;
use beckon_util::{MonotonicInstant, SessionId};
use chrono::{DateTime, Local};
use std::time::Duration;

/// Period of the evaluation loop
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Inactivity (no face, no call) that triggers the next decision
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Face detections after a call that count as the child responding
pub const REQUIRED_FACE_APPEARANCES: u32 = 5;

/// Structured fields a face payload must carry to count
pub const MIN_FACE_FIELDS: usize = 2;

/// Decision reached by one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Call the child. `attempt` is the 1-based attempt within the stage.
    Call { kind: CallKind, attempt: u32 },
    /// The session is over
    Conclude(SessionOutcome),
}

/// Result of recording a face detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceOutcome {
    /// Valid detection; carries the new appearance count
    Counted(u32),
    /// Payload had too few fields; the timestamp was still refreshed
    Invalid { fields: usize },
    /// No active session
    Ignored,
}

/// One calling session
#[derive(Debug, Clone)]
pub struct CallSession {
    pub session_id: SessionId,

    /// Current state
    pub state: SessionState,

    /// Wall-clock start time (for log naming and display)
    pub started_at: DateTime<Local>,

    /// Monotonic start time (for elapsed time)
    pub started_at_mono: MonotonicInstant,

    /// Acknowledged call attempts
    pub iteration: u32,

    /// Valid face detections since the last call decision
    pub face_appearances: u32,

    /// Most recent face detection, valid or not
    pub last_face: MonotonicInstant,

    /// Most recent call decision or acknowledgment
    pub last_call: MonotonicInstant,
}

impl CallSession {
    /// Start a session. Both timers start at `now_mono`, so the first call
    /// comes one idle timeout after the start.
    pub fn new(session_id: SessionId, now: DateTime<Local>, now_mono: MonotonicInstant) -> Self {
        Self {
            session_id,
            state: SessionState::Active,
            started_at: now,
            started_at_mono: now_mono,
            iteration: 0,
            face_appearances: 0,
            last_face: now_mono,
            last_call: now_mono,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Record a face detection notification
    pub fn record_face(&mut self, payload: &EventValue, now_mono: MonotonicInstant) -> FaceOutcome {
        if !self.is_active() {
            return FaceOutcome::Ignored;
        }

        self.last_face = now_mono;

        let fields = payload.field_count();
        if fields < MIN_FACE_FIELDS {
            return FaceOutcome::Invalid { fields };
        }

        self.face_appearances += 1;
        FaceOutcome::Counted(self.face_appearances)
    }

    /// Record a completed call attempt. Returns the new iteration count.
    pub fn record_acknowledgement(&mut self, now_mono: MonotonicInstant) -> Option<u32> {
        if !self.is_active() {
            return None;
        }

        self.last_call = now_mono;
        self.iteration += 1;
        Some(self.iteration)
    }

    /// Whether the child has responded to at least one call
    pub fn has_responded(&self) -> bool {
        self.iteration >= 1 && self.face_appearances >= REQUIRED_FACE_APPEARANCES
    }

    /// Whether neither a face nor a call happened for the idle timeout
    pub fn is_idle(&self, now_mono: MonotonicInstant) -> bool {
        now_mono.duration_since(self.last_face) >= IDLE_TIMEOUT
            && now_mono.duration_since(self.last_call) >= IDLE_TIMEOUT
    }

    /// Run one evaluation and apply its effects to the session
    pub fn evaluate(
        &mut self,
        now_mono: MonotonicInstant,
        policy: &SchedulerPolicy,
    ) -> Option<Decision> {
        if !self.is_active() {
            return None;
        }

        if self.has_responded() {
            self.state = SessionState::Concluding;
            return Some(Decision::Conclude(SessionOutcome::Responded));
        }

        if !self.is_idle(now_mono) {
            return None;
        }

        let decision = if self.iteration < policy.by_name_attempts {
            Decision::Call {
                kind: CallKind::ByName,
                attempt: self.iteration + 1,
            }
        } else if self.iteration < policy.special_phrase_until {
            Decision::Call {
                kind: CallKind::SpecialPhrase,
                attempt: self.iteration - policy.by_name_attempts + 1,
            }
        } else {
            self.state = SessionState::Concluding;
            return Some(Decision::Conclude(SessionOutcome::NoResponse));
        };

        self.face_appearances = 0;
        self.last_call = now_mono;
        Some(decision)
    }

    /// Get session duration so far
    pub fn duration_so_far(&self, now_mono: MonotonicInstant) -> Duration {
        now_mono.duration_since(self.started_at_mono)
    }

    /// Get session info for snapshots
    pub fn to_session_info(&self, now_mono: MonotonicInstant) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            state: self.state,
            started_at: self.started_at,
            iteration: self.iteration,
            face_appearances: self.face_appearances,
            elapsed: self.duration_so_far(now_mono),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face() -> EventValue {
        EventValue::List(vec![EventValue::Float(0.1), EventValue::Float(0.2)])
    }

    fn make_session() -> (CallSession, MonotonicInstant) {
        let now_mono = MonotonicInstant::now();
        let session = CallSession::new(SessionId::new(), Local::now(), now_mono);
        (session, now_mono)
    }

    #[test]
    fn test_session_creation() {
        let (session, start) = make_session();

        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.iteration, 0);
        assert_eq!(session.face_appearances, 0);
        assert!(!session.is_idle(start));
        assert!(session.is_idle(start + IDLE_TIMEOUT));
    }

    #[test]
    fn test_first_call_after_idle_timeout() {
        let policy = SchedulerPolicy::default();
        let (mut session, start) = make_session();

        assert_eq!(session.evaluate(start + Duration::from_millis(4900), &policy), None);

        let at = start + IDLE_TIMEOUT;
        assert_eq!(
            session.evaluate(at, &policy),
            Some(Decision::Call {
                kind: CallKind::ByName,
                attempt: 1
            })
        );
        assert_eq!(session.last_call, at);

        // No second call until another idle timeout passes
        assert_eq!(session.evaluate(at + Duration::from_millis(100), &policy), None);
    }

    #[test]
    fn test_call_resets_face_count() {
        let policy = SchedulerPolicy::default();
        let (mut session, start) = make_session();

        session.record_face(&face(), start);
        session.record_face(&face(), start);
        assert_eq!(session.face_appearances, 2);

        // Faces refreshed last_face at start, so idle is measured from there
        let decision = session.evaluate(start + IDLE_TIMEOUT, &policy);
        assert!(matches!(decision, Some(Decision::Call { .. })));
        assert_eq!(session.face_appearances, 0);
    }

    #[test]
    fn test_invalid_face_refreshes_timer_only() {
        let (mut session, start) = make_session();
        let later = start + Duration::from_secs(3);

        let outcome = session.record_face(&EventValue::List(vec![EventValue::Int(1)]), later);

        assert_eq!(outcome, FaceOutcome::Invalid { fields: 1 });
        assert_eq!(session.face_appearances, 0);
        assert_eq!(session.last_face, later);
        assert_eq!(
            session.record_face(&EventValue::Int(4), later),
            FaceOutcome::Invalid { fields: 0 }
        );
    }

    #[test]
    fn test_success_requires_a_call_first() {
        let policy = SchedulerPolicy::default();
        let (mut session, start) = make_session();

        for _ in 0..REQUIRED_FACE_APPEARANCES {
            session.record_face(&face(), start);
        }
        // Faces before any acknowledged call do not end the session
        assert_eq!(session.evaluate(start + Duration::from_millis(100), &policy), None);

        session.record_acknowledgement(start + Duration::from_millis(200));
        assert_eq!(
            session.evaluate(start + Duration::from_millis(300), &policy),
            Some(Decision::Conclude(SessionOutcome::Responded))
        );
        assert_eq!(session.state, SessionState::Concluding);
    }

    #[test]
    fn test_attempt_stages() {
        let policy = SchedulerPolicy {
            by_name_attempts: 3,
            special_phrase_until: 4,
            ..Default::default()
        };
        let (mut session, start) = make_session();
        let mut now = start;
        let mut decisions = Vec::new();

        for _ in 0..5 {
            now = now + IDLE_TIMEOUT;
            let decision = session.evaluate(now, &policy);
            decisions.push(decision);
            if matches!(decision, Some(Decision::Call { .. })) {
                session.record_acknowledgement(now);
            }
        }

        assert_eq!(
            decisions,
            vec![
                Some(Decision::Call {
                    kind: CallKind::ByName,
                    attempt: 1,
                }),
                Some(Decision::Call {
                    kind: CallKind::ByName,
                    attempt: 2,
                }),
                Some(Decision::Call {
                    kind: CallKind::ByName,
                    attempt: 3,
                }),
                Some(Decision::Call {
                    kind: CallKind::SpecialPhrase,
                    attempt: 1,
                }),
                Some(Decision::Conclude(SessionOutcome::NoResponse)),
            ]
        );
        assert_eq!(session.state, SessionState::Concluding);
    }

    #[test]
    fn test_concluding_session_ignores_notifications() {
        let policy = SchedulerPolicy {
            by_name_attempts: 0,
            special_phrase_until: 0,
            ..Default::default()
        };
        let (mut session, start) = make_session();

        assert_eq!(
            session.evaluate(start + IDLE_TIMEOUT, &policy),
            Some(Decision::Conclude(SessionOutcome::NoResponse))
        );
        assert_eq!(session.record_face(&face(), start), FaceOutcome::Ignored);
        assert_eq!(session.record_acknowledgement(start), None);
        assert_eq!(session.iteration, 0);
        assert_eq!(session.evaluate(start + IDLE_TIMEOUT * 2, &policy), None);
    }

    #[test]
    fn test_unacknowledged_call_is_repeated() {
        let policy = SchedulerPolicy::default();
        let (mut session, start) = make_session();

        let first = session.evaluate(start + IDLE_TIMEOUT, &policy);
        let second = session.evaluate(start + IDLE_TIMEOUT * 2, &policy);

        // Without an acknowledgment the iteration does not advance
        assert_eq!(first, second);
        assert_eq!(session.iteration, 0);
    }
}
