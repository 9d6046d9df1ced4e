//! Call engine

use beckon_api::{EventValue, LogTag, SessionInfo, SessionState, StopReason};
use beckon_config::SchedulerPolicy;
use beckon_store::SessionLog;
use beckon_util::{BeckonError, MonotonicInstant, Result, SessionId};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::{CallSession, CoreEvent, Decision, FaceOutcome};

/// Summary of a stopped session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopSummary {
    pub session_id: SessionId,
    pub reason: StopReason,
    pub iteration: u32,
    pub face_appearances: u32,
    pub duration: Duration,
}

/// Stop decision from the call engine
#[derive(Debug)]
pub enum StopDecision {
    Stopped(StopSummary),
    NoActiveSession,
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerSnapshot {
    pub state: SessionState,
    pub current_session: Option<SessionInfo>,
    pub sessions_started: u64,
}

/// Owns the current session and its log
///
/// All methods are synchronous and take the current instant from the caller.
pub struct CallEngine {
    policy: SchedulerPolicy,
    log: Arc<dyn SessionLog>,
    current_session: Option<CallSession>,
    sessions_started: u64,
}

impl CallEngine {
    pub fn new(policy: SchedulerPolicy, log: Arc<dyn SessionLog>) -> Self {
        info!(
            by_name_attempts = policy.by_name_attempts,
            special_phrase_until = policy.special_phrase_until,
            "Call engine initialized"
        );

        Self {
            policy,
            log,
            current_session: None,
            sessions_started: 0,
        }
    }

    /// Start a new session and open its log
    pub fn start_session(
        &mut self,
        now: DateTime<Local>,
        now_mono: MonotonicInstant,
    ) -> Result<CoreEvent> {
        if let Some(session) = &self.current_session {
            return Err(BeckonError::SessionAlreadyActive(session.session_id.clone()));
        }

        let session = CallSession::new(SessionId::new(), now, now_mono);

        if let Err(e) = self.log.open(&session.session_id, now, now_mono) {
            warn!(session_id = %session.session_id, error = %e, "Failed to open session log");
        }

        self.sessions_started += 1;
        info!(
            session_id = %session.session_id,
            sessions_started = self.sessions_started,
            "Session started"
        );

        let event = CoreEvent::SessionStarted {
            session_id: session.session_id.clone(),
            started_at: now,
        };
        self.current_session = Some(session);
        Ok(event)
    }

    /// Handle a `face-detected` notification
    pub fn notify_face_detected(
        &mut self,
        payload: &EventValue,
        now_mono: MonotonicInstant,
    ) -> Option<CoreEvent> {
        let session = self.current_session.as_mut()?;

        match session.record_face(payload, now_mono) {
            FaceOutcome::Counted(count) => {
                let session_id = session.session_id.clone();
                self.append(LogTag::FaceDetected, i64::from(count), now_mono);
                Some(CoreEvent::FaceCounted { session_id, count })
            }
            FaceOutcome::Invalid { fields } => {
                warn!(
                    session_id = %session.session_id,
                    fields,
                    payload = ?payload,
                    "Ignoring face detection with too few fields"
                );
                None
            }
            FaceOutcome::Ignored => None,
        }
    }

    /// Handle a `call-acknowledged` notification
    pub fn notify_call_acknowledged(
        &mut self,
        payload: &EventValue,
        now_mono: MonotonicInstant,
    ) -> Option<CoreEvent> {
        let session = self.current_session.as_mut()?;
        let iteration = session.record_acknowledgement(now_mono)?;
        let session_id = session.session_id.clone();

        let value = payload.as_int().unwrap_or_else(|| {
            warn!(
                session_id = %session_id,
                payload = ?payload,
                "Acknowledgment without an integer value"
            );
            0
        });
        self.append(LogTag::CallEnded, value, now_mono);

        info!(session_id = %session_id, iteration, "Call acknowledged");
        Some(CoreEvent::CallAcknowledged {
            session_id,
            iteration,
        })
    }

    /// Evaluate the current session
    pub fn tick(&mut self, now_mono: MonotonicInstant) -> Vec<CoreEvent> {
        let mut events = Vec::new();

        let Some(session) = self.current_session.as_mut() else {
            return events;
        };
        let Some(decision) = session.evaluate(now_mono, &self.policy) else {
            return events;
        };
        let session_id = session.session_id.clone();

        match decision {
            Decision::Call { kind, attempt } => {
                let tag = match kind {
                    beckon_api::CallKind::ByName => LogTag::CallStarted,
                    beckon_api::CallKind::SpecialPhrase => LogTag::PhraseStarted,
                };
                self.append(tag, i64::from(attempt), now_mono);

                info!(session_id = %session_id, kind = ?kind, attempt, "Calling child");
                events.push(CoreEvent::CallChild {
                    session_id,
                    kind,
                    attempt,
                });
            }
            Decision::Conclude(outcome) => {
                self.append(LogTag::SessionEnded, outcome.code(), now_mono);

                info!(session_id = %session_id, outcome = ?outcome, "Session concluded");
                events.push(CoreEvent::SessionConcluded {
                    session_id,
                    outcome,
                });
            }
        }

        events
    }

    /// Stop the current session and close its log
    pub fn stop_current(&mut self, reason: StopReason, now_mono: MonotonicInstant) -> StopDecision {
        let Some(session) = self.current_session.take() else {
            return StopDecision::NoActiveSession;
        };

        if let Err(e) = self.log.close() {
            warn!(session_id = %session.session_id, error = %e, "Failed to close session log");
        }

        let duration = session.duration_so_far(now_mono);
        info!(
            session_id = %session.session_id,
            reason = ?reason,
            iteration = session.iteration,
            duration_ms = duration.as_millis() as u64,
            "Session stopped"
        );

        StopDecision::Stopped(StopSummary {
            session_id: session.session_id,
            reason,
            iteration: session.iteration,
            face_appearances: session.face_appearances,
            duration,
        })
    }

    pub fn snapshot(&self, now_mono: MonotonicInstant) -> SchedulerSnapshot {
        let current_session = self
            .current_session
            .as_ref()
            .map(|s| s.to_session_info(now_mono));

        SchedulerSnapshot {
            state: current_session
                .as_ref()
                .map(|s| s.state)
                .unwrap_or(SessionState::Idle),
            current_session,
            sessions_started: self.sessions_started,
        }
    }

    pub fn current_session(&self) -> Option<&CallSession> {
        self.current_session.as_ref()
    }

    /// Sessions started since the engine was created
    pub fn sessions_started(&self) -> u64 {
        self.sessions_started
    }

    fn append(&self, tag: LogTag, value: i64, now_mono: MonotonicInstant) {
        if let Err(e) = self.log.append(tag, value, now_mono) {
            warn!(tag = %tag, value, error = %e, "Failed to append to session log");
        }
    }
}
