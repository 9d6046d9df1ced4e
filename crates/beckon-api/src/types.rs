//! Shared types for the beckon protocol

use beckon_util::SessionId;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::ApiError;

/// How the relay should call the child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    ByName,
    SpecialPhrase,
}

impl CallKind {
    /// Integer carried by `call-child` and `call-acknowledged`
    pub fn code(&self) -> i64 {
        match self {
            CallKind::ByName => 1,
            CallKind::SpecialPhrase => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(CallKind::ByName),
            2 => Some(CallKind::SpecialPhrase),
            _ => None,
        }
    }
}

/// How a session concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The child responded to a call
    Responded,
    /// Every call attempt went unanswered
    NoResponse,
}

impl SessionOutcome {
    /// Integer carried by `end-session` and the `SE` log entry
    pub fn code(&self) -> i64 {
        match self {
            SessionOutcome::Responded => 1,
            SessionOutcome::NoResponse => -1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(SessionOutcome::Responded),
            -1 => Some(SessionOutcome::NoResponse),
            _ => None,
        }
    }
}

/// Tag of a session log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogTag {
    /// `FD`: valid face detection, value is the running count
    FaceDetected,
    /// `CS`: call by name started, value is the attempt number
    CallStarted,
    /// `PS`: special phrase call started, value is the attempt within that stage
    PhraseStarted,
    /// `CE`: call acknowledged, value is the acknowledged call kind
    CallEnded,
    /// `SE`: session ended, value is the outcome code
    SessionEnded,
}

impl LogTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::FaceDetected => "FD",
            LogTag::CallStarted => "CS",
            LogTag::PhraseStarted => "PS",
            LogTag::CallEnded => "CE",
            LogTag::SessionEnded => "SE",
        }
    }
}

impl fmt::Display for LogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogTag {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FD" => Ok(LogTag::FaceDetected),
            "CS" => Ok(LogTag::CallStarted),
            "PS" => Ok(LogTag::PhraseStarted),
            "CE" => Ok(LogTag::CallEnded),
            "SE" => Ok(LogTag::SessionEnded),
            other => Err(ApiError::UnknownTag(other.to_string())),
        }
    }
}

/// Current session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Active,
    Concluding,
}

/// Why a session stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopReason {
    /// The scheduler reached a conclusion
    Concluded { outcome: SessionOutcome },
    /// Someone else raised `end-session`
    External { value: Option<i64> },
    /// A caller asked the scheduler to stop
    Requested,
    /// The service is shutting down
    Shutdown,
}

/// Active session information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub state: SessionState,
    pub started_at: DateTime<Local>,
    pub iteration: u32,
    pub face_appearances: u32,
    pub elapsed: Duration,
}
