//! Event names and payloads carried on the event bus

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ApiError;

/// Named notifications exchanged between the scheduler, the relay and
/// the face detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventName {
    /// Relay asks for a new session (non-zero value)
    StartSession,
    /// Face detector saw a face; payload carries face geometry
    FaceDetected,
    /// Scheduler decided to call the child (see [`crate::CallKind`])
    CallChild,
    /// Relay finished a call; echoes the `CallChild` value
    CallAcknowledged,
    /// Session is over (see [`crate::SessionOutcome`])
    EndSession,
}

impl EventName {
    pub const ALL: [EventName; 5] = [
        EventName::StartSession,
        EventName::FaceDetected,
        EventName::CallChild,
        EventName::CallAcknowledged,
        EventName::EndSession,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::StartSession => "start-session",
            EventName::FaceDetected => "face-detected",
            EventName::CallChild => "call-child",
            EventName::CallAcknowledged => "call-acknowledged",
            EventName::EndSession => "end-session",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ApiError::UnknownEvent(s.to_string()))
    }
}

/// Single-value payload attached to a raised event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum EventValue {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<EventValue>),
}

impl EventValue {
    /// Integer view of the payload. Floats are truncated.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            EventValue::Int(v) => Some(*v),
            EventValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Number of structured fields. Scalars carry none.
    pub fn field_count(&self) -> usize {
        match self {
            EventValue::List(fields) => fields.len(),
            _ => 0,
        }
    }
}

impl From<i64> for EventValue {
    fn from(v: i64) -> Self {
        EventValue::Int(v)
    }
}

impl From<f64> for EventValue {
    fn from(v: f64) -> Self {
        EventValue::Float(v)
    }
}

impl From<&str> for EventValue {
    fn from(v: &str) -> Self {
        EventValue::Text(v.to_string())
    }
}

impl From<Vec<EventValue>> for EventValue {
    fn from(v: Vec<EventValue>) -> Self {
        EventValue::List(v)
    }
}

/// An event raised on the bus, as injected from outside the process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event: EventName,
    #[serde(default)]
    pub value: EventValue,
}

impl Notification {
    pub fn new(event: EventName, value: impl Into<EventValue>) -> Self {
        Self {
            event,
            value: value.into(),
        }
    }
}
