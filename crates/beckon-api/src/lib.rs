//! Protocol types for beckon
//!
//! This crate defines the vocabulary shared by the scheduler, the relay
//! and whatever drives them:
//! - Event names and payloads carried on the event bus
//! - Call kinds and session outcomes (the integer codes on the wire)
//! - Session log tags and session states

mod events;
mod types;

pub use events::*;
pub use types::*;

use thiserror::Error;

/// Errors from parsing protocol values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Unknown event name: {0}")]
    UnknownEvent(String),

    #[error("Unknown log tag: {0}")]
    UnknownTag(String),
}
