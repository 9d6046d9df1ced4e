//! Error types for beckon

use thiserror::Error;

use crate::SessionId;

/// Errors returned to callers of the scheduler
#[derive(Debug, Error)]
pub enum BeckonError {
    #[error("Session already active: {0}")]
    SessionAlreadyActive(SessionId),

    #[error("Scheduler is not running")]
    SchedulerGone,
}

pub type Result<T> = std::result::Result<T, BeckonError>;
