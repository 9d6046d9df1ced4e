//! Shared utilities for beckon
//!
//! This crate provides:
//! - ID types (SessionId)
//! - Time utilities (monotonic time, wall-clock helpers)
//! - Error types
//! - Default paths for config and session log directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
