//! Session log for beckon
//!
//! Provides:
//! - The record format (`tag\tvalue\telapsed`)
//! - A file-backed log, one file per session
//! - An in-memory log for tests and embedding

mod entry;
mod file;
mod memory;
mod traits;

pub use entry::*;
pub use file::*;
pub use memory::*;
pub use traits::*;

use thiserror::Error;

/// Session log errors
#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No session log is open")]
    NotOpen,

    #[error("Malformed log record: {0}")]
    Malformed(String),
}

pub type LogResult<T> = Result<T, LogError>;
