//! Event bus interface for beckon
//!
//! This crate defines the publish/subscribe seam between the scheduler, the
//! relay and the face detector, plus an in-process implementation. It knows
//! nothing about sessions.

mod memory;
mod traits;

pub use memory::*;
pub use traits::*;
