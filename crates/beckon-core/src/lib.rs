//! Session scheduler for beckon
//!
//! This crate is the heart of beckon, containing:
//! - The call session state machine (Idle -> Active -> Concluding -> Idle)
//! - The call engine, which applies decisions and writes the session log
//! - The scheduler actor, which owns the engine and talks to the event bus
//! - Idle and success evaluation using monotonic time

mod engine;
mod events;
mod scheduler;
mod session;

pub use engine::*;
pub use events::*;
pub use scheduler::*;
pub use session::*;
