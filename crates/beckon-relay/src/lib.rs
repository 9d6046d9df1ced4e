//! Interaction relay for beckon
//!
//! This crate turns button activations into session requests and the
//! scheduler's call decisions into sounds and LED fades. Output goes through
//! the [`Actuator`] trait so tests can record it.

mod actuator;
mod relay;

pub use actuator::*;
pub use relay::*;
