//! Configuration validation

use crate::schema::{RawConfig, RawRelayConfig, RawSchedulerConfig};
use crate::policy::{DEFAULT_BY_NAME_ATTEMPTS, DEFAULT_SPECIAL_PHRASE_UNTIL};
use thiserror::Error;

/// Largest value accepted for an RGB color
const MAX_RGB: u32 = 0xFF_FFFF;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("special_phrase_until ({until}) must not be below by_name_attempts ({by_name})")]
    PhraseWindowInverted { by_name: u32, until: u32 },

    #[error("special_phrase_until must be at least 1, or no call is ever made")]
    NoCallAttempts,

    #[error("notification_queue must be at least 1")]
    EmptyNotificationQueue,

    #[error("Relay setting '{field}': {message}")]
    RelayError { field: &'static str, message: String },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = validate_scheduler(&config.scheduler);
    errors.extend(validate_relay(&config.relay));
    errors
}

fn validate_scheduler(scheduler: &RawSchedulerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let by_name = scheduler.by_name_attempts.unwrap_or(DEFAULT_BY_NAME_ATTEMPTS);
    // An unset window end follows the by-name count so that lowering only
    // by_name_attempts keeps a valid window
    let until = scheduler
        .special_phrase_until
        .unwrap_or_else(|| by_name.max(DEFAULT_SPECIAL_PHRASE_UNTIL));

    if until < by_name {
        errors.push(ValidationError::PhraseWindowInverted { by_name, until });
    }

    if until == 0 {
        errors.push(ValidationError::NoCallAttempts);
    }

    if scheduler.notification_queue == Some(0) {
        errors.push(ValidationError::EmptyNotificationQueue);
    }

    errors
}

fn validate_relay(relay: &RawRelayConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(player) = &relay.player
        && player.first().is_none_or(|program| program.is_empty())
    {
        errors.push(ValidationError::RelayError {
            field: "player",
            message: "command cannot be empty".into(),
        });
    }

    if let Some(group) = &relay.led_group
        && group.is_empty()
    {
        errors.push(ValidationError::RelayError {
            field: "led_group",
            message: "cannot be empty".into(),
        });
    }

    for (field, color) in [("start_color", relay.start_color), ("end_color", relay.end_color)] {
        if let Some(color) = color
            && color > MAX_RGB
        {
            errors.push(ValidationError::RelayError {
                field,
                message: format!("{:#x} is not an RGB color", color),
            });
        }
    }

    if let Some(fade) = relay.fade_seconds
        && (!fade.is_finite() || fade < 0.0)
    {
        errors.push(ValidationError::RelayError {
            field: "fade_seconds",
            message: format!("{} is not a non-negative number of seconds", fade),
        });
    }

    errors
}
