//! Validated policy structures

use crate::schema::{RawConfig, RawLogConfig, RawRelayConfig, RawSchedulerConfig};
use beckon_util::default_log_dir;
use std::path::PathBuf;
use std::time::Duration;

/// Calls by name before the special phrase stage
pub const DEFAULT_BY_NAME_ATTEMPTS: u32 = 5;

/// Iteration at which the special phrase stage ends
pub const DEFAULT_SPECIAL_PHRASE_UNTIL: u32 = 7;

/// Pending notifications per event type
pub const DEFAULT_NOTIFICATION_QUEUE: usize = 8;

/// Validated policy ready for use by the scheduler and the relay
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub scheduler: SchedulerPolicy,
    pub log: LogPolicy,
    pub relay: RelayPolicy,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            scheduler: SchedulerPolicy::from_raw(raw.scheduler),
            log: LogPolicy::from_raw(raw.log),
            relay: RelayPolicy::from_raw(raw.relay),
        }
    }
}

/// Call attempt thresholds
///
/// Iterations `0..by_name_attempts` call by name, iterations
/// `by_name_attempts..special_phrase_until` use the special phrase, and the
/// session fails once `special_phrase_until` calls went unanswered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerPolicy {
    pub by_name_attempts: u32,
    pub special_phrase_until: u32,
    pub notification_queue: usize,
}

impl SchedulerPolicy {
    fn from_raw(raw: RawSchedulerConfig) -> Self {
        let by_name_attempts = raw.by_name_attempts.unwrap_or(DEFAULT_BY_NAME_ATTEMPTS);
        Self {
            by_name_attempts,
            special_phrase_until: raw
                .special_phrase_until
                .unwrap_or_else(|| by_name_attempts.max(DEFAULT_SPECIAL_PHRASE_UNTIL)),
            notification_queue: raw.notification_queue.unwrap_or(DEFAULT_NOTIFICATION_QUEUE),
        }
    }

    /// Number of special phrase attempts
    pub fn phrase_attempts(&self) -> u32 {
        self.special_phrase_until.saturating_sub(self.by_name_attempts)
    }
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            by_name_attempts: DEFAULT_BY_NAME_ATTEMPTS,
            special_phrase_until: DEFAULT_SPECIAL_PHRASE_UNTIL,
            notification_queue: DEFAULT_NOTIFICATION_QUEUE,
        }
    }
}

/// Session log settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPolicy {
    pub dir: PathBuf,
}

impl LogPolicy {
    fn from_raw(raw: RawLogConfig) -> Self {
        Self {
            dir: raw.dir.unwrap_or_else(default_log_dir),
        }
    }
}

impl Default for LogPolicy {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
        }
    }
}

/// Interaction relay settings
#[derive(Debug, Clone, PartialEq)]
pub struct RelayPolicy {
    pub player: Vec<String>,
    pub name_sound: PathBuf,
    pub phrase_sound: PathBuf,
    pub led_group: String,
    pub start_color: u32,
    pub end_color: u32,
    pub fade: Duration,
}

impl RelayPolicy {
    fn from_raw(raw: RawRelayConfig) -> Self {
        let defaults = Self::default();
        Self {
            player: raw.player.unwrap_or(defaults.player),
            name_sound: raw.name_sound.unwrap_or(defaults.name_sound),
            phrase_sound: raw.phrase_sound.unwrap_or(defaults.phrase_sound),
            led_group: raw.led_group.unwrap_or(defaults.led_group),
            start_color: raw.start_color.unwrap_or(defaults.start_color),
            end_color: raw.end_color.unwrap_or(defaults.end_color),
            fade: raw
                .fade_seconds
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.fade),
        }
    }
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            player: vec!["aplay".into(), "-q".into()],
            name_sound: PathBuf::from("sounds/name.wav"),
            phrase_sound: PathBuf::from("sounds/phrase.wav"),
            led_group: "FaceLeds".into(),
            start_color: 0x00FF00,
            end_color: 0x0000FF,
            fade: Duration::from_millis(1500),
        }
    }
}
