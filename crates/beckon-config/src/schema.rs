//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Call scheduling policy
    #[serde(default)]
    pub scheduler: RawSchedulerConfig,

    /// Session log settings
    #[serde(default)]
    pub log: RawLogConfig,

    /// Interaction relay settings
    #[serde(default)]
    pub relay: RawRelayConfig,
}

/// Scheduler settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSchedulerConfig {
    /// Calls by name before switching to the special phrase (default: 5)
    pub by_name_attempts: Option<u32>,

    /// Iteration at which the special phrase stage ends and the session
    /// fails (default: 7)
    pub special_phrase_until: Option<u32>,

    /// Pending notifications kept per event type before new ones are dropped
    pub notification_queue: Option<usize>,
}

/// Session log settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLogConfig {
    /// Directory for per-session log files
    pub dir: Option<PathBuf>,
}

/// Interaction relay settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRelayConfig {
    /// Audio player command; the sound file is appended as the last argument
    pub player: Option<Vec<String>>,

    /// Sound played for a call by name
    pub name_sound: Option<PathBuf>,

    /// Sound played for a special phrase call
    pub phrase_sound: Option<PathBuf>,

    /// LED group faded on session start and end
    pub led_group: Option<String>,

    /// RGB color shown when a session starts (e.g. 0x00FF00)
    pub start_color: Option<u32>,

    /// RGB color shown when a session ends
    pub end_color: Option<u32>,

    /// LED fade duration in seconds
    pub fade_seconds: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [scheduler]
            by_name_attempts = 3
            special_phrase_until = 4

            [log]
            dir = "/home/nao/naoqi/modules"

            [relay]
            player = ["aplay", "-q"]
            name_sound = "/home/nao/naoqi/modules/sounds/name.wav"
            phrase_sound = "/home/nao/naoqi/modules/sounds/phrase.wav"
            start_color = 0x00FF00
            fade_seconds = 1.5
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.by_name_attempts, Some(3));
        assert_eq!(config.scheduler.special_phrase_until, Some(4));
        assert_eq!(config.relay.start_color, Some(0x00FF00));
        assert_eq!(config.relay.player.as_ref().map(|p| p.len()), Some(2));
    }

    #[test]
    fn sections_are_optional() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.scheduler.by_name_attempts.is_none());
        assert!(config.log.dir.is_none());
        assert!(config.relay.name_sound.is_none());
    }
}
