//! Sound and LED output

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors from actuator operations
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("No player command configured")]
    NoPlayer,

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    PlayerFailed { program: String, status: ExitStatus },

    #[error("Actuator unavailable: {0}")]
    Unavailable(String),
}

pub type ActuatorResult<T> = Result<T, ActuatorError>;

/// Output side of the relay
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Play a sound file, returning once playback finished
    async fn play_sound(&self, path: &Path) -> ActuatorResult<()>;

    /// Start fading an LED group to `rgb` (0xRRGGBB) over `duration`
    async fn fade_leds(&self, group: &str, rgb: u32, duration: Duration) -> ActuatorResult<()>;
}

/// Plays sounds through an external player command
pub struct CommandActuator {
    player: Vec<String>,
}

impl CommandActuator {
    /// `player` is the argv prefix; the sound path is appended to it
    pub fn new(player: Vec<String>) -> Self {
        Self { player }
    }
}

#[async_trait]
impl Actuator for CommandActuator {
    async fn play_sound(&self, path: &Path) -> ActuatorResult<()> {
        let (program, args) = self.player.split_first().ok_or(ActuatorError::NoPlayer)?;

        debug!(program = %program, path = %path.display(), "Playing sound");

        let status = Command::new(program)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| ActuatorError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(ActuatorError::PlayerFailed {
                program: program.clone(),
                status,
            });
        }
        Ok(())
    }

    async fn fade_leds(&self, group: &str, rgb: u32, duration: Duration) -> ActuatorResult<()> {
        // No LED hardware on a plain host
        info!(
            group,
            color = %format!("#{:06X}", rgb),
            duration_ms = duration.as_millis() as u64,
            "Fading LEDs"
        );
        Ok(())
    }
}

/// Action recorded by [`MockActuator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    PlaySound(PathBuf),
    FadeLeds {
        group: String,
        rgb: u32,
        duration: Duration,
    },
}

/// Actuator that records what it was asked to do
#[derive(Default)]
pub struct MockActuator {
    actions: Mutex<Vec<Action>>,
    fail_sounds: Mutex<bool>,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything done so far, oldest first
    pub fn actions(&self) -> Vec<Action> {
        self.lock_actions().clone()
    }

    /// Sounds played so far
    pub fn sounds(&self) -> Vec<PathBuf> {
        self.lock_actions()
            .iter()
            .filter_map(|a| match a {
                Action::PlaySound(path) => Some(path.clone()),
                Action::FadeLeds { .. } => None,
            })
            .collect()
    }

    /// Make every later `play_sound` fail
    pub fn set_fail_sounds(&self, fail: bool) {
        *self.fail_sounds.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    fn lock_actions(&self) -> MutexGuard<'_, Vec<Action>> {
        self.actions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Actuator for MockActuator {
    async fn play_sound(&self, path: &Path) -> ActuatorResult<()> {
        if *self.fail_sounds.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(ActuatorError::Unavailable("mock sound failure".into()));
        }
        self.lock_actions().push(Action::PlaySound(path.to_path_buf()));
        Ok(())
    }

    async fn fade_leds(&self, group: &str, rgb: u32, duration: Duration) -> ActuatorResult<()> {
        self.lock_actions().push(Action::FadeLeds {
            group: group.to_string(),
            rgb,
            duration,
        });
        Ok(())
    }
}
