//! Interaction relay
//!
//! Bridges the activation button, the scheduler's call decisions and the
//! sound/LED output. One task owns the relay state.

use beckon_api::{CallKind, EventName, EventValue};
use beckon_bus::{EventBus, Subscription};
use beckon_config::RelayPolicy;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Actuator;

/// Name the relay subscribes under
pub const SUBSCRIBER_NAME: &str = "relay";

const RELAY_QUEUE: usize = 4;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Relay is not running")]
    Gone,
}

/// Relay state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Waiting for an activation
    Armed,
    /// A session was requested and has not ended yet
    InSession,
}

/// Cloneable handle for a running [`Relay`]
#[derive(Clone)]
pub struct RelayHandle {
    activations: mpsc::Sender<()>,
}

impl RelayHandle {
    /// Signal an activation (the front button). Activations arriving while
    /// one is still pending are dropped.
    pub fn activate(&self) -> Result<(), RelayError> {
        match self.activations.try_send(()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(())) => {
                debug!("Activation already pending");
                Ok(())
            }
            Err(TrySendError::Closed(())) => Err(RelayError::Gone),
        }
    }
}

async fn next_delivery(subscription: &mut Option<Subscription>) -> Option<EventValue> {
    match subscription {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

pub struct Relay {
    policy: RelayPolicy,
    bus: Arc<dyn EventBus>,
    actuator: Arc<dyn Actuator>,
    activations: mpsc::Receiver<()>,
    state: RelayState,
    call_sub: Option<Subscription>,
    end_sub: Option<Subscription>,
}

impl Relay {
    pub fn new(
        policy: RelayPolicy,
        bus: Arc<dyn EventBus>,
        actuator: Arc<dyn Actuator>,
    ) -> (Self, RelayHandle) {
        let (tx, activations) = mpsc::channel(1);
        let relay = Self {
            policy,
            bus,
            actuator,
            activations,
            state: RelayState::Armed,
            call_sub: None,
            end_sub: None,
        };
        (relay, RelayHandle { activations: tx })
    }

    /// Create a relay and run it on a new task until `shutdown` fires
    pub fn spawn(
        policy: RelayPolicy,
        bus: Arc<dyn EventBus>,
        actuator: Arc<dyn Actuator>,
        shutdown: CancellationToken,
    ) -> (RelayHandle, JoinHandle<()>) {
        let (relay, handle) = Self::new(policy, bus, actuator);
        let task = tokio::spawn(relay.run(shutdown));
        (handle, task)
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        for event in [EventName::StartSession, EventName::CallAcknowledged] {
            if let Err(e) = self.bus.declare(event) {
                warn!(event = %event, error = %e, "Failed to declare event");
            }
        }

        info!("Relay armed");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                Some(()) = self.activations.recv() => self.on_activated().await,

                value = next_delivery(&mut self.call_sub) => match value {
                    Some(value) => self.on_call_child(value).await,
                    None => {
                        warn!("call-child subscription closed by the bus");
                        self.call_sub = None;
                    }
                },

                value = next_delivery(&mut self.end_sub) => match value {
                    Some(value) => self.on_end_session(value).await,
                    None => {
                        warn!("end-session subscription closed by the bus");
                        self.end_sub = None;
                    }
                },
            }
        }

        self.release_subscriptions();
        debug!("Relay stopped");
    }

    async fn on_activated(&mut self) {
        if self.state == RelayState::InSession {
            debug!("Ignoring activation during a session");
            return;
        }

        self.call_sub = self.subscribe(EventName::CallChild);
        self.end_sub = self.subscribe(EventName::EndSession);

        self.fade(self.policy.start_color).await;

        if let Err(e) = self.bus.raise(EventName::StartSession, EventValue::Int(1)) {
            warn!(error = %e, "Failed to request a session");
        }

        self.state = RelayState::InSession;
        info!("Session requested");
    }

    async fn on_call_child(&mut self, value: EventValue) {
        let kind = value.as_int().and_then(CallKind::from_code);
        let sound = match kind {
            Some(CallKind::ByName) => Some(self.policy.name_sound.clone()),
            Some(CallKind::SpecialPhrase) => Some(self.policy.phrase_sound.clone()),
            None => {
                warn!(value = ?value, "Unknown call kind");
                None
            }
        };

        if let Some(sound) = sound
            && let Err(e) = self.actuator.play_sound(&sound).await
        {
            warn!(path = %sound.display(), error = %e, "Failed to play sound");
        }

        if let Err(e) = self.bus.raise(EventName::CallAcknowledged, value) {
            warn!(error = %e, "Failed to acknowledge call");
        }
    }

    async fn on_end_session(&mut self, value: EventValue) {
        info!(outcome = ?value, "Session ended");

        self.release_subscriptions();
        self.fade(self.policy.end_color).await;
        self.state = RelayState::Armed;
    }

    async fn fade(&self, rgb: u32) {
        if let Err(e) = self
            .actuator
            .fade_leds(&self.policy.led_group, rgb, self.policy.fade)
            .await
        {
            warn!(group = %self.policy.led_group, error = %e, "Failed to fade LEDs");
        }
    }

    fn subscribe(&self, event: EventName) -> Option<Subscription> {
        match self.bus.subscribe(event, SUBSCRIBER_NAME, RELAY_QUEUE) {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(event = %event, error = %e, "Failed to subscribe");
                None
            }
        }
    }

    fn release_subscriptions(&mut self) {
        for (event, held) in [
            (EventName::CallChild, self.call_sub.take()),
            (EventName::EndSession, self.end_sub.take()),
        ] {
            if held.is_some()
                && let Err(e) = self.bus.unsubscribe(event, SUBSCRIBER_NAME)
            {
                warn!(event = %event, error = %e, "Failed to unsubscribe");
            }
        }
    }
}
