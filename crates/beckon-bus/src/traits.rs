//! Event bus traits

use beckon_api::{EventName, EventValue};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from event bus operations
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Unknown event: {0}")]
    UnknownEvent(EventName),

    #[error("'{subscriber}' is not subscribed to {event}")]
    NotSubscribed {
        event: EventName,
        subscriber: String,
    },

    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// A live subscription to one event name
///
/// Deliveries queue up to the capacity given at subscribe time; further
/// raises are dropped for this subscriber until it catches up. The stream
/// ends once the subscription is removed from the bus.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<EventValue>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<EventValue>) -> Self {
        Self { rx }
    }

    /// Wait for the next delivery
    pub async fn recv(&mut self) -> Option<EventValue> {
        self.rx.recv().await
    }

    /// Take a delivery if one is queued
    pub fn try_recv(&mut self) -> Option<EventValue> {
        self.rx.try_recv().ok()
    }
}

/// Publish/subscribe channel of named events
pub trait EventBus: Send + Sync {
    /// Make an event name known to the bus
    fn declare(&self, event: EventName) -> BusResult<()>;

    /// Subscribe `subscriber` to `event`, replacing any earlier subscription
    /// it held for the same name
    fn subscribe(
        &self,
        event: EventName,
        subscriber: &str,
        capacity: usize,
    ) -> BusResult<Subscription>;

    /// Remove `subscriber`'s subscription to `event`
    fn unsubscribe(&self, event: EventName, subscriber: &str) -> BusResult<()>;

    /// Deliver `value` to every current subscriber of `event`
    fn raise(&self, event: EventName, value: EventValue) -> BusResult<()>;

    /// Latest value raised for `event`, if any
    fn read_latest(&self, event: EventName) -> BusResult<Option<EventValue>>;
}
