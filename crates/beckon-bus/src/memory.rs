//! In-process event bus

use beckon_api::{EventName, EventValue};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::{BusError, BusResult, EventBus, Subscription};

struct Subscriber {
    name: String,
    tx: mpsc::Sender<EventValue>,
}

#[derive(Default)]
struct Channel {
    latest: Option<EventValue>,
    subscribers: Vec<Subscriber>,
}

/// Event bus living inside the process
///
/// Deliveries never block the raiser: a subscriber whose queue is full
/// misses the notification.
#[derive(Default)]
pub struct MemoryBus {
    channels: Mutex<HashMap<EventName, Channel>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus with every protocol event already declared
    pub fn with_all_declared() -> Self {
        let bus = Self::new();
        {
            let mut channels = bus.lock();
            for event in EventName::ALL {
                channels.entry(event).or_default();
            }
        }
        bus
    }

    /// Number of live subscriptions for an event
    pub fn subscriber_count(&self, event: EventName) -> usize {
        self.lock()
            .get(&event)
            .map(|c| c.subscribers.iter().filter(|s| !s.tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EventName, Channel>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventBus for MemoryBus {
    fn declare(&self, event: EventName) -> BusResult<()> {
        self.lock().entry(event).or_default();
        debug!(event = %event, "Event declared");
        Ok(())
    }

    fn subscribe(
        &self,
        event: EventName,
        subscriber: &str,
        capacity: usize,
    ) -> BusResult<Subscription> {
        if capacity == 0 {
            return Err(BusError::InvalidSubscription(
                "queue capacity must be at least 1".into(),
            ));
        }

        let mut channels = self.lock();
        let channel = channels
            .get_mut(&event)
            .ok_or(BusError::UnknownEvent(event))?;

        let (tx, rx) = mpsc::channel(capacity);
        channel.subscribers.retain(|s| s.name != subscriber);
        channel.subscribers.push(Subscriber {
            name: subscriber.to_string(),
            tx,
        });

        debug!(event = %event, subscriber, capacity, "Subscribed");
        Ok(Subscription::new(rx))
    }

    fn unsubscribe(&self, event: EventName, subscriber: &str) -> BusResult<()> {
        let mut channels = self.lock();
        let channel = channels
            .get_mut(&event)
            .ok_or(BusError::UnknownEvent(event))?;

        let before = channel.subscribers.len();
        channel.subscribers.retain(|s| s.name != subscriber);
        if channel.subscribers.len() == before {
            return Err(BusError::NotSubscribed {
                event,
                subscriber: subscriber.to_string(),
            });
        }

        debug!(event = %event, subscriber, "Unsubscribed");
        Ok(())
    }

    fn raise(&self, event: EventName, value: EventValue) -> BusResult<()> {
        let mut channels = self.lock();
        let channel = channels
            .get_mut(&event)
            .ok_or(BusError::UnknownEvent(event))?;

        channel.latest = Some(value.clone());
        channel.subscribers.retain(|s| match s.tx.try_send(value.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(event = %event, subscriber = %s.name, "Subscriber busy, notification dropped");
                true
            }
            // Receiver dropped without unsubscribing
            Err(TrySendError::Closed(_)) => false,
        });

        trace!(event = %event, value = ?value, "Event raised");
        Ok(())
    }

    fn read_latest(&self, event: EventName) -> BusResult<Option<EventValue>> {
        self.lock()
            .get(&event)
            .map(|c| c.latest.clone())
            .ok_or(BusError::UnknownEvent(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn raise_delivers_to_every_subscriber() {
        let bus = MemoryBus::with_all_declared();
        let mut a = bus.subscribe(EventName::EndSession, "a", 4).unwrap();
        let mut b = bus.subscribe(EventName::EndSession, "b", 4).unwrap();

        bus.raise(EventName::EndSession, EventValue::Int(1)).unwrap();

        assert_eq!(a.recv().await, Some(EventValue::Int(1)));
        assert_eq!(b.recv().await, Some(EventValue::Int(1)));
    }

    #[test]
    fn undeclared_events_are_rejected() {
        let bus = MemoryBus::new();

        assert!(matches!(
            bus.raise(EventName::CallChild, EventValue::Int(1)),
            Err(BusError::UnknownEvent(EventName::CallChild))
        ));
        assert!(bus.subscribe(EventName::CallChild, "x", 1).is_err());
        assert!(bus.read_latest(EventName::CallChild).is_err());

        bus.declare(EventName::CallChild).unwrap();
        assert!(bus.raise(EventName::CallChild, EventValue::Int(1)).is_ok());
    }

    #[test]
    fn read_latest_tracks_last_raise() {
        let bus = MemoryBus::with_all_declared();
        assert_eq!(bus.read_latest(EventName::FaceDetected).unwrap(), None);

        bus.raise(EventName::FaceDetected, EventValue::Int(1)).unwrap();
        bus.raise(EventName::FaceDetected, EventValue::Int(2)).unwrap();

        assert_eq!(
            bus.read_latest(EventName::FaceDetected).unwrap(),
            Some(EventValue::Int(2))
        );
    }

    #[test]
    fn full_queue_drops_notifications() {
        let bus = MemoryBus::with_all_declared();
        let mut sub = bus.subscribe(EventName::FaceDetected, "scheduler", 1).unwrap();

        bus.raise(EventName::FaceDetected, EventValue::Int(1)).unwrap();
        bus.raise(EventName::FaceDetected, EventValue::Int(2)).unwrap();

        assert_eq!(sub.try_recv(), Some(EventValue::Int(1)));
        assert_eq!(sub.try_recv(), None);
        // Still subscribed after the drop
        assert_eq!(bus.subscriber_count(EventName::FaceDetected), 1);
    }

    #[tokio::test]
    async fn unsubscribe_ends_the_stream() {
        let bus = MemoryBus::with_all_declared();
        let mut sub = bus.subscribe(EventName::CallChild, "relay", 4).unwrap();

        bus.raise(EventName::CallChild, EventValue::Int(2)).unwrap();
        bus.unsubscribe(EventName::CallChild, "relay").unwrap();
        bus.raise(EventName::CallChild, EventValue::Int(1)).unwrap();

        // Queued delivery survives, then the stream closes
        assert_eq!(sub.recv().await, Some(EventValue::Int(2)));
        assert_eq!(sub.recv().await, None);

        assert!(matches!(
            bus.unsubscribe(EventName::CallChild, "relay"),
            Err(BusError::NotSubscribed { .. })
        ));
    }

    #[test]
    fn resubscribing_replaces_the_previous_subscription() {
        let bus = MemoryBus::with_all_declared();
        let _old = bus.subscribe(EventName::StartSession, "scheduler", 1).unwrap();
        let _new = bus.subscribe(EventName::StartSession, "scheduler", 1).unwrap();

        assert_eq!(bus.subscriber_count(EventName::StartSession), 1);
    }

    #[test]
    fn dropped_receivers_are_pruned_on_raise() {
        let bus = MemoryBus::with_all_declared();
        let sub = bus.subscribe(EventName::EndSession, "gone", 1).unwrap();
        drop(sub);

        bus.raise(EventName::EndSession, EventValue::Int(-1)).unwrap();
        assert_eq!(bus.subscriber_count(EventName::EndSession), 0);
    }
}
