//! Scheduler actor
//!
//! A single task owns the [`CallEngine`]. Commands from [`SchedulerHandle`],
//! bus deliveries and ticks all arrive through one `select!` loop, so session
//! state has exactly one mutator. The tick loop runs in its own task and only
//! sends the id of the session it belongs to.

use beckon_api::{EventName, EventValue, StopReason};
use beckon_bus::{EventBus, Subscription};
use beckon_config::SchedulerPolicy;
use beckon_store::SessionLog;
use beckon_util::{BeckonError, MonotonicInstant, Result, SessionId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{CallEngine, CoreEvent, SchedulerSnapshot, StopDecision, StopSummary, TICK_INTERVAL};

/// Name the scheduler subscribes under
pub const SUBSCRIBER_NAME: &str = "scheduler";

/// Notifications held only while a session runs
const SESSION_EVENTS: [EventName; 3] = [
    EventName::FaceDetected,
    EventName::CallAcknowledged,
    EventName::EndSession,
];

const COMMAND_QUEUE: usize = 32;

/// `end-session` value raised when a session is stopped through the handle
pub const REQUESTED_STOP_VALUE: i64 = 0;

enum Command {
    StartSession {
        reply: oneshot::Sender<Result<SessionId>>,
    },
    StopSession {
        reply: oneshot::Sender<Option<StopSummary>>,
    },
    Snapshot {
        reply: oneshot::Sender<SchedulerSnapshot>,
    },
}

/// Cloneable handle for talking to a running [`Scheduler`]
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    /// Start a session. Fails if one is already running.
    pub async fn start_session(&self) -> Result<SessionId> {
        self.request(|reply| Command::StartSession { reply }).await?
    }

    /// Stop the running session, if any
    pub async fn stop_session(&self) -> Result<Option<StopSummary>> {
        self.request(|reply| Command::StopSession { reply }).await
    }

    pub async fn snapshot(&self) -> Result<SchedulerSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| BeckonError::SchedulerGone)?;
        rx.await.map_err(|_| BeckonError::SchedulerGone)
    }
}

/// Tick task of one session
struct Ticker {
    session_id: SessionId,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Ticker {
    fn spawn(session_id: SessionId, ticks: mpsc::UnboundedSender<SessionId>) -> Self {
        let token = CancellationToken::new();
        let task = tokio::spawn(run_ticker(session_id.clone(), ticks, token.clone()));
        Self {
            session_id,
            token,
            task,
        }
    }

    /// Cancel the tick task and wait for it to finish
    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(session_id = %self.session_id, error = %e, "Tick task failed");
        }
    }
}

async fn run_ticker(
    session_id: SessionId,
    ticks: mpsc::UnboundedSender<SessionId>,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                if ticks.send(session_id.clone()).is_err() {
                    break;
                }
            }
        }
    }

    debug!(session_id = %session_id, "Tick loop stopped");
}

async fn next_delivery(subscription: &mut Option<Subscription>) -> Option<EventValue> {
    match subscription {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

/// The session scheduler
pub struct Scheduler {
    engine: CallEngine,
    bus: Arc<dyn EventBus>,
    queue_depth: usize,
    commands: mpsc::Receiver<Command>,
    ticks_tx: mpsc::UnboundedSender<SessionId>,
    ticks: mpsc::UnboundedReceiver<SessionId>,
    ticker: Option<Ticker>,
    start_sub: Option<Subscription>,
    face_sub: Option<Subscription>,
    ack_sub: Option<Subscription>,
    end_sub: Option<Subscription>,
}

impl Scheduler {
    pub fn new(
        policy: SchedulerPolicy,
        bus: Arc<dyn EventBus>,
        log: Arc<dyn SessionLog>,
    ) -> (Self, SchedulerHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (ticks_tx, ticks) = mpsc::unbounded_channel();

        let scheduler = Self {
            queue_depth: policy.notification_queue,
            engine: CallEngine::new(policy, log),
            bus,
            commands,
            ticks_tx,
            ticks,
            ticker: None,
            start_sub: None,
            face_sub: None,
            ack_sub: None,
            end_sub: None,
        };

        (scheduler, SchedulerHandle { commands: commands_tx })
    }

    /// Create a scheduler and run it on a new task until `shutdown` fires
    pub fn spawn(
        policy: SchedulerPolicy,
        bus: Arc<dyn EventBus>,
        log: Arc<dyn SessionLog>,
        shutdown: CancellationToken,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (scheduler, handle) = Self::new(policy, bus, log);
        let task = tokio::spawn(scheduler.run(shutdown));
        (handle, task)
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        for event in [EventName::CallChild, EventName::EndSession] {
            if let Err(e) = self.bus.declare(event) {
                warn!(event = %event, error = %e, "Failed to declare event");
            }
        }
        self.start_sub = self.subscribe(EventName::StartSession);

        info!("Scheduler running");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                Some(command) = self.commands.recv() => {
                    self.handle_command(command).await;
                }

                Some(session_id) = self.ticks.recv() => {
                    self.handle_tick(session_id).await;
                }

                value = next_delivery(&mut self.start_sub) => match value {
                    Some(value) => self.on_start_requested(value),
                    None => self.subscription_closed(EventName::StartSession),
                },

                value = next_delivery(&mut self.face_sub) => match value {
                    Some(value) => {
                        let event = self
                            .engine
                            .notify_face_detected(&value, MonotonicInstant::now());
                        if let Some(event) = event {
                            self.dispatch(event).await;
                        }
                    }
                    None => self.subscription_closed(EventName::FaceDetected),
                },

                value = next_delivery(&mut self.ack_sub) => match value {
                    Some(value) => {
                        let event = self
                            .engine
                            .notify_call_acknowledged(&value, MonotonicInstant::now());
                        if let Some(event) = event {
                            self.dispatch(event).await;
                        }
                    }
                    None => self.subscription_closed(EventName::CallAcknowledged),
                },

                value = next_delivery(&mut self.end_sub) => match value {
                    Some(value) => {
                        let reason = StopReason::External { value: value.as_int() };
                        self.stop_session(reason).await;
                    }
                    None => self.subscription_closed(EventName::EndSession),
                },
            }
        }

        info!("Scheduler shutting down");
        self.stop_session(StopReason::Shutdown).await;
        self.unsubscribe(EventName::StartSession);
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartSession { reply } => {
                let _ = reply.send(self.start_session());
            }
            Command::StopSession { reply } => {
                let summary = self.stop_session(StopReason::Requested).await;
                // Tell the relay so it re-arms
                if summary.is_some() {
                    self.raise(EventName::EndSession, EventValue::Int(REQUESTED_STOP_VALUE));
                }
                let _ = reply.send(summary);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.engine.snapshot(MonotonicInstant::now()));
            }
        }
    }

    async fn handle_tick(&mut self, session_id: SessionId) {
        let current = self.engine.current_session().map(|s| &s.session_id);
        if current != Some(&session_id) {
            debug!(session_id = %session_id, "Ignoring tick from a stopped session");
            return;
        }

        for event in self.engine.tick(MonotonicInstant::now()) {
            self.dispatch(event).await;
        }
    }

    async fn dispatch(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::CallChild { kind, .. } => {
                self.raise(EventName::CallChild, EventValue::Int(kind.code()));
            }
            CoreEvent::SessionConcluded { outcome, .. } => {
                // Unsubscribe first so our own outcome is not taken for an external stop
                self.stop_session(StopReason::Concluded { outcome }).await;
                self.raise(EventName::EndSession, EventValue::Int(outcome.code()));
            }
            CoreEvent::FaceCounted { session_id, count } => {
                debug!(session_id = %session_id, count, "Face counted");
            }
            CoreEvent::CallAcknowledged {
                session_id,
                iteration,
            } => {
                debug!(session_id = %session_id, iteration, "Call attempt completed");
            }
            CoreEvent::SessionStarted { .. } => {}
        }
    }

    fn on_start_requested(&mut self, value: EventValue) {
        if value.as_int().is_none_or(|v| v == 0) {
            debug!(value = ?value, "Ignoring start-session without a non-zero value");
            return;
        }

        if let Err(e) = self.start_session() {
            warn!(error = %e, "Ignoring start-session request");
        }
    }

    fn start_session(&mut self) -> Result<SessionId> {
        let event = self
            .engine
            .start_session(beckon_util::now(), MonotonicInstant::now())?;
        let session_id = event.session_id().clone();

        self.face_sub = self.subscribe(EventName::FaceDetected);
        self.ack_sub = self.subscribe(EventName::CallAcknowledged);
        self.end_sub = self.subscribe(EventName::EndSession);
        self.ticker = Some(Ticker::spawn(session_id.clone(), self.ticks_tx.clone()));

        Ok(session_id)
    }

    async fn stop_session(&mut self, reason: StopReason) -> Option<StopSummary> {
        if let Some(ticker) = self.ticker.take() {
            ticker.stop().await;
        }
        for event in SESSION_EVENTS {
            self.unsubscribe(event);
        }

        match self.engine.stop_current(reason, MonotonicInstant::now()) {
            StopDecision::Stopped(summary) => Some(summary),
            StopDecision::NoActiveSession => None,
        }
    }

    fn slot(&mut self, event: EventName) -> Option<&mut Option<Subscription>> {
        match event {
            EventName::StartSession => Some(&mut self.start_sub),
            EventName::FaceDetected => Some(&mut self.face_sub),
            EventName::CallAcknowledged => Some(&mut self.ack_sub),
            EventName::EndSession => Some(&mut self.end_sub),
            EventName::CallChild => None,
        }
    }

    fn subscribe(&self, event: EventName) -> Option<Subscription> {
        match self.bus.subscribe(event, SUBSCRIBER_NAME, self.queue_depth) {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(event = %event, error = %e, "Failed to subscribe");
                None
            }
        }
    }

    fn unsubscribe(&mut self, event: EventName) {
        let held = self.slot(event).and_then(Option::take);
        if held.is_some()
            && let Err(e) = self.bus.unsubscribe(event, SUBSCRIBER_NAME)
        {
            warn!(event = %event, error = %e, "Failed to unsubscribe");
        }
    }

    fn subscription_closed(&mut self, event: EventName) {
        warn!(event = %event, "Subscription closed by the bus");
        if let Some(slot) = self.slot(event) {
            *slot = None;
        }
    }

    fn raise(&self, event: EventName, value: EventValue) {
        if let Err(e) = self.bus.raise(event, value) {
            warn!(event = %event, error = %e, "Failed to raise event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beckon_api::{LogTag, SessionState};
    use beckon_bus::MemoryBus;
    use beckon_store::MemorySessionLog;
    use std::time::Duration;
    use tokio::time::{Instant, sleep, sleep_until, timeout};

    struct Harness {
        bus: Arc<MemoryBus>,
        log: Arc<MemorySessionLog>,
        handle: SchedulerHandle,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    }

    impl Harness {
        async fn start() -> Self {
            let bus = Arc::new(MemoryBus::with_all_declared());
            let log = Arc::new(MemorySessionLog::new());
            let shutdown = CancellationToken::new();
            let (handle, task) = Scheduler::spawn(
                SchedulerPolicy::default(),
                bus.clone(),
                log.clone(),
                shutdown.clone(),
            );
            // Let the actor subscribe before tests raise anything
            settle().await;
            Self {
                bus,
                log,
                handle,
                shutdown,
                task,
            }
        }

        fn listen(&self, event: EventName) -> Subscription {
            self.bus.subscribe(event, "test", 16).unwrap()
        }

        fn raise(&self, event: EventName, value: impl Into<EventValue>) {
            self.bus.raise(event, value.into()).unwrap();
        }
    }

    /// Give every task a chance to process pending messages
    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    fn face() -> EventValue {
        EventValue::List(vec![EventValue::Float(0.5), EventValue::Float(0.5)])
    }

    fn tagged(log: &MemorySessionLog) -> Vec<(LogTag, i64)> {
        log.entries().into_iter().map(|e| (e.tag, e.value)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_responds_to_first_call() {
        let h = Harness::start().await;
        let mut calls = h.listen(EventName::CallChild);
        let mut ends = h.listen(EventName::EndSession);

        let t0 = Instant::now();
        h.handle.start_session().await.unwrap();

        assert_eq!(calls.recv().await, Some(EventValue::Int(1)));
        assert_eq!(t0.elapsed(), Duration::from_secs(5));

        sleep_until(t0 + Duration::from_millis(5200)).await;
        h.raise(EventName::CallAcknowledged, 1i64);

        for i in 0..5 {
            sleep_until(t0 + Duration::from_millis(5300 + i * 100)).await;
            h.raise(EventName::FaceDetected, face());
        }

        assert_eq!(ends.recv().await, Some(EventValue::Int(1)));
        assert!(t0.elapsed() <= Duration::from_millis(5800));

        let entries = h.log.entries();
        assert_eq!(
            tagged(&h.log),
            vec![
                (LogTag::CallStarted, 1),
                (LogTag::CallEnded, 1),
                (LogTag::FaceDetected, 1),
                (LogTag::FaceDetected, 2),
                (LogTag::FaceDetected, 3),
                (LogTag::FaceDetected, 4),
                (LogTag::FaceDetected, 5),
                (LogTag::SessionEnded, 1),
            ]
        );
        assert_eq!(entries[0].elapsed, Duration::from_millis(5000));
        assert_eq!(entries[1].elapsed, Duration::from_millis(5200));
        assert_eq!(entries[2].elapsed, Duration::from_millis(5300));

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SessionState::Idle);
        assert_eq!(snapshot.sessions_started, 1);
        assert!(!h.log.is_open());

        // Nothing else happens once the session is over
        sleep(Duration::from_secs(20)).await;
        assert_eq!(calls.try_recv(), None);
        assert_eq!(h.log.entries().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_calls_end_in_failure() {
        let h = Harness::start().await;
        let mut calls = h.listen(EventName::CallChild);
        let mut ends = h.listen(EventName::EndSession);

        h.handle.start_session().await.unwrap();

        let mut kinds = Vec::new();
        let outcome = timeout(Duration::from_secs(120), async {
            loop {
                tokio::select! {
                    Some(value) = calls.recv() => {
                        kinds.push(value.as_int());
                        h.raise(EventName::CallAcknowledged, value);
                    }
                    Some(value) = ends.recv() => break value,
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome, EventValue::Int(-1));
        assert_eq!(
            kinds,
            vec![Some(1), Some(1), Some(1), Some(1), Some(1), Some(2), Some(2)]
        );
        assert_eq!(
            h.log.entries().last().map(|e| (e.tag, e.value)),
            Some((LogTag::SessionEnded, -1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let h = Harness::start().await;

        let first = h.handle.start_session().await.unwrap();
        let second = h.handle.start_session().await;
        assert!(matches!(second, Err(BeckonError::SessionAlreadyActive(id)) if id == first));

        // Bus requests while a session runs are ignored too
        h.raise(EventName::StartSession, 1i64);
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.sessions_started, 1);
        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(
            snapshot.current_session.map(|s| s.session_id),
            Some(first)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bus_starts_session() {
        let h = Harness::start().await;

        h.raise(EventName::StartSession, 0i64);
        settle().await;
        assert_eq!(h.handle.snapshot().await.unwrap().sessions_started, 0);

        h.raise(EventName::StartSession, 1i64);
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.sessions_started, 1);
        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(h.bus.subscriber_count(EventName::FaceDetected), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_end_session_stops() {
        let h = Harness::start().await;
        let mut calls = h.listen(EventName::CallChild);

        h.handle.start_session().await.unwrap();
        sleep(Duration::from_secs(2)).await;
        h.raise(EventName::EndSession, 0i64);
        settle().await;

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SessionState::Idle);
        assert!(!h.log.is_open());
        assert_eq!(h.bus.subscriber_count(EventName::FaceDetected), 0);
        assert_eq!(h.bus.subscriber_count(EventName::CallAcknowledged), 0);

        // No calls are made after the stop
        sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.try_recv(), None);
        assert!(h.log.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_face_delays_first_call() {
        let h = Harness::start().await;
        let mut calls = h.listen(EventName::CallChild);

        let t0 = Instant::now();
        h.handle.start_session().await.unwrap();

        sleep_until(t0 + Duration::from_secs(4)).await;
        h.raise(EventName::FaceDetected, EventValue::List(vec![EventValue::Int(7)]));

        assert_eq!(calls.recv().await, Some(EventValue::Int(1)));
        assert_eq!(t0.elapsed(), Duration::from_secs(9));
        assert_eq!(tagged(&h.log), vec![(LogTag::CallStarted, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_restart() {
        let h = Harness::start().await;

        let first = h.handle.start_session().await.unwrap();
        sleep(Duration::from_millis(1500)).await;

        let summary = h.handle.stop_session().await.unwrap().unwrap();
        assert_eq!(summary.session_id, first);
        assert_eq!(summary.reason, StopReason::Requested);
        assert_eq!(h.handle.stop_session().await.unwrap(), None);

        let second = h.handle.start_session().await.unwrap();
        assert_ne!(first, second);

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.sessions_started, 2);
        assert_eq!(h.log.sessions().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_stop_announces_end_session() {
        let h = Harness::start().await;
        let mut ends = h.listen(EventName::EndSession);

        h.handle.start_session().await.unwrap();
        sleep(Duration::from_secs(1)).await;
        h.handle.stop_session().await.unwrap().unwrap();

        assert_eq!(ends.try_recv(), Some(EventValue::Int(REQUESTED_STOP_VALUE)));
        // The scheduler does not treat its own announcement as an external stop
        assert_eq!(h.bus.subscriber_count(EventName::EndSession), 1);

        // Nothing is announced when there was no session
        assert_eq!(h.handle.stop_session().await.unwrap(), None);
        assert_eq!(ends.try_recv(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undeclared_events_do_not_stop_the_session() {
        let bus = Arc::new(MemoryBus::new());
        bus.declare(EventName::StartSession).unwrap();
        let log = Arc::new(MemorySessionLog::new());
        let shutdown = CancellationToken::new();
        let (handle, task) = Scheduler::spawn(
            SchedulerPolicy::default(),
            bus.clone(),
            log.clone(),
            shutdown.clone(),
        );
        settle().await;
        let mut calls = bus.subscribe(EventName::CallChild, "test", 4).unwrap();

        // face-detected and call-acknowledged cannot be subscribed to
        let t0 = Instant::now();
        handle.start_session().await.unwrap();
        assert_eq!(bus.subscriber_count(EventName::EndSession), 1);

        assert_eq!(calls.recv().await, Some(EventValue::Int(1)));
        assert_eq!(t0.elapsed(), Duration::from_secs(5));
        assert_eq!(tagged(&log), vec![(LogTag::CallStarted, 1)]);
        assert_eq!(
            handle.snapshot().await.unwrap().state,
            SessionState::Active
        );

        assert!(handle.stop_session().await.unwrap().is_some());
        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_session() {
        let h = Harness::start().await;

        h.handle.start_session().await.unwrap();
        h.shutdown.cancel();
        h.task.await.unwrap();

        assert!(!h.log.is_open());
        assert_eq!(h.bus.subscriber_count(EventName::StartSession), 0);
        assert!(matches!(
            h.handle.snapshot().await,
            Err(BeckonError::SchedulerGone)
        ));
    }
}
