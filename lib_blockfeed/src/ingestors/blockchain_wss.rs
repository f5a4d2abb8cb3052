//! # Blockchain WSS Feed
//!
//! The live Bitcoin event feed. [`BlockchainFeed`] is a cheap, cloneable
//! handle; all connection state lives in a single reactor task spawned by
//! [`BlockchainFeed::spawn`], which owns the endpoint cursor, the
//! subscription registry, the heartbeat and the reconnection supervisor.
//! Handles talk to it over a command channel, and it publishes the degraded
//! flag and [`FeedState`] on watch channels and every lifecycle transition as
//! a [`FeedEvent`] on a broadcast channel.
//!
//! At most one connection is open and at most one open attempt is in flight
//! at any time. Every timer belongs to the phase that started it, so leaving
//! a phase cancels its timers.
//!
//! Message callbacks run on the reactor task. They should return quickly;
//! anything slow belongs on a channel.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep, timeout, Sleep};

use crate::configs::FeedSettings;
use crate::core::{
    Dispatcher, EndpointError, EndpointList, FailoverCursor, FeedState, Heartbeat, Registry, Supervisor,
};
use crate::error::FeedError;
use crate::protocol::{EventTag, FeedMessage, Subscription, SubscriptionKind};
use crate::transport::{Connection, Transport, TransportError};

/// Upper bound on a graceful close before the connection is simply dropped.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Capacity of the lifecycle event channel. Slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 256;

/// How a call to [`BlockchainFeed::connect`] settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A connection is open and subscriptions have been replayed.
    Live,
    /// No endpoint could be reached, or the transport is unavailable.
    Degraded,
    /// `disconnect` was called before the attempt settled.
    Closed,
}

impl ConnectOutcome {
    /// Whether the caller should fall back to synthetic data.
    pub fn is_degraded(&self) -> bool {
        matches!(self, ConnectOutcome::Degraded)
    }
}

/// Why the feed entered degraded mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    /// The host reported that it cannot create the transport.
    TransportUnavailable,
    /// Every endpoint failed or timed out during a `connect` sweep.
    EndpointsExhausted,
    /// The supervisor used up its reconnection attempts.
    ReconnectsExhausted,
}

/// Lifecycle notifications published by the reactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// An open attempt started against `endpoint`.
    AttemptStarted {
        /// Endpoint being opened.
        endpoint: String,
    },
    /// The attempt against `endpoint` hit the open timeout and was abandoned.
    AttemptTimedOut {
        /// Endpoint that timed out.
        endpoint: String,
    },
    /// The attempt against `endpoint` failed outright.
    AttemptFailed {
        /// Endpoint that failed.
        endpoint: String,
        /// Transport message.
        error: String,
    },
    /// A connection to `endpoint` is open and subscriptions were replayed.
    Connected {
        /// The open endpoint.
        endpoint: String,
    },
    /// The open connection failed or was closed by the peer.
    ConnectionLost {
        /// Endpoint of the lost connection.
        endpoint: String,
    },
    /// A heartbeat ping could not be sent and the connection was retired.
    HeartbeatFailed {
        /// Endpoint of the retired connection.
        endpoint: String,
    },
    /// Reconnection attempt `attempt` will run after `delay`.
    ReconnectScheduled {
        /// 1-based attempt number.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// The feed entered degraded mode.
    Degraded {
        /// What exhausted the feed.
        reason: DegradedReason,
    },
    /// The caller tore the feed down.
    Disconnected,
}

enum Command {
    Connect(oneshot::Sender<ConnectOutcome>),
    Disconnect(oneshot::Sender<()>),
    Subscribe(Subscription),
    Unsubscribe(SubscriptionKind),
    Snapshot(oneshot::Sender<Vec<Subscription>>),
}

/// Handle to a running feed. Clones share the same reactor; the reactor stops
/// and closes its connection once every handle is dropped.
#[derive(Clone)]
pub struct BlockchainFeed {
    commands: mpsc::UnboundedSender<Command>,
    dispatcher: Arc<Dispatcher>,
    degraded: watch::Receiver<bool>,
    state: watch::Receiver<FeedState>,
    events: broadcast::Sender<FeedEvent>,
}

impl BlockchainFeed {
    /// Validates the endpoint list and spawns the reactor on the current
    /// tokio runtime. Nothing is opened until [`connect`](Self::connect).
    pub fn spawn(settings: FeedSettings, transport: Arc<dyn Transport>) -> Result<Self, EndpointError> {
        let endpoints = settings.endpoint_list()?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (degraded_tx, degraded_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(FeedState::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let dispatcher = Arc::new(Dispatcher::new());

        log::info!(
            "Blockchain feed ready with {} endpoint(s): {}",
            endpoints.len(),
            endpoints.iter().collect::<Vec<_>>().join(", ")
        );

        let reactor = Reactor {
            endpoints,
            open_timeout: settings.open_timeout(),
            heartbeat_interval: settings.heartbeat_interval(),
            transport,
            commands: commands_rx,
            dispatcher: Arc::clone(&dispatcher),
            registry: Registry::new(),
            supervisor: Supervisor::new(settings.reconnect_policy()),
            phase: Phase::Idle,
            reconnecting: false,
            waiters: Vec::new(),
            degraded: degraded_tx,
            state: state_tx,
            events: events_tx.clone(),
        };
        tokio::spawn(reactor.run());

        Ok(Self {
            commands: commands_tx,
            dispatcher,
            degraded: degraded_rx,
            state: state_rx,
            events: events_tx,
        })
    }

    /// # Connect
    ///
    /// Tries the endpoints in order, one at a time, each bounded by the open
    /// timeout, and settles once one opens or all have failed. Never fails:
    /// an exhausted sweep settles as [`ConnectOutcome::Degraded`].
    ///
    /// Calling this while an attempt is already in flight joins that attempt
    /// instead of opening a second connection. Calling it while connected
    /// settles as `Live` immediately.
    pub async fn connect(&self) -> ConnectOutcome {
        let (reply, outcome) = oneshot::channel();
        if self.commands.send(Command::Connect(reply)).is_err() {
            log::error!("Feed reactor is gone, reporting degraded");
            return ConnectOutcome::Degraded;
        }
        outcome.await.unwrap_or(ConnectOutcome::Degraded)
    }

    /// # Disconnect
    ///
    /// Closes the connection, cancels every pending timer and abandons any
    /// in-flight attempt. No reconnection follows. Idempotent; returns once
    /// the teardown is done.
    pub async fn disconnect(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Disconnect(reply)).is_ok() {
            let _ = done.await;
        }
    }

    /// Adds `subscription` to the registry. It is sent immediately when a
    /// connection is open and replayed on every later open. Duplicates are
    /// ignored.
    pub fn subscribe(&self, subscription: Subscription) {
        self.command(Command::Subscribe(subscription));
    }

    /// Removes every subscription of `kind`, sending the matching cancel
    /// frames when a connection is open.
    pub fn unsubscribe(&self, kind: SubscriptionKind) {
        self.command(Command::Unsubscribe(kind));
    }

    /// Subscribes to newly mined blocks.
    pub fn subscribe_new_blocks(&self) {
        self.subscribe(Subscription::NewBlocks);
    }

    /// Stops new-block notifications.
    pub fn unsubscribe_new_blocks(&self) {
        self.unsubscribe(SubscriptionKind::NewBlocks);
    }

    /// Subscribes to unconfirmed transactions.
    pub fn subscribe_new_transactions(&self) {
        self.subscribe(Subscription::NewTransactions);
    }

    /// Stops unconfirmed-transaction notifications.
    pub fn unsubscribe_new_transactions(&self) {
        self.unsubscribe(SubscriptionKind::NewTransactions);
    }

    /// Watches transactions touching `addr`.
    pub fn subscribe_address(&self, addr: impl Into<String>) {
        self.subscribe(Subscription::address(addr));
    }

    /// Drops every address watch.
    pub fn unsubscribe_addresses(&self) {
        self.unsubscribe(SubscriptionKind::AddressWatch);
    }

    /// The registry contents, in no particular order.
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        let (reply, snapshot) = oneshot::channel();
        if self.commands.send(Command::Snapshot(reply)).is_err() {
            return Vec::new();
        }
        snapshot.await.unwrap_or_default()
    }

    /// Registers `callback` for frames tagged `tag`. Callbacks accumulate and
    /// are never removed; a panicking callback does not affect the others.
    pub fn on_message<F>(&self, tag: EventTag, callback: F)
    where
        F: Fn(&FeedMessage) + Send + Sync + 'static,
    {
        self.dispatcher.register(tag, Arc::new(callback));
    }

    /// Sets the single error observer, replacing any previous one.
    pub fn on_error<F>(&self, observer: F)
    where
        F: Fn(&FeedError) + Send + Sync + 'static,
    {
        self.dispatcher.set_error_observer(Arc::new(observer));
    }

    /// Whether callers should currently render synthetic data. Stays `false`
    /// while the supervisor is still retrying.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// A receiver that observes every change of the degraded flag.
    pub fn degraded_watch(&self) -> watch::Receiver<bool> {
        self.degraded.clone()
    }

    /// Current operational state.
    pub fn state(&self) -> FeedState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn state_watch(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }

    /// Subscribes to lifecycle events from this point on.
    pub fn events(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::error!("Feed reactor is gone, command dropped");
        }
    }
}

type Opening = Pin<Box<dyn Future<Output = Result<Box<dyn Connection>, TransportError>> + Send>>;

/// An open attempt against one endpoint, raced against its deadline.
struct Attempt {
    cursor: FailoverCursor,
    endpoint: String,
    opening: Opening,
    deadline: Pin<Box<Sleep>>,
}

struct Live {
    endpoint: String,
    connection: Box<dyn Connection>,
    heartbeat: Heartbeat,
}

enum Phase {
    Idle,
    Connecting(Attempt),
    Open(Live),
    Backoff(Pin<Box<Sleep>>),
    Degraded,
}

enum Event {
    Command(Command),
    Opened(Result<Box<dyn Connection>, TransportError>),
    OpenTimedOut,
    Frame(String),
    Lost(Option<TransportError>),
    HeartbeatDue,
    BackoffElapsed,
}

impl Phase {
    /// Waits for whatever the current phase is waiting on. Cancel-safe.
    async fn next_event(&mut self) -> Event {
        match self {
            Phase::Connecting(attempt) => tokio::select! {
                result = &mut attempt.opening => Event::Opened(result),
                _ = &mut attempt.deadline => Event::OpenTimedOut,
            },
            Phase::Open(live) => tokio::select! {
                frame = live.connection.recv() => match frame {
                    Some(Ok(text)) => Event::Frame(text),
                    Some(Err(e)) => Event::Lost(Some(e)),
                    None => Event::Lost(None),
                },
                _ = live.heartbeat.due() => Event::HeartbeatDue,
            },
            Phase::Backoff(wake) => {
                wake.as_mut().await;
                Event::BackoffElapsed
            }
            Phase::Idle | Phase::Degraded => std::future::pending().await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Connecting(_) => "connecting",
            Phase::Open(_) => "open",
            Phase::Backoff(_) => "backoff",
            Phase::Degraded => "degraded",
        }
    }
}

struct Reactor {
    endpoints: EndpointList,
    open_timeout: Duration,
    heartbeat_interval: Duration,
    transport: Arc<dyn Transport>,
    commands: mpsc::UnboundedReceiver<Command>,
    dispatcher: Arc<Dispatcher>,
    registry: Registry,
    supervisor: Supervisor,
    phase: Phase,
    /// The current sweep belongs to the supervisor rather than a caller.
    reconnecting: bool,
    waiters: Vec<oneshot::Sender<ConnectOutcome>>,
    degraded: watch::Sender<bool>,
    state: watch::Sender<FeedState>,
    events: broadcast::Sender<FeedEvent>,
}

impl Reactor {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => Event::Command(command),
                    None => break,
                },
                event = self.phase.next_event() => event,
            };
            self.handle(event).await;
        }

        log::debug!("All feed handles dropped, stopping reactor");
        if let Some(endpoint) = self.retire().await {
            log::info!("Closed connection to {}", endpoint);
        }
    }

    async fn handle(&mut self, event: Event) {
        match event {
            Event::Command(command) => self.on_command(command).await,
            Event::Opened(Ok(connection)) => self.on_open(connection).await,
            Event::Opened(Err(error)) => self.on_attempt_failed(error),
            Event::OpenTimedOut => self.on_attempt_timed_out(),
            Event::Frame(text) => {
                self.dispatcher.dispatch(&text);
            }
            Event::Lost(error) => self.on_connection_lost(error).await,
            Event::HeartbeatDue => self.on_heartbeat().await,
            Event::BackoffElapsed => {
                log::info!("Reconnection attempt {} starting", self.supervisor.attempt_count());
                self.begin_sweep();
            }
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => self.on_connect(reply),
            Command::Disconnect(reply) => {
                self.on_disconnect().await;
                let _ = reply.send(());
            }
            Command::Subscribe(subscription) => self.on_subscribe(subscription).await,
            Command::Unsubscribe(kind) => self.on_unsubscribe(kind).await,
            Command::Snapshot(reply) => {
                let _ = reply.send(self.registry.snapshot());
            }
        }
    }

    fn on_connect(&mut self, reply: oneshot::Sender<ConnectOutcome>) {
        match self.phase {
            Phase::Open(_) => {
                let _ = reply.send(ConnectOutcome::Live);
            }
            Phase::Connecting(_) | Phase::Backoff(_) => {
                log::debug!("connect() while {}, joining the attempt in flight", self.phase.name());
                self.waiters.push(reply);
            }
            Phase::Idle | Phase::Degraded => {
                self.waiters.push(reply);
                self.supervisor.reset();
                self.reconnecting = false;
                self.begin_sweep();
            }
        }
    }

    /// Starts a pass over the endpoint list from the first entry.
    fn begin_sweep(&mut self) {
        if !self.transport.is_supported() {
            log::warn!("WebSocket transport unavailable on this host, switching to degraded mode");
            self.degrade(DegradedReason::TransportUnavailable);
            return;
        }
        if !self.reconnecting {
            self.set_state(FeedState::Connecting);
        }
        self.try_endpoint(FailoverCursor::start());
    }

    fn try_endpoint(&mut self, cursor: FailoverCursor) {
        let Some(endpoint) = cursor.current(&self.endpoints).map(str::to_string) else {
            self.on_sweep_exhausted();
            return;
        };

        log::info!(
            "Connecting to {} ({}/{})",
            endpoint,
            cursor.index() + 1,
            self.endpoints.len()
        );
        self.emit(FeedEvent::AttemptStarted { endpoint: endpoint.clone() });

        let transport = Arc::clone(&self.transport);
        let uri = endpoint.clone();
        let opening: Opening = Box::pin(async move { transport.open(&uri).await });

        self.phase = Phase::Connecting(Attempt {
            cursor,
            endpoint,
            opening,
            deadline: Box::pin(sleep(self.open_timeout)),
        });
    }

    /// Takes the current attempt out of the phase, dropping its pending open.
    fn abandon_attempt(&mut self) -> Option<(FailoverCursor, String)> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Connecting(attempt) => Some((attempt.cursor, attempt.endpoint)),
            other => {
                self.phase = other;
                None
            }
        }
    }

    fn on_attempt_timed_out(&mut self) {
        let Some((mut cursor, endpoint)) = self.abandon_attempt() else {
            return;
        };
        log::warn!("Connection to {} timed out after {:?}", endpoint, self.open_timeout);
        self.emit(FeedEvent::AttemptTimedOut { endpoint });
        cursor.advance();
        self.try_endpoint(cursor);
    }

    fn on_attempt_failed(&mut self, error: TransportError) {
        let Some((mut cursor, endpoint)) = self.abandon_attempt() else {
            return;
        };
        log::warn!("Connection to {} failed: {}", endpoint, error);
        self.dispatcher.report_error(&FeedError::ConnectFailed {
            endpoint: endpoint.clone(),
            reason: error.to_string(),
        });
        self.emit(FeedEvent::AttemptFailed { endpoint, error: error.to_string() });
        cursor.advance();
        self.try_endpoint(cursor);
    }

    fn on_sweep_exhausted(&mut self) {
        if self.reconnecting {
            log::warn!(
                "Reconnection attempt {} failed on every endpoint",
                self.supervisor.attempt_count()
            );
            self.schedule_reconnect();
        } else {
            log::warn!(
                "All {} endpoint(s) failed, switching to degraded mode",
                self.endpoints.len()
            );
            self.degrade(DegradedReason::EndpointsExhausted);
        }
    }

    async fn on_open(&mut self, mut connection: Box<dyn Connection>) {
        let Some((_, endpoint)) = self.abandon_attempt() else {
            connection.close().await;
            return;
        };

        log::info!("Connected to {}", endpoint);
        self.supervisor.reset();
        self.reconnecting = false;
        self.degraded.send_replace(false);

        let frames = self.registry.replay_frames();
        if !frames.is_empty() {
            log::info!("Replaying {} subscription(s) on {}", frames.len(), endpoint);
        }
        for frame in frames {
            if let Err(e) = connection.send(frame).await {
                log::warn!("Error resubscribing on {}: {}", endpoint, e);
            }
        }

        self.phase = Phase::Open(Live {
            endpoint: endpoint.clone(),
            connection,
            heartbeat: Heartbeat::start(self.heartbeat_interval),
        });
        self.set_state(FeedState::Connected);
        self.emit(FeedEvent::Connected { endpoint });
        self.settle(ConnectOutcome::Live);
    }

    async fn on_connection_lost(&mut self, error: Option<TransportError>) {
        let Some(endpoint) = self.retire().await else {
            return;
        };

        match error {
            Some(e) => {
                log::error!("Connection to {} failed: {}", endpoint, e);
                self.dispatcher.report_error(&FeedError::ConnectionLost {
                    endpoint: endpoint.clone(),
                    reason: Some(e.to_string()),
                });
            }
            None => log::warn!("Connection to {} closed by remote host", endpoint),
        }

        self.emit(FeedEvent::ConnectionLost { endpoint });
        self.reconnecting = true;
        self.schedule_reconnect();
    }

    async fn on_heartbeat(&mut self) {
        let result = match &mut self.phase {
            Phase::Open(live) => {
                let frame = live.heartbeat.probe();
                log::debug!("Heartbeat #{} to {}", live.heartbeat.sent(), live.endpoint);
                live.connection.send(frame).await
            }
            _ => return,
        };

        if let Err(error) = result {
            let endpoint = self.retire().await.unwrap_or_default();
            log::error!("Heartbeat to {} failed: {}", endpoint, error);
            self.dispatcher.report_error(&FeedError::HeartbeatFailed {
                endpoint: endpoint.clone(),
                reason: error.to_string(),
            });
            self.emit(FeedEvent::HeartbeatFailed { endpoint });
            self.reconnecting = true;
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        match self.supervisor.next_attempt() {
            Some((attempt, delay)) => {
                log::info!(
                    "Attempting to reconnect ({}/{}) in {:?}",
                    attempt,
                    self.supervisor.policy().max_attempts,
                    delay
                );
                self.set_state(FeedState::Reconnecting { attempt });
                self.emit(FeedEvent::ReconnectScheduled { attempt, delay });
                self.phase = Phase::Backoff(Box::pin(sleep(delay)));
            }
            None => {
                log::warn!("Maximum reconnection attempts reached, switching to degraded mode");
                self.degrade(DegradedReason::ReconnectsExhausted);
            }
        }
    }

    fn degrade(&mut self, reason: DegradedReason) {
        self.phase = Phase::Degraded;
        self.reconnecting = false;
        self.degraded.send_replace(true);
        self.set_state(FeedState::Degraded);
        self.emit(FeedEvent::Degraded { reason });
        self.settle(ConnectOutcome::Degraded);
    }

    async fn on_disconnect(&mut self) {
        let was = self.phase.name();
        let torn_down = !matches!(self.phase, Phase::Idle);

        if let Some(endpoint) = self.retire().await {
            log::info!("Disconnected from {}", endpoint);
        } else if torn_down {
            log::info!("Disconnected while {}", was);
        }

        self.reconnecting = false;
        self.settle(ConnectOutcome::Closed);
        self.set_state(FeedState::Idle);
        if torn_down {
            self.emit(FeedEvent::Disconnected);
        }
    }

    async fn on_subscribe(&mut self, subscription: Subscription) {
        let frame = subscription.subscribe_frame();
        if !self.registry.subscribe(subscription) {
            return;
        }
        if let Phase::Open(live) = &mut self.phase {
            if let Err(e) = live.connection.send(frame).await {
                log::warn!("Error subscribing on {}: {}", live.endpoint, e);
            }
        }
    }

    async fn on_unsubscribe(&mut self, kind: SubscriptionKind) {
        let removed = self.registry.unsubscribe(kind);
        if let Phase::Open(live) = &mut self.phase {
            for subscription in removed {
                if let Err(e) = live.connection.send(subscription.cancel_frame()).await {
                    log::warn!("Error unsubscribing on {}: {}", live.endpoint, e);
                }
            }
        }
    }

    /// Leaves the current phase, closing the connection if one is open.
    /// Returns the endpoint of the closed connection.
    async fn retire(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Open(mut live) => {
                if timeout(CLOSE_GRACE, live.connection.close()).await.is_err() {
                    log::debug!("Close of {} timed out, dropping it", live.endpoint);
                }
                Some(live.endpoint)
            }
            _ => None,
        }
    }

    fn settle(&mut self, outcome: ConnectOutcome) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome);
        }
    }

    fn set_state(&mut self, state: FeedState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            log::debug!("Feed state: {:?} -> {:?}", previous, state);
        }
    }

    fn emit(&self, event: FeedEvent) {
        let _ = self.events.send(event);
    }
}
