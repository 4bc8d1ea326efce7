// src/core/connection/machine.rs

//! Implements the lifecycle of a single store connection.
//!
//! `connect()` asks the injected factory for a capability and then follows the
//! capability's lifecycle events on a background task. A reported error moves
//! the connection to `Degraded` and stops there: recovery is always driven from
//! outside, by a caller re-invoking `connect()` or by a supervisor.

use super::state::ConnectionState;
use crate::core::capability::{
    CapabilityFactory, ConnectParams, LifecycleEvent, StoreCapability,
};
use crate::core::metrics::Metrics;
use crate::core::retry::{RetryContext, RetryDecision, RetryPolicy, RetryStrategy};
use crate::core::sink::OutputSink;
use crate::core::ClientError;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Mutable connection state, guarded by a mutex that is never held across an
/// `.await`.
struct Inner {
    state: ConnectionState,
    /// Present iff `state` is `Ready` or `Degraded`.
    capability: Option<Arc<dyn StoreCapability>>,
    /// A capability that has been constructed but has not signaled yet.
    pending: Option<Arc<dyn StoreCapability>>,
    /// Bumped whenever the capability is replaced or released, so that events
    /// from a superseded capability are ignored.
    generation: u64,
}

struct Shared {
    params: ConnectParams,
    policy: RetryPolicy,
    factory: Arc<dyn CapabilityFactory>,
    sink: Arc<dyn OutputSink>,
    metrics: Arc<Metrics>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
}

/// A handle to the connection state machine. Cloning shares the same machine.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Creates a connection in the `Disconnected` state. Nothing is contacted
    /// until [`Connection::connect`] is called.
    pub fn new(
        params: ConnectParams,
        policy: RetryPolicy,
        factory: Arc<dyn CapabilityFactory>,
        sink: Arc<dyn OutputSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        metrics.set_ready(false);
        Self {
            shared: Arc::new(Shared {
                params,
                policy,
                factory,
                sink,
                metrics,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    capability: None,
                    pending: None,
                    generation: 0,
                }),
                state_tx,
            }),
        }
    }

    pub fn params(&self) -> &ConnectParams {
        &self.shared.params
    }

    pub fn policy(&self) -> RetryPolicy {
        self.shared.policy
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Establishes the capability.
    ///
    /// A no-op when already `Ready` or while an attempt is in flight. Leaving
    /// `Degraded` moves through `Reconnecting` and releases the old capability.
    /// Readiness is reported asynchronously through the capability's `Ready`
    /// signal; this call returns once the capability has been constructed.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let (generation, previous) = {
            let mut inner = self.shared.inner.lock();
            if inner.state == ConnectionState::Ready {
                return Ok(());
            }
            if inner.state.is_in_flight() {
                debug!(
                    "connect() ignored: connection attempt already {}",
                    inner.state
                );
                return Ok(());
            }
            let next = if inner.state == ConnectionState::Degraded {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Connecting
            };
            inner.generation += 1;
            inner.pending = None;
            let previous = inner.capability.take();
            self.shared.transition(&mut inner, next);
            (inner.generation, previous)
        };
        drop(previous);

        let strategy = self.shared.retry_strategy();
        match self.shared.factory.create(&self.shared.params, strategy).await {
            Ok(established) => {
                {
                    let mut inner = self.shared.inner.lock();
                    if inner.generation != generation {
                        debug!("Discarding capability superseded during construction");
                        return Ok(());
                    }
                    inner.pending = Some(established.capability);
                }
                tokio::spawn(follow_lifecycle(
                    Arc::downgrade(&self.shared),
                    generation,
                    established.events,
                ));
                Ok(())
            }
            Err(e) => {
                {
                    let mut inner = self.shared.inner.lock();
                    if inner.generation == generation {
                        self.shared
                            .transition(&mut inner, ConnectionState::Disconnected);
                    }
                }
                self.shared.metrics.record_error();
                self.shared.sink.error(&format!(
                    "Failed to create store connection to {}: {e}",
                    self.shared.params.addr()
                ));
                Err(e)
            }
        }
    }

    /// Gracefully closes the connection and releases the capability.
    ///
    /// Fails with `NotConnected` if no capability has been established yet.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let capability = {
            let mut inner = self.shared.inner.lock();
            let held = inner.capability.take();
            match held {
                Some(capability) => {
                    inner.pending = None;
                    inner.generation += 1;
                    self.shared
                        .transition(&mut inner, ConnectionState::Disconnected);
                    capability
                }
                None => {
                    drop(inner);
                    let err = ClientError::NotConnected;
                    self.shared.sink.error(&format!("Cannot disconnect: {err}"));
                    return Err(err);
                }
            }
        };

        match capability.quit().await {
            Ok(()) => {
                self.shared.sink.log("Disconnected from store");
                Ok(())
            }
            Err(e) => {
                self.shared
                    .sink
                    .error(&format!("Error while closing store connection: {e}"));
                Err(e)
            }
        }
    }

    /// Moves the connection to `TerminalFailed`, releasing any capability.
    ///
    /// Used by an external supervisor once the retry policy aborts.
    pub fn fail(&self, error: ClientError) {
        {
            let mut inner = self.shared.inner.lock();
            inner.capability = None;
            inner.pending = None;
            inner.generation += 1;
            self.shared
                .transition(&mut inner, ConnectionState::TerminalFailed);
        }
        self.shared
            .sink
            .error(&format!("Store connection given up: {error}"));
    }

    /// Returns the held capability regardless of readiness.
    ///
    /// Used by the dispatcher, which deliberately does not pre-check readiness.
    pub fn capability(&self) -> Result<Arc<dyn StoreCapability>, ClientError> {
        self.shared
            .inner
            .lock()
            .capability
            .clone()
            .ok_or(ClientError::NotConnected)
    }

    /// Returns the capability only when the connection is `Ready`.
    pub fn ready_capability(&self) -> Result<Arc<dyn StoreCapability>, ClientError> {
        let inner = self.shared.inner.lock();
        match (&inner.state, &inner.capability) {
            (ConnectionState::Ready, Some(capability)) => Ok(capability.clone()),
            _ => Err(ClientError::NotReady),
        }
    }
}

impl Shared {
    fn transition(&self, inner: &mut Inner, next: ConnectionState) {
        if inner.state == next {
            return;
        }
        debug!(from = %inner.state, to = %next, "Store connection state transition");
        inner.state = next;
        self.state_tx.send_replace(next);
        self.metrics.set_ready(next == ConnectionState::Ready);
    }

    /// Builds the retry callback handed to the capability factory: logs the
    /// failed attempt and delegates the decision to the pure policy.
    fn retry_strategy(&self) -> RetryStrategy {
        let policy = self.policy;
        let sink = self.sink.clone();
        let addr = self.params.addr();
        Arc::new(move |ctx: &RetryContext<'_>| {
            if ctx.error.is_connection_refused() {
                sink.error(&format!(
                    "Connection refused by store at {addr} (attempt {})",
                    ctx.attempt
                ));
            } else {
                sink.warn(&format!(
                    "Connection attempt {} to {addr} failed: {}",
                    ctx.attempt, ctx.error
                ));
            }
            let decision = policy.decide(ctx);
            match &decision {
                RetryDecision::RetryAfter(delay) => {
                    debug!("Retrying store connection in {delay:?}")
                }
                RetryDecision::Abort(e) => warn!("Giving up on store connection: {e}"),
            }
            decision
        })
    }

    /// Applies one lifecycle event. Returns `false` once the listener should
    /// stop following this capability.
    fn handle_event(&self, generation: u64, event: LifecycleEvent) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        match event {
            LifecycleEvent::Ready => {
                if let Some(capability) = inner.pending.take() {
                    inner.capability = Some(capability);
                }
                if inner.capability.is_some() {
                    self.transition(&mut inner, ConnectionState::Ready);
                    drop(inner);
                    self.sink.log(&format!(
                        "Connected to store (db: {})",
                        self.params.database
                    ));
                }
                true
            }
            LifecycleEvent::Error(e) => {
                if let Some(capability) = inner.pending.take() {
                    inner.capability = Some(capability);
                }
                if inner.capability.is_some() {
                    self.transition(&mut inner, ConnectionState::Degraded);
                }
                drop(inner);
                self.metrics.record_error();
                self.sink.error(&format!("Store error: {e}"));
                true
            }
            LifecycleEvent::Fatal(e) => {
                inner.capability = None;
                inner.pending = None;
                self.transition(&mut inner, ConnectionState::TerminalFailed);
                drop(inner);
                self.metrics.record_error();
                self.sink
                    .error(&format!("Store connection failed permanently: {e}"));
                false
            }
        }
    }
}

/// Follows the lifecycle events of one capability generation.
async fn follow_lifecycle(
    shared: Weak<Shared>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<LifecycleEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if !shared.handle_event(generation, event) {
            return;
        }
    }
    debug!("Lifecycle channel closed for connection generation {generation}");
}
