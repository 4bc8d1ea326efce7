// src/supervisor.rs

//! An optional background task that brings a degraded connection back.
//!
//! The connection state machine never reconnects on its own. This supervisor
//! watches it from the outside: whenever the connection enters `Degraded` it
//! runs a recovery cycle driven by the same [`RetryPolicy`] the capability
//! factory uses, and gives up by moving the connection to `TerminalFailed`.
//! A reconnect that fails for a reason other than the transport ends the cycle
//! at once.

use crate::core::ClientError;
use crate::core::connection::{Connection, ConnectionState};
use crate::core::retry::{RetryContext, RetryDecision, RetryPolicy};
use rand::Rng;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct ReconnectSupervisor {
    connection: Connection,
    policy: RetryPolicy,
    /// Upper bound of the random delay added to each backoff.
    jitter: Duration,
}

/// How a single recovery cycle ended.
#[derive(Debug, Clone, PartialEq)]
enum CycleOutcome {
    Recovered,
    /// Someone else changed the connection state during the cycle.
    Superseded(ConnectionState),
    GaveUp,
    Shutdown,
}

impl ReconnectSupervisor {
    pub fn new(connection: Connection) -> Self {
        let policy = connection.policy();
        Self {
            connection,
            policy,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn spawn(self, shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown_rx))
    }

    /// Runs until shutdown is signaled, the connection handle is dropped, or
    /// the connection has been given up.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Reconnect supervisor started.");
        let mut states = self.connection.subscribe();

        loop {
            tokio::select! {
                changed = states.wait_for(|s| *s == ConnectionState::Degraded) => {
                    if changed.is_err() {
                        debug!("Connection dropped; reconnect supervisor exiting.");
                        return;
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Reconnect supervisor shutting down.");
                    return;
                }
            }

            match self.recover(&mut states, &mut shutdown_rx).await {
                CycleOutcome::Recovered => info!("Store connection recovered."),
                CycleOutcome::Superseded(state) => {
                    debug!("Recovery cycle abandoned; connection is now {state}")
                }
                CycleOutcome::GaveUp => {
                    warn!("Reconnect supervisor gave up on the store connection.");
                    return;
                }
                CycleOutcome::Shutdown => {
                    info!("Reconnect supervisor shutting down during recovery.");
                    return;
                }
            }
        }
    }

    async fn recover(
        &self,
        states: &mut watch::Receiver<ConnectionState>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> CycleOutcome {
        let started = Instant::now();
        let mut attempt = 0;
        let mut last_error = ClientError::Connection("connection degraded".into());
        // The state this cycle expects to find before each attempt. Anything
        // else means the connection was recovered or closed elsewhere.
        let mut expected = ConnectionState::Degraded;

        loop {
            attempt += 1;
            let ctx = RetryContext {
                attempt,
                error: &last_error,
                total_retry_time: started.elapsed(),
            };
            let delay = match self.policy.decide(&ctx) {
                RetryDecision::RetryAfter(delay) => delay + self.random_jitter(),
                RetryDecision::Abort(e) => {
                    self.connection.fail(e);
                    return CycleOutcome::GaveUp;
                }
            };

            info!("Reconnecting to store in {delay:?} (attempt {attempt})");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.recv() => return CycleOutcome::Shutdown,
            }

            let current = self.connection.state();
            if current != expected {
                return CycleOutcome::Superseded(current);
            }

            if let Err(e) = self.connection.connect().await {
                if !e.is_connection_error() {
                    warn!("Reconnect failed with a non-transport error: {e}");
                    self.connection.fail(e);
                    return CycleOutcome::GaveUp;
                }
                last_error = e;
                expected = ConnectionState::Disconnected;
                continue;
            }

            let settled = tokio::select! {
                settled = states.wait_for(|s| !s.is_in_flight()) => match settled {
                    Ok(state) => *state,
                    Err(_) => return CycleOutcome::Shutdown,
                },
                _ = shutdown_rx.recv() => return CycleOutcome::Shutdown,
            };
            match settled {
                ConnectionState::Ready => return CycleOutcome::Recovered,
                ConnectionState::Degraded => {
                    last_error = ClientError::Connection(
                        "store reported an error during reconnect".into(),
                    );
                    expected = ConnectionState::Degraded;
                }
                ConnectionState::TerminalFailed => return CycleOutcome::GaveUp,
                other => return CycleOutcome::Superseded(other),
            }
        }
    }

    fn random_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let max = self.jitter.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}
