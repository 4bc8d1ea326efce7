// src/core/storage/backend.rs

//! A [`CapabilityFactory`] backed by a [`MemoryStore`].
//!
//! The backend can be scripted to refuse connection attempts, withhold its
//! ready signal, go offline or fail the next atomic batch, which makes it the
//! stand-in store for the CLI and for tests.

use super::memory::MemoryStore;
use crate::core::capability::{
    AtomicBatch, CapabilityFactory, ConnectParams, Established, LifecycleEvent, StoreCapability,
};
use crate::core::commands::Command;
use crate::core::retry::{RetryContext, RetryDecision, RetryStrategy};
use crate::core::value::Reply;
use crate::core::ClientError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Scripted behavior shared between the backend and the capabilities it
/// hands out.
#[derive(Debug, Default)]
struct Switches {
    offline: AtomicBool,
    fail_next_exec: Mutex<Option<ClientError>>,
}

#[derive(Debug)]
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
    switches: Arc<Switches>,
    auto_ready: bool,
    password: Option<String>,
    refusals: AtomicU32,
    created: AtomicUsize,
    last_params: Mutex<Option<ConnectParams>>,
    events: Mutex<Option<mpsc::UnboundedSender<LifecycleEvent>>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// A backend over a fresh store that signals `Ready` as soon as a
    /// capability is created.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            switches: Arc::new(Switches::default()),
            auto_ready: true,
            password: None,
            refusals: AtomicU32::new(0),
            created: AtomicUsize::new(0),
            last_params: Mutex::new(None),
            events: Mutex::new(None),
        }
    }

    /// Withholds the `Ready` signal; tests drive it with [`MemoryBackend::emit`].
    pub fn with_manual_ready(mut self) -> Self {
        self.auto_ready = false;
        self
    }

    /// Requires clients to present `password`. A mismatch is reported as an
    /// error signal instead of `Ready`.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Refuses the next `attempts` connection attempts, consulting the retry
    /// strategy after each one.
    pub fn refuse_connections(&self, attempts: u32) {
        self.refusals.store(attempts, Ordering::SeqCst);
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    /// How many capabilities have been constructed.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<ConnectParams> {
        self.last_params.lock().clone()
    }

    /// Delivers a lifecycle signal on the most recently created capability.
    /// Returns `false` if there is no live listener.
    pub fn emit(&self, event: LifecycleEvent) -> bool {
        match self.events.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// While offline, every command fails with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.switches.offline.store(offline, Ordering::SeqCst);
    }

    /// Simulates a dropped transport: goes offline and reports the error.
    pub fn drop_connection(&self) {
        self.set_offline(true);
        self.emit(LifecycleEvent::Error(ClientError::Connection(
            "connection reset by peer".into(),
        )));
    }

    /// Makes the next `exec` fail as a whole with `error`.
    pub fn fail_next_exec(&self, error: ClientError) {
        *self.switches.fail_next_exec.lock() = Some(error);
    }

    fn take_refusal(&self) -> bool {
        self.refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn authenticate(&self, params: &ConnectParams) -> Result<(), ClientError> {
        match &self.password {
            Some(expected) if params.credential.expose() != Some(expected.as_str()) => Err(
                ClientError::Connection("WRONGPASS invalid username-password pair".into()),
            ),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CapabilityFactory for MemoryBackend {
    async fn create(
        &self,
        params: &ConnectParams,
        retry: RetryStrategy,
    ) -> Result<Established, ClientError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock() = Some(params.clone());
        self.set_offline(false);

        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock() = Some(tx.clone());

        // Connection attempts are simulated up front, the way a real client
        // library connects in the background after construction.
        let mut attempt = 0;
        let started = Instant::now();
        while self.take_refusal() {
            attempt += 1;
            let error = ClientError::from(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("connect ECONNREFUSED {}", params.addr()),
            ));
            let ctx = RetryContext {
                attempt,
                error: &error,
                total_retry_time: started.elapsed(),
            };
            match retry(&ctx) {
                RetryDecision::RetryAfter(delay) => {
                    debug!("Memory backend retrying attempt {attempt} after {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Abort(e) => {
                    let _ = tx.send(LifecycleEvent::Fatal(e));
                    return Ok(Established {
                        capability: Arc::new(MemoryCapability::new(self, params.database)),
                        events: rx,
                    });
                }
            }
        }

        match self.authenticate(params) {
            Ok(()) if self.auto_ready => {
                let _ = tx.send(LifecycleEvent::Ready);
            }
            Ok(()) => {}
            Err(e) => {
                let _ = tx.send(LifecycleEvent::Error(e));
            }
        }

        info!(
            "Memory backend created capability for {} (db {})",
            params.addr(),
            params.database
        );
        Ok(Established {
            capability: Arc::new(MemoryCapability::new(self, params.database)),
            events: rx,
        })
    }
}

/// A capability bound to one database of the backing store.
#[derive(Debug)]
pub struct MemoryCapability {
    store: Arc<MemoryStore>,
    switches: Arc<Switches>,
    database: u32,
}

impl MemoryCapability {
    fn new(backend: &MemoryBackend, database: u32) -> Self {
        Self {
            store: backend.store.clone(),
            switches: backend.switches.clone(),
            database,
        }
    }

    fn ensure_online(&self) -> Result<(), ClientError> {
        if self.switches.offline.load(Ordering::SeqCst) {
            return Err(ClientError::Connection(
                "The connection is already closed.".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreCapability for MemoryCapability {
    async fn execute(&self, command: Command) -> Result<Reply, ClientError> {
        self.ensure_online()?;
        self.store.apply(self.database, &command)
    }

    async fn exec(&self, batch: AtomicBatch) -> Result<Vec<Reply>, ClientError> {
        self.ensure_online()?;
        if let Some(error) = self.switches.fail_next_exec.lock().take() {
            return Err(error);
        }
        Ok(self.store.apply_atomic(self.database, batch.commands()))
    }

    async fn quit(&self) -> Result<(), ClientError> {
        self.store.record(Command::Quit.name());
        Ok(())
    }
}
