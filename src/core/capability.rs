// src/core/capability.rs

//! The seam between the facade and the underlying store client.
//!
//! The facade never speaks a wire protocol itself. It is handed a
//! [`CapabilityFactory`] at construction; the connection state machine asks the
//! factory for a [`StoreCapability`] and subscribes to the [`LifecycleEvent`]s
//! that come with it.

use crate::core::commands::Command;
use crate::core::retry::RetryStrategy;
use crate::core::value::Reply;
use crate::core::ClientError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// An opaque secret used to authenticate with the store.
///
/// `Debug` and `Display` are redacted so the value never ends up in a log line.
/// In configuration files it is written as a plain optional string.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(Option<String>);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Some(secret.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Exposes the secret to a capability implementation.
    pub fn expose(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Credential(<redacted>)"),
            None => f.write_str("Credential(None)"),
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl From<Option<String>> for Credential {
    fn from(secret: Option<String>) -> Self {
        Self(secret)
    }
}

/// Everything a factory needs to build a capability.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub credential: Credential,
    pub database: u32,
}

impl ConnectParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credential: Credential::none(),
            database: 0,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Lifecycle signals emitted by a capability's connection machinery.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// The connection is established and accepting commands.
    Ready,
    /// A transport error occurred; the connection may be unusable.
    Error(ClientError),
    /// The connection machinery gave up after the retry strategy aborted.
    Fatal(ClientError),
}

/// A builder for the store's atomic-batch primitive (`MULTI` ... `EXEC`).
///
/// Submitted with [`StoreCapability::exec`], which returns one reply per
/// queued command, in queue order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicBatch {
    commands: Vec<Command>,
}

impl AtomicBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn get(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::Get { key: key.into() })
    }

    pub fn set(&mut self, key: impl Into<String>, value: Bytes) -> &mut Self {
        self.push(Command::Set {
            key: key.into(),
            value: Some(value),
            expiry: None,
        })
    }

    /// Queues a `SET` with an `EX` clause.
    pub fn set_ex(&mut self, key: impl Into<String>, value: Bytes, seconds: u64) -> &mut Self {
        self.push(Command::Set {
            key: key.into(),
            value: Some(value),
            expiry: Some(seconds),
        })
    }

    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::Del { key: key.into() })
    }

    pub fn zadd(&mut self, key: impl Into<String>, score: f64, member: Bytes) -> &mut Self {
        self.push(Command::ZAdd {
            key: key.into(),
            score,
            member,
        })
    }

    pub fn zrem(&mut self, key: impl Into<String>, member: Bytes) -> &mut Self {
        self.push(Command::ZRem {
            key: key.into(),
            member,
        })
    }

    pub fn zrange(&mut self, key: impl Into<String>, start: i64, stop: i64) -> &mut Self {
        self.push(Command::ZRange {
            key: key.into(),
            start,
            stop,
        })
    }

    pub fn ttl(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::Ttl { key: key.into() })
    }

    pub fn expire(&mut self, key: impl Into<String>, seconds: u64) -> &mut Self {
        self.push(Command::Expire {
            key: key.into(),
            seconds,
        })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// Per-command request/response access to the store.
#[async_trait]
pub trait StoreCapability: Send + Sync {
    /// Executes a single command and returns its reply, or the store's error.
    async fn execute(&self, command: Command) -> Result<Reply, ClientError>;

    /// Submits an atomic batch in one round trip.
    ///
    /// A batch-level failure returns `Err`; per-command failures inside a
    /// successful batch are returned as `Reply::Error` entries.
    async fn exec(&self, batch: AtomicBatch) -> Result<Vec<Reply>, ClientError>;

    /// Gracefully closes the connection.
    async fn quit(&self) -> Result<(), ClientError>;
}

/// A freshly constructed capability together with its lifecycle signals.
pub struct Established {
    pub capability: Arc<dyn StoreCapability>,
    pub events: mpsc::UnboundedReceiver<LifecycleEvent>,
}

/// Builds capabilities for the connection state machine.
#[async_trait]
pub trait CapabilityFactory: Send + Sync {
    /// Constructs a capability for `params`.
    ///
    /// The factory's connection machinery must consult `retry` whenever a
    /// connection attempt fails, and report the outcome through the returned
    /// event channel.
    async fn create(
        &self,
        params: &ConnectParams,
        retry: RetryStrategy,
    ) -> Result<Established, ClientError>;
}
