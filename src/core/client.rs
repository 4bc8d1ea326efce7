// src/core/client.rs

//! The `KvClient` facade and its builder.
//!
//! A client owns one [`Connection`] and one metrics aggregator. The typed
//! single-key operations live in `dispatch`, the pipelined ones in `batch`.

use crate::core::capability::{CapabilityFactory, ConnectParams, Credential};
use crate::core::connection::{Connection, ConnectionState};
use crate::core::metrics::{Metrics, MetricsSnapshot};
use crate::core::retry::RetryPolicy;
use crate::core::sink::{OutputSink, default_sink};
use crate::core::ClientError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Tunables for a client, all optional in configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientOptions {
    #[serde(default = "default_enable_pipeline")]
    pub enable_pipeline: bool,
    /// Reserved for coalescing single calls into pipelines; not consulted by
    /// the batch executor, which always submits immediately.
    #[serde(with = "humantime_serde", default = "default_pipeline_timeout")]
    pub pipeline_timeout: Duration,
    /// Batches larger than this are executed but logged as oversized.
    #[serde(default = "default_max_pipeline_ops")]
    pub max_pipeline_ops: usize,
    #[serde(default = "default_connection_pool_size")]
    pub connection_pool_size: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(with = "humantime_serde", default = "default_retry_delay")]
    pub retry_delay: Duration,
}

fn default_enable_pipeline() -> bool {
    true
}
fn default_pipeline_timeout() -> Duration {
    Duration::from_millis(10)
}
fn default_max_pipeline_ops() -> usize {
    100
}
fn default_connection_pool_size() -> usize {
    1
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay() -> Duration {
    Duration::from_millis(1000)
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            enable_pipeline: default_enable_pipeline(),
            pipeline_timeout: default_pipeline_timeout(),
            max_pipeline_ops: default_max_pipeline_ops(),
            connection_pool_size: default_connection_pool_size(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
        }
    }
}

impl ClientOptions {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_delay)
    }
}

pub struct KvClientBuilder {
    params: ConnectParams,
    options: ClientOptions,
    sink: Option<Arc<dyn OutputSink>>,
}

impl KvClientBuilder {
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.params.credential = Credential::new(password);
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.params.credential = credential;
        self
    }

    pub fn database(mut self, database: u32) -> Self {
        self.params.database = database;
        self
    }

    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Builds a disconnected client that will obtain its capability from
    /// `factory` on the first `connect()`.
    pub fn build(self, factory: Arc<dyn CapabilityFactory>) -> KvClient {
        let sink = self.sink.unwrap_or_else(default_sink);
        let metrics = Arc::new(Metrics::new());
        let connection = Connection::new(
            self.params,
            self.options.retry_policy(),
            factory,
            sink.clone(),
            metrics.clone(),
        );
        KvClient {
            connection,
            metrics,
            sink,
            options: self.options,
        }
    }
}

/// A resilient facade over a remote key-value store.
///
/// Cloning is cheap and every clone shares the connection and the counters.
#[derive(Clone)]
pub struct KvClient {
    pub(crate) connection: Connection,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) sink: Arc<dyn OutputSink>,
    pub(crate) options: ClientOptions,
}

impl KvClient {
    pub fn builder(host: impl Into<String>, port: u16) -> KvClientBuilder {
        KvClientBuilder {
            params: ConnectParams::new(host, port),
            options: ClientOptions::default(),
            sink: None,
        }
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.connection.disconnect().await
    }

    pub fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// Waits until the connection reaches `state`, or returns `false` on
    /// timeout.
    pub async fn wait_for_state(&self, state: ConnectionState, timeout: Duration) -> bool {
        let mut rx = self.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|s| *s == state))
            .await
            .is_ok_and(|r| r.is_ok())
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.is_ready())
    }

    /// Zeroes the operation, pipeline and error counters.
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub fn encode_prometheus(&self) -> Result<String, ClientError> {
        self.metrics.encode_prometheus()
    }
}
