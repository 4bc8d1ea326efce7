// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

use parking_lot::Mutex;
use spineldb_client::core::sink::OutputSink;
use spineldb_client::core::storage::MemoryBackend;
use spineldb_client::core::{ClientOptions, ConnectionState, KvClient};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkLevel {
    Log,
    Warn,
    Error,
}

/// An output sink that remembers every line it receives.
#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(SinkLevel, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self, level: SinkLevel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines(SinkLevel::Error)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lines(SinkLevel::Warn)
    }

    pub fn logs(&self) -> Vec<String> {
        self.lines(SinkLevel::Log)
    }

    /// Number of lines at `level` containing `needle`.
    pub fn count_containing(&self, level: SinkLevel, needle: &str) -> usize {
        self.lines(level)
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl OutputSink for RecordingSink {
    fn log(&self, message: &str) {
        self.lines.lock().push((SinkLevel::Log, message.to_string()));
    }

    fn warn(&self, message: &str) {
        self.lines.lock().push((SinkLevel::Warn, message.to_string()));
    }

    fn error(&self, message: &str) {
        self.lines.lock().push((SinkLevel::Error, message.to_string()));
    }
}

/// Installs a quiet tracing subscriber (ignored if one is already set).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_test_writer()
        .try_init();
}

/// Options with short retry delays so connection failures resolve quickly.
pub fn fast_options() -> ClientOptions {
    ClientOptions {
        retry_delay: Duration::from_millis(5),
        ..ClientOptions::default()
    }
}

/// TestContext provides a client wired to an in-memory backend and a
/// recording sink.
pub struct TestContext {
    pub backend: Arc<MemoryBackend>,
    pub client: KvClient,
    pub sink: Arc<RecordingSink>,
}

impl TestContext {
    /// Creates a context whose client is already connected and ready.
    pub async fn new() -> Self {
        let ctx = Self::disconnected();
        ctx.connect().await;
        ctx
    }

    /// Creates a context whose client has not been connected.
    pub fn disconnected() -> Self {
        Self::with_backend(MemoryBackend::new())
    }

    pub fn with_backend(backend: MemoryBackend) -> Self {
        Self::with_backend_and_options(backend, fast_options())
    }

    pub fn with_backend_and_options(backend: MemoryBackend, options: ClientOptions) -> Self {
        init_tracing();
        let backend = Arc::new(backend);
        let sink = RecordingSink::new();
        let client = KvClient::builder("127.0.0.1", 6379)
            .options(options)
            .sink(sink.clone())
            .build(backend.clone());
        Self {
            backend,
            client,
            sink,
        }
    }

    /// Connects and waits for the ready signal to be applied.
    pub async fn connect(&self) {
        self.client.connect().await.expect("connect should succeed");
        assert!(
            self.wait_for(ConnectionState::Ready).await,
            "client did not become ready, state is {}",
            self.client.state()
        );
    }

    pub async fn wait_for(&self, state: ConnectionState) -> bool {
        self.client
            .wait_for_state(state, Duration::from_secs(2))
            .await
    }

    /// Names of every command that reached the store.
    pub fn store_commands(&self) -> Vec<String> {
        self.backend.store().command_log()
    }
}
