#[path = "integration/test_helpers.rs"]
mod test_helpers;

use async_trait::async_trait;
use parking_lot::Mutex;
use spineldb_client::KvClient;
use spineldb_client::core::capability::Established;
use spineldb_client::core::retry::{RetryPolicy, RetryStrategy};
use spineldb_client::core::storage::MemoryBackend;
use spineldb_client::core::{
    CapabilityFactory, ClientError, ConnectParams, ConnectionState, LifecycleEvent,
};
use spineldb_client::supervisor::ReconnectSupervisor;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{RecordingSink, SinkLevel, TestContext};
use tokio::sync::broadcast;

/// Delegates to a memory backend, except that `create` can be made to fail.
struct FailingFactory {
    backend: Arc<MemoryBackend>,
    failure: Mutex<Option<ClientError>>,
    /// Keep failing instead of failing only once.
    sticky: bool,
}

impl FailingFactory {
    fn new(sticky: bool) -> Arc<Self> {
        Arc::new(Self {
            backend: Arc::new(MemoryBackend::new()),
            failure: Mutex::new(None),
            sticky,
        })
    }

    fn fail_with(&self, error: ClientError) {
        *self.failure.lock() = Some(error);
    }
}

#[async_trait]
impl CapabilityFactory for FailingFactory {
    async fn create(
        &self,
        params: &ConnectParams,
        retry: RetryStrategy,
    ) -> Result<Established, ClientError> {
        let failure = {
            let mut failure = self.failure.lock();
            if self.sticky {
                failure.clone()
            } else {
                failure.take()
            }
        };
        match failure {
            Some(error) => Err(error),
            None => self.backend.create(params, retry).await,
        }
    }
}

async fn ready_client(factory: Arc<FailingFactory>, sink: Arc<RecordingSink>) -> KvClient {
    let client = KvClient::builder("127.0.0.1", 6379)
        .sink(sink)
        .build(factory);
    client.connect().await.unwrap();
    assert!(
        client
            .wait_for_state(ConnectionState::Ready, Duration::from_secs(2))
            .await
    );
    client
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(5))
}

#[tokio::test]
async fn test_supervisor_recovers_degraded_connection() {
    let ctx = TestContext::new().await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = ReconnectSupervisor::new(ctx.client.connection().clone())
        .with_policy(fast_policy(3))
        .spawn(shutdown_rx);

    ctx.backend.drop_connection();
    assert!(ctx.wait_for(ConnectionState::Degraded).await);
    assert!(ctx.wait_for(ConnectionState::Ready).await);
    assert_eq!(ctx.backend.created(), 2);
    assert_eq!(ctx.client.set("k", "v", None).await.unwrap(), spineldb_client::core::Reply::ok());

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("supervisor did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_supervisor_recovers_repeatedly() {
    let ctx = TestContext::new().await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let _handle = ReconnectSupervisor::new(ctx.client.connection().clone())
        .with_policy(fast_policy(3))
        .with_jitter(Duration::from_millis(2))
        .spawn(shutdown_rx);

    for round in 2..=3 {
        ctx.backend.drop_connection();
        assert!(ctx.wait_for(ConnectionState::Degraded).await);
        assert!(ctx.wait_for(ConnectionState::Ready).await);
        assert_eq!(ctx.backend.created(), round);
    }
    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_supervisor_gives_up_after_policy_aborts() {
    let ctx = TestContext::with_backend(MemoryBackend::new().with_manual_ready());
    ctx.client.connect().await.unwrap();
    ctx.backend.emit(LifecycleEvent::Ready);
    assert!(ctx.wait_for(ConnectionState::Ready).await);

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = ReconnectSupervisor::new(ctx.client.connection().clone())
        .with_policy(fast_policy(2))
        .spawn(shutdown_rx);

    // Every reconnect comes back degraded.
    let backend = ctx.backend.clone();
    let mut states = ctx.client.subscribe();
    let failer = tokio::spawn(async move {
        loop {
            if states.changed().await.is_err() {
                return;
            }
            let state = *states.borrow_and_update();
            match state {
                ConnectionState::Reconnecting | ConnectionState::Connecting => {
                    tokio::task::yield_now().await;
                    backend.emit(LifecycleEvent::Error(ClientError::Connection("down".into())));
                }
                ConnectionState::TerminalFailed => return,
                _ => {}
            }
        }
    });

    ctx.backend
        .emit(LifecycleEvent::Error(ClientError::Connection("down".into())));

    assert!(ctx.wait_for(ConnectionState::TerminalFailed).await);
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("supervisor should exit after giving up")
        .unwrap();
    failer.abort();
}

#[tokio::test]
async fn test_supervisor_ignores_disconnected_client() {
    let ctx = TestContext::new().await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let _handle = ReconnectSupervisor::new(ctx.client.connection().clone())
        .with_policy(fast_policy(3))
        .spawn(shutdown_rx);

    ctx.client.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ctx.client.state(), ConnectionState::Disconnected);
    assert_eq!(ctx.backend.created(), 1);
    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_supervisor_stops_on_shutdown() {
    let ctx = TestContext::new().await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = ReconnectSupervisor::new(ctx.client.connection().clone()).spawn(shutdown_rx);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("supervisor did not stop")
        .unwrap();
    assert_eq!(ctx.client.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_supervisor_retries_transport_failure_during_reconnect() {
    let factory = FailingFactory::new(false);
    let client = ready_client(factory.clone(), RecordingSink::new()).await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let _handle = ReconnectSupervisor::new(client.connection().clone())
        .with_policy(fast_policy(3))
        .spawn(shutdown_rx);

    factory.fail_with(ClientError::Connection("connect ECONNREFUSED 127.0.0.1:6379".into()));
    factory.backend.drop_connection();

    assert!(
        client
            .wait_for_state(ConnectionState::Ready, Duration::from_secs(2))
            .await
    );
    assert_eq!(factory.backend.created(), 2);
    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_supervisor_gives_up_on_non_transport_failure() {
    let factory = FailingFactory::new(true);
    let sink = RecordingSink::new();
    let client = ready_client(factory.clone(), sink.clone()).await;
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = ReconnectSupervisor::new(client.connection().clone())
        .with_policy(fast_policy(3))
        .spawn(shutdown_rx);

    factory.fail_with(ClientError::Internal("capability misconfigured".into()));
    factory.backend.drop_connection();

    assert!(
        client
            .wait_for_state(ConnectionState::TerminalFailed, Duration::from_secs(2))
            .await
    );
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("supervisor should exit after giving up")
        .unwrap();
    assert_eq!(factory.backend.created(), 1);
    assert_eq!(
        sink.count_containing(SinkLevel::Error, "Store connection given up"),
        1
    );
}
