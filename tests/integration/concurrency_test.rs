// tests/integration/concurrency_test.rs

//! Concurrent callers sharing one client.

use super::test_helpers::TestContext;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use spineldb_client::KvClient;
use spineldb_client::core::batch::BatchDescriptor;
use spineldb_client::core::capability::{AtomicBatch, Established};
use spineldb_client::core::retry::RetryStrategy;
use spineldb_client::core::storage::MemoryBackend;
use spineldb_client::core::{
    CapabilityFactory, ClientError, Command, ConnectParams, ConnectionState, Reply,
    StoreCapability,
};
use std::sync::Arc;
use std::time::Duration;

/// Hands back to the scheduler after every `LLEN`, the way a networked
/// capability would between round trips.
struct YieldAfterLen {
    inner: Arc<dyn StoreCapability>,
}

#[async_trait]
impl StoreCapability for YieldAfterLen {
    async fn execute(&self, command: Command) -> Result<Reply, ClientError> {
        let is_len = matches!(command, Command::LLen { .. });
        let reply = self.inner.execute(command).await?;
        if is_len {
            tokio::task::yield_now().await;
        }
        Ok(reply)
    }

    async fn exec(&self, batch: AtomicBatch) -> Result<Vec<Reply>, ClientError> {
        self.inner.exec(batch).await
    }

    async fn quit(&self) -> Result<(), ClientError> {
        self.inner.quit().await
    }
}

struct YieldingFactory {
    backend: MemoryBackend,
}

#[async_trait]
impl CapabilityFactory for YieldingFactory {
    async fn create(
        &self,
        params: &ConnectParams,
        retry: RetryStrategy,
    ) -> Result<Established, ClientError> {
        let established = self.backend.create(params, retry).await?;
        Ok(Established {
            capability: Arc::new(YieldAfterLen {
                inner: established.capability,
            }),
            events: established.events,
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_all_counted() {
    let ctx = TestContext::new().await;
    let tasks: Vec<_> = (0..200)
        .map(|_| {
            let client = ctx.client.clone();
            tokio::spawn(async move { client.increment("counter").await })
        })
        .collect();
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(
        ctx.client.get("counter").await.unwrap(),
        Some(Bytes::from("200"))
    );
    assert_eq!(ctx.client.metrics().operations, 201);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_and_single_calls() {
    let ctx = TestContext::new().await;
    let mut tasks = Vec::new();
    for i in 0..50 {
        let client = ctx.client.clone();
        tasks.push(tokio::spawn(async move {
            let key = format!("k{i}");
            client
                .batch(&[
                    BatchDescriptor::new("set", key.as_str()).with_value(i.to_string()),
                    BatchDescriptor::new("get", key.as_str()),
                ])
                .await
                .map(|results| results.len())
        }));
        let client = ctx.client.clone();
        tasks.push(tokio::spawn(async move {
            client.add_set("members", i.to_string()).await.map(|n| n as usize)
        }));
    }
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let metrics = ctx.client.metrics();
    assert_eq!(metrics.pipeline_batches, 50);
    assert_eq!(metrics.pipeline_operations, 100);
    assert_eq!(metrics.operations, 50);
    assert_eq!(metrics.errors, 0);
    assert_eq!(ctx.client.get_set("members").await.unwrap().len(), 50);
}

#[tokio::test]
async fn test_calls_can_be_bounded_by_caller_timeout() {
    let ctx = TestContext::new().await;
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(1),
        ctx.client.set("k", "v", None),
    )
    .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_concurrent_bounded_appends_can_exceed_bound() {
    let factory = Arc::new(YieldingFactory {
        backend: MemoryBackend::new(),
    });
    let client = KvClient::builder("127.0.0.1", 6379).build(factory);
    client.connect().await.unwrap();
    assert!(
        client
            .wait_for_state(ConnectionState::Ready, Duration::from_secs(2))
            .await
    );

    // Both appends observe an empty list before either pushes.
    let (first, second) = tokio::join!(
        client.set_list("bounded", "a", Some(1)),
        client.set_list("bounded", "b", Some(1)),
    );
    let mut lengths = vec![first.unwrap(), second.unwrap()];
    lengths.sort();
    assert_eq!(lengths, vec![1, 2]);
    let mut list = client.get_list("bounded").await.unwrap();
    list.sort();
    assert_eq!(list, vec![Bytes::from("a"), Bytes::from("b")]);

    // A later single append pops one head only; the overshoot stays.
    assert_eq!(client.set_list("bounded", "c", Some(1)).await.unwrap(), 2);
    let list = client.get_list("bounded").await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[1], Bytes::from("c"));
}
