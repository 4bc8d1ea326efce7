// tests/integration/scenario_test.rs

//! End-to-end scenarios: connect, operate, batch, inspect metrics, disconnect.

use super::test_helpers::{SinkLevel, TestContext};
use bytes::Bytes;
use spineldb_client::core::batch::BatchDescriptor;
use spineldb_client::core::storage::MemoryBackend;
use spineldb_client::core::{ClientError, ConnectionState, LifecycleEvent, Reply};

// ===== Lifecycle =====

#[tokio::test]
async fn test_ready_signal_then_second_connect_is_noop() {
    let ctx = TestContext::with_backend(MemoryBackend::new().with_manual_ready());

    ctx.client.connect().await.unwrap();
    assert!(!ctx.client.is_ready());

    ctx.backend.emit(LifecycleEvent::Ready);
    assert!(ctx.wait_for(ConnectionState::Ready).await);
    assert!(ctx.client.is_ready());

    ctx.client.connect().await.unwrap();
    assert_eq!(ctx.backend.created(), 1);
}

#[tokio::test]
async fn test_disconnect_issues_quit() {
    let ctx = TestContext::new().await;
    ctx.client.set("k", "v", None).await.unwrap();
    ctx.client.disconnect().await.unwrap();

    assert_eq!(ctx.store_commands().last().map(String::as_str), Some("QUIT"));
    assert!(!ctx.client.is_ready());
    assert_eq!(
        ctx.client.get("k").await.unwrap_err(),
        ClientError::NotConnected
    );
}

#[tokio::test]
async fn test_reconnect_keeps_data() {
    let ctx = TestContext::new().await;
    ctx.client.set("persisted", "yes", None).await.unwrap();
    ctx.client.disconnect().await.unwrap();

    ctx.connect().await;
    assert_eq!(
        ctx.client.get("persisted").await.unwrap(),
        Some(Bytes::from("yes"))
    );
}

#[tokio::test]
async fn test_selected_database_is_used() {
    let backend = MemoryBackend::new();
    let store = backend.store();
    let ctx = TestContext::with_backend(backend);
    let other = spineldb_client::KvClient::builder("127.0.0.1", 6379)
        .database(5)
        .sink(ctx.sink.clone())
        .build(ctx.backend.clone());
    other.connect().await.unwrap();
    assert!(
        other
            .wait_for_state(ConnectionState::Ready, std::time::Duration::from_secs(2))
            .await
    );
    other.set("k", "v", None).await.unwrap();

    assert_eq!(store.dbsize(5), 1);
    assert_eq!(store.dbsize(0), 0);
    assert_eq!(ctx.sink.count_containing(SinkLevel::Log, "(db: 5)"), 1);
}

// ===== Data =====

#[tokio::test]
async fn test_age_increment_scenario() {
    let ctx = TestContext::new().await;
    ctx.client.set("age", 23, None).await.unwrap();
    ctx.client.increment("age").await.unwrap();
    assert_eq!(ctx.client.get("age").await.unwrap(), Some(Bytes::from("24")));
}

#[tokio::test]
async fn test_bounded_list_scenario() {
    let ctx = TestContext::new().await;
    ctx.client.set_list("mylist", "one", None).await.unwrap();
    ctx.client.set_list("mylist", "two", Some(1)).await.unwrap();
    let list = ctx.client.get_list("mylist").await.unwrap();
    assert_eq!(list, vec![Bytes::from("two")]);
}

#[tokio::test]
async fn test_unset_key_in_batch_scenario() {
    let ctx = TestContext::new().await;
    let results = ctx
        .client
        .batch(&[BatchDescriptor::new("get", "k1")])
        .await
        .unwrap();
    assert_eq!(results, vec![Reply::Null]);
}

#[tokio::test]
async fn test_crud_value_flow() {
    let ctx = TestContext::new().await;
    ctx.client.set("name", "first", Some(300)).await.unwrap();
    assert_eq!(ctx.client.get("name").await.unwrap(), Some(Bytes::from("first")));
    ctx.client.set("name", "second", None).await.unwrap();
    assert_eq!(ctx.client.get("name").await.unwrap(), Some(Bytes::from("second")));
    assert_eq!(ctx.client.get_ttl("name").await.unwrap(), -1);
    assert_eq!(ctx.client.delete("name").await.unwrap(), 1);
    assert_eq!(ctx.client.get("name").await.unwrap(), None);
}

#[tokio::test]
async fn test_crud_sorted_set_flow() {
    let ctx = TestContext::new().await;
    for (member, score) in [("low", 1.0), ("mid", 5.0), ("high", 9.0)] {
        ctx.client.add_sorted_set("scores", member, score).await.unwrap();
    }
    ctx.client
        .remove_sorted_set_by_score("scores", 0.0, 5.0)
        .await
        .unwrap();
    assert_eq!(
        ctx.client.get_sorted_set("scores").await.unwrap(),
        vec![Bytes::from("high")]
    );
    ctx.client.delete_sorted_set("scores", "high").await.unwrap();
    assert!(ctx.client.get_sorted_set("scores").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_crud_set_flow() {
    let ctx = TestContext::new().await;
    ctx.client.add_set("tags", "rust").await.unwrap();
    ctx.client.add_set("tags", "async").await.unwrap();
    let mut members = ctx.client.get_set("tags").await.unwrap();
    members.sort();
    assert_eq!(members, vec![Bytes::from("async"), Bytes::from("rust")]);

    let popped = ctx.client.pop_set("tags").await.unwrap().unwrap();
    assert!(popped == "async" || popped == "rust");
    assert_eq!(ctx.client.get_set("tags").await.unwrap().len(), 1);
}

// ===== Metrics =====

#[tokio::test]
async fn test_metrics_across_single_and_batch_paths() {
    let ctx = TestContext::new().await;
    ctx.client.set("a", "1", None).await.unwrap();
    ctx.client.set_list("l", "x", None).await.unwrap();
    let _ = ctx.client.get("l").await;
    ctx.client
        .batch(&[
            BatchDescriptor::new("get", "a"),
            BatchDescriptor::new("bogus", "a"),
        ])
        .await
        .unwrap();
    ctx.client.mget(&["a", "b", "c", "d"]).await.unwrap();

    let metrics = ctx.client.metrics();
    assert_eq!(metrics.operations, 3);
    assert_eq!(metrics.errors, 1);
    assert_eq!(metrics.error_rate, "33.33%");
    assert_eq!(metrics.pipeline_batches, 2);
    assert_eq!(metrics.pipeline_operations, 6);
    assert_eq!(metrics.pipeline_efficiency, "3.0");
    assert!(metrics.ready);

    ctx.client.reset_metrics();
    let metrics = ctx.client.metrics();
    assert_eq!(
        (
            metrics.operations,
            metrics.errors,
            metrics.pipeline_batches,
            metrics.pipeline_operations
        ),
        (0, 0, 0, 0)
    );
    assert_eq!(metrics.pipeline_efficiency, "0");
}

#[tokio::test]
async fn test_lifecycle_errors_count_towards_metrics() {
    let ctx = TestContext::new().await;
    ctx.backend.drop_connection();
    assert!(ctx.wait_for(ConnectionState::Degraded).await);
    let _ = ctx.client.get("k").await;

    let metrics = ctx.client.metrics();
    assert_eq!(metrics.operations, 1);
    assert_eq!(metrics.errors, 2);
    assert!(!metrics.ready);
    let text = ctx.client.encode_prometheus().unwrap();
    assert!(text.contains("spineldb_client_errors_total 2"));
    assert!(text.contains("spineldb_client_ready 0"));
}
