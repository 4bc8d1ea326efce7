// tests/property/batch_order_test.rs

//! Property-based tests for batch execution
//! Tests that results line up with the recognized descriptors, in input order

use crate::test_helpers::TestContext;
use bytes::Bytes;
use proptest::prelude::*;
use spineldb_client::core::Reply;
use spineldb_client::core::batch::{BatchDescriptor, Operation};

/// One step of a generated batch: a lookup of a pre-populated key, or a
/// descriptor that must be skipped.
#[derive(Debug, Clone)]
enum Step {
    Get(usize),
    Unknown(String),
    Malformed,
}

fn step_strategy(keys: usize) -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0..keys).prop_map(Step::Get),
        1 => prop::sample::select(vec!["hget", "publish", "rename", "lpush"])
            .prop_map(|c| Step::Unknown(c.to_string())),
        1 => Just(Step::Malformed),
    ]
}

fn descriptor(step: &Step) -> BatchDescriptor {
    match step {
        Step::Get(i) => BatchDescriptor::new("get", format!("key{i}")),
        Step::Unknown(command) => BatchDescriptor::new(command.as_str(), "key0"),
        Step::Malformed => BatchDescriptor::new("zadd", "z").with_value("no-score"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_results_follow_recognized_descriptors_in_order(
        steps in prop::collection::vec(step_strategy(8), 1..=40)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = TestContext::new().await;
            for i in 0..8 {
                ctx.client.set(&format!("key{i}"), format!("value{i}"), None).await.unwrap();
            }

            let descriptors: Vec<_> = steps.iter().map(descriptor).collect();
            let results = ctx.client.batch(&descriptors).await.unwrap();

            let expected: Vec<Reply> = steps
                .iter()
                .filter_map(|step| match step {
                    Step::Get(i) => Some(Reply::BulkString(Bytes::from(format!("value{i}")))),
                    _ => None,
                })
                .collect();
            assert_eq!(results, expected);

            let metrics = ctx.client.metrics();
            assert_eq!(metrics.pipeline_operations, steps.len() as u64);
            assert_eq!(metrics.pipeline_batches, 1);
        });
    }

    #[test]
    fn test_result_count_equals_recognized_count(
        commands in prop::collection::vec(
            prop::sample::select(vec![
                "get", "set", "del", "zadd", "zrem", "zrange", "ttl", "expire",
                "GET", "delete", "incr", "keys", "",
            ]),
            0..=30
        )
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = TestContext::new().await;
            let descriptors: Vec<_> = commands
                .iter()
                .map(|c| {
                    BatchDescriptor::new(*c, "k")
                        .with_value("v")
                        .with_score(1.0)
                        .with_seconds(10)
                })
                .collect();
            let recognized = descriptors
                .iter()
                .filter(|d| Operation::try_from(*d).is_ok())
                .count();

            let results = ctx.client.batch(&descriptors).await.unwrap();
            assert_eq!(results.len(), recognized);
            if descriptors.is_empty() {
                assert!(ctx.store_commands().is_empty());
            }
        });
    }
}
