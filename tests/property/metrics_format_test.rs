// tests/property/metrics_format_test.rs

//! Property-based tests for the derived metrics strings

use proptest::prelude::*;
use spineldb_client::core::metrics::{Metrics, format_error_rate, format_pipeline_efficiency};

proptest! {
    #[test]
    fn test_error_rate_has_two_decimals(ops in 1u64..10_000, errors_pct in 0u64..=100) {
        let errors = ops * errors_pct / 100;
        let rate = format_error_rate(errors, ops);
        prop_assert!(rate.ends_with('%'));
        let number = rate.trim_end_matches('%');
        let (_, decimals) = number.split_once('.').expect("decimal point");
        prop_assert_eq!(decimals.len(), 2);
        let parsed: f64 = number.parse().unwrap();
        let exact = errors as f64 / ops as f64 * 100.0;
        prop_assert!((parsed - exact).abs() <= 0.005 + 1e-9);
    }

    #[test]
    fn test_efficiency_has_one_decimal(batches in 1u64..1_000, ops in 0u64..100_000) {
        let efficiency = format_pipeline_efficiency(ops, batches);
        let (_, decimals) = efficiency.split_once('.').expect("decimal point");
        prop_assert_eq!(decimals.len(), 1);
        let parsed: f64 = efficiency.parse().unwrap();
        prop_assert!((parsed - ops as f64 / batches as f64).abs() <= 0.05 + 1e-9);
    }

    #[test]
    fn test_zero_denominators_are_exact(errors in 0u64..1_000, ops in 0u64..1_000) {
        prop_assert_eq!(format_error_rate(errors, 0), "0%");
        prop_assert_eq!(format_pipeline_efficiency(ops, 0), "0");
    }

    #[test]
    fn test_snapshot_matches_recorded_activity(
        ops in 0u64..300,
        failed in 0u64..300,
        batch_sizes in prop::collection::vec(0usize..50, 0..20)
    ) {
        let failed = failed.min(ops);
        let metrics = Metrics::new();
        for _ in 0..ops {
            metrics.record_operation();
        }
        for _ in 0..failed {
            metrics.record_error();
        }
        for size in &batch_sizes {
            metrics.record_batch(*size);
        }

        let snapshot = metrics.snapshot(false);
        let total: u64 = batch_sizes.iter().map(|s| *s as u64).sum();
        prop_assert_eq!(snapshot.operations, ops);
        prop_assert_eq!(snapshot.errors, failed);
        prop_assert_eq!(snapshot.pipeline_operations, total);
        prop_assert_eq!(snapshot.pipeline_batches, batch_sizes.len() as u64);
        prop_assert_eq!(snapshot.error_rate, format_error_rate(failed, ops));
        prop_assert_eq!(
            snapshot.pipeline_efficiency,
            format_pipeline_efficiency(total, batch_sizes.len() as u64)
        );

        metrics.reset();
        let snapshot = metrics.snapshot(false);
        prop_assert_eq!(
            (snapshot.operations, snapshot.errors, snapshot.pipeline_operations, snapshot.pipeline_batches),
            (0, 0, 0, 0)
        );
    }
}
