// src/core/metrics.rs

//! Aggregated counters for single operations, pipelined batches and errors.
//!
//! Each client owns one `Metrics` instance backed by its own Prometheus
//! registry, so several clients in one process never collide on metric names.
//! Prometheus counters are atomic, which makes the aggregator safe to share
//! between concurrently in-flight calls.

use crate::core::ClientError;
use prometheus::{IntCounter, IntGauge, Registry, TextEncoder};
use serde::{Deserialize, Serialize};

/// A point-in-time view of the aggregated counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub operations: u64,
    pub pipeline_operations: u64,
    pub pipeline_batches: u64,
    pub errors: u64,
    pub ready: bool,
    /// `errors / operations` as a percentage with two decimals, or `"0%"`.
    pub error_rate: String,
    /// `pipeline_operations / pipeline_batches` with one decimal, or `"0"`.
    pub pipeline_efficiency: String,
}

/// The metrics aggregator shared by the dispatcher, the batch executor and the
/// connection state machine.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    operations: IntCounter,
    pipeline_operations: IntCounter,
    pipeline_batches: IntCounter,
    errors: IntCounter,
    ready: IntGauge,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("operations", &self.operations())
            .field("pipeline_operations", &self.pipeline_operations())
            .field("pipeline_batches", &self.pipeline_batches())
            .field("errors", &self.errors())
            .field("ready", &self.ready.get())
            .finish()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let operations = register_counter(
            &registry,
            "spineldb_client_operations_total",
            "Total number of single-operation calls.",
        );
        let pipeline_operations = register_counter(
            &registry,
            "spineldb_client_pipeline_operations_total",
            "Total number of operations submitted across all batches.",
        );
        let pipeline_batches = register_counter(
            &registry,
            "spineldb_client_pipeline_batches_total",
            "Total number of successful batch calls.",
        );
        let errors = register_counter(
            &registry,
            "spineldb_client_errors_total",
            "Total number of failed calls and connection errors.",
        );
        let ready = IntGauge::new(
            "spineldb_client_ready",
            "Connection readiness (1 for ready, 0 otherwise).",
        )
        .expect("static gauge definition is valid");
        registry
            .register(Box::new(ready.clone()))
            .expect("gauge registered once in a fresh registry");

        Self {
            registry,
            operations,
            pipeline_operations,
            pipeline_batches,
            errors,
            ready,
        }
    }

    /// Counts one single-operation call, whatever its outcome.
    pub fn record_operation(&self) {
        self.operations.inc();
    }

    /// Counts one successful batch of `submitted` operations.
    pub fn record_batch(&self, submitted: usize) {
        self.pipeline_batches.inc();
        self.pipeline_operations.inc_by(submitted as u64);
    }

    pub fn record_error(&self) {
        self.errors.inc();
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.set(i64::from(ready));
    }

    /// Zeroes the four aggregate counters. The readiness gauge is left alone.
    pub fn reset(&self) {
        self.operations.reset();
        self.pipeline_operations.reset();
        self.pipeline_batches.reset();
        self.errors.reset();
    }

    pub fn operations(&self) -> u64 {
        self.operations.get()
    }

    pub fn pipeline_operations(&self) -> u64 {
        self.pipeline_operations.get()
    }

    pub fn pipeline_batches(&self) -> u64 {
        self.pipeline_batches.get()
    }

    pub fn errors(&self) -> u64 {
        self.errors.get()
    }

    /// Builds a snapshot, computing the derived rates.
    pub fn snapshot(&self, ready: bool) -> MetricsSnapshot {
        let operations = self.operations();
        let pipeline_operations = self.pipeline_operations();
        let pipeline_batches = self.pipeline_batches();
        let errors = self.errors();
        MetricsSnapshot {
            operations,
            pipeline_operations,
            pipeline_batches,
            errors,
            ready,
            error_rate: format_error_rate(errors, operations),
            pipeline_efficiency: format_pipeline_efficiency(pipeline_operations, pipeline_batches),
        }
    }

    /// Encodes the counters in the Prometheus text format.
    pub fn encode_prometheus(&self) -> Result<String, ClientError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        Ok(encoder.encode_to_string(&metric_families)?)
    }
}

fn register_counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("static counter definition is valid");
    registry
        .register(Box::new(counter.clone()))
        .expect("counter registered once in a fresh registry");
    counter
}

/// Formats `errors / operations` as a percentage, `"0%"` when nothing ran.
pub fn format_error_rate(errors: u64, operations: u64) -> String {
    if operations == 0 {
        return "0%".to_string();
    }
    format!("{:.2}%", errors as f64 / operations as f64 * 100.0)
}

/// Formats the average batch size, `"0"` when no batch ran.
pub fn format_pipeline_efficiency(pipeline_operations: u64, pipeline_batches: u64) -> String {
    if pipeline_batches == 0 {
        return "0".to_string();
    }
    format!("{:.1}", pipeline_operations as f64 / pipeline_batches as f64)
}
