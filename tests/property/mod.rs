// tests/property/mod.rs

//! Property-based tests for the client facade
//!
//! These tests use property-based testing to verify invariants and properties
//! that should always hold, regardless of input values.

pub mod batch_order_test;
pub mod metrics_format_test;
