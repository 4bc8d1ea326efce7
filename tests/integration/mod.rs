// tests/integration/mod.rs

//! Integration tests module

pub mod concurrency_test;
pub mod scenario_test;
pub mod test_helpers;
