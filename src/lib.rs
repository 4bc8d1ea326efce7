// src/lib.rs

pub mod config;
pub mod core;
pub mod supervisor;

// Re-export
pub use crate::core::{ClientError, KvClient};
