// src/core/storage/mod.rs

//! An in-memory store that stands in for a remote server.

pub mod backend;
pub mod memory;
pub mod zset;

pub use backend::{MemoryBackend, MemoryCapability};
pub use memory::{COMMAND_LOG_CAPACITY, MemoryStore};
pub use zset::SortedSet;
