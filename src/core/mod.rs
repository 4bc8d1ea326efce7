// src/core/mod.rs

//! The central module containing the client facade and its building blocks.

pub mod batch;
pub mod capability;
pub mod client;
pub mod commands;
pub mod connection;
pub mod dispatch;
pub mod errors;
pub mod metrics;
pub mod retry;
pub mod sink;
pub mod storage;
pub mod value;

pub use batch::{BatchDescriptor, Operation};
pub use capability::{CapabilityFactory, ConnectParams, Credential, LifecycleEvent, StoreCapability};
pub use client::{ClientOptions, KvClient, KvClientBuilder};
pub use commands::Command;
pub use connection::{Connection, ConnectionState};
pub use errors::ClientError;
pub use metrics::MetricsSnapshot;
pub use retry::{RetryDecision, RetryPolicy};
pub use value::{Reply, SetValue};
