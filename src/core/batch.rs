// src/core/batch.rs

//! Pipelined execution of heterogeneous operations.
//!
//! A batch is translated into one [`AtomicBatch`] and submitted in a single
//! round trip. Results come back in input order, one per recognized operation.
//! Descriptors naming an unknown command, or lacking a field their command
//! needs, are skipped with a warning and produce no result entry.

use crate::core::capability::{AtomicBatch, StoreCapability};
use crate::core::client::KvClient;
use crate::core::commands::Command;
use crate::core::value::Reply;
use crate::core::ClientError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// The wire shape of a batch operation, as accepted from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchDescriptor {
    pub command: String,
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
}

impl BatchDescriptor {
    pub fn new(command: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_expiry(mut self, seconds: u64) -> Self {
        self.expiry = Some(seconds);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_range(mut self, start: i64, stop: i64) -> Self {
        self.start = Some(start);
        self.stop = Some(stop);
        self
    }

    pub fn with_seconds(mut self, seconds: u64) -> Self {
        self.seconds = Some(seconds);
        self
    }

    fn malformed(&self, reason: &str) -> ClientError {
        ClientError::MalformedDescriptor {
            command: self.command.clone(),
            reason: reason.to_string(),
        }
    }

    fn require_value(&self) -> Result<Bytes, ClientError> {
        match &self.value {
            Some(serde_json::Value::String(s)) => Ok(Bytes::from(s.clone())),
            Some(serde_json::Value::Null) | None => Err(self.malformed("missing 'value'")),
            Some(other) => Ok(Bytes::from(serde_json::to_vec(other)?)),
        }
    }
}

/// A recognized batch operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Get { key: String },
    Set {
        key: String,
        value: Bytes,
        expiry: Option<u64>,
    },
    Delete { key: String },
    SortedSetAdd {
        key: String,
        score: f64,
        member: Bytes,
    },
    SortedSetRemove { key: String, member: Bytes },
    SortedSetRange { key: String, start: i64, stop: i64 },
    Ttl { key: String },
    Expire { key: String, seconds: u64 },
}

impl TryFrom<&BatchDescriptor> for Operation {
    type Error = ClientError;

    fn try_from(d: &BatchDescriptor) -> Result<Self, Self::Error> {
        let key = d.key.clone();
        let op = match d.command.to_ascii_lowercase().as_str() {
            "get" => Operation::Get { key },
            "set" => Operation::Set {
                key,
                value: d.require_value()?,
                expiry: d.expiry.filter(|seconds| *seconds > 0),
            },
            "del" | "delete" => Operation::Delete { key },
            "zadd" | "sorted-set-add" => Operation::SortedSetAdd {
                key,
                score: d.score.ok_or_else(|| d.malformed("missing 'score'"))?,
                member: d.require_value()?,
            },
            "zrem" | "sorted-set-remove" => Operation::SortedSetRemove {
                key,
                member: d.require_value()?,
            },
            "zrange" | "sorted-set-range" => Operation::SortedSetRange {
                key,
                start: d.start.unwrap_or(0),
                stop: d.stop.unwrap_or(-1),
            },
            "ttl" | "time-to-live" => Operation::Ttl { key },
            "expire" => Operation::Expire {
                key,
                seconds: d.seconds.ok_or_else(|| d.malformed("missing 'seconds'"))?,
            },
            _ => return Err(ClientError::UnknownCommand(d.command.clone())),
        };
        if op.key().is_empty() {
            return Err(d.malformed("missing 'key'"));
        }
        Ok(op)
    }
}

impl Operation {
    pub fn key(&self) -> &str {
        match self {
            Operation::Get { key }
            | Operation::Set { key, .. }
            | Operation::Delete { key }
            | Operation::SortedSetAdd { key, .. }
            | Operation::SortedSetRemove { key, .. }
            | Operation::SortedSetRange { key, .. }
            | Operation::Ttl { key }
            | Operation::Expire { key, .. } => key,
        }
    }
}

impl From<Operation> for Command {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Get { key } => Command::Get { key },
            Operation::Set { key, value, expiry } => Command::Set {
                key,
                value: Some(value),
                expiry,
            },
            Operation::Delete { key } => Command::Del { key },
            Operation::SortedSetAdd { key, score, member } => {
                Command::ZAdd { key, score, member }
            }
            Operation::SortedSetRemove { key, member } => Command::ZRem { key, member },
            Operation::SortedSetRange { key, start, stop } => {
                Command::ZRange { key, start, stop }
            }
            Operation::Ttl { key } => Command::Ttl { key },
            Operation::Expire { key, seconds } => Command::Expire { key, seconds },
        }
    }
}

impl KvClient {
    /// Executes `descriptors` in one atomic round trip.
    ///
    /// Fails with `NotReady` without touching the store unless the connection
    /// is `Ready`. On success the batch counts once, with every submitted
    /// descriptor counted as a pipeline operation, skipped ones included.
    pub async fn batch(&self, descriptors: &[BatchDescriptor]) -> Result<Vec<Reply>, ClientError> {
        let capability = self.batch_capability()?;
        if descriptors.is_empty() {
            return Ok(Vec::new());
        }
        let operations = descriptors
            .iter()
            .filter_map(|descriptor| match Operation::try_from(descriptor) {
                Ok(op) => Some(op),
                Err(e) => {
                    self.sink
                        .warn(&format!("Skipping batch operation: {e}"));
                    None
                }
            })
            .collect();
        self.submit(capability, descriptors.len(), operations).await
    }

    /// Executes already-typed operations in one atomic round trip.
    pub async fn batch_ops(&self, operations: Vec<Operation>) -> Result<Vec<Reply>, ClientError> {
        let capability = self.batch_capability()?;
        if operations.is_empty() {
            return Ok(Vec::new());
        }
        let submitted = operations.len();
        self.submit(capability, submitted, operations).await
    }

    /// Fetches several keys in one round trip; missing keys yield `Reply::Null`.
    pub async fn mget<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<Reply>, ClientError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let descriptors: Vec<_> = keys
            .iter()
            .map(|key| BatchDescriptor::new("get", key.as_ref()))
            .collect();
        self.batch(&descriptors).await
    }

    /// Stores several pairs in one round trip, all with the same expiry.
    pub async fn mset<K, V>(
        &self,
        pairs: &[(K, V)],
        expiry: Option<u64>,
    ) -> Result<Vec<Reply>, ClientError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let descriptors: Vec<_> = pairs
            .iter()
            .map(|(key, value)| {
                let descriptor = BatchDescriptor::new("set", key.as_ref()).with_value(value.as_ref());
                match expiry {
                    Some(seconds) => descriptor.with_expiry(seconds),
                    None => descriptor,
                }
            })
            .collect();
        self.batch(&descriptors).await
    }

    /// Deletes several keys in one round trip.
    pub async fn mdel<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<Reply>, ClientError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let descriptors: Vec<_> = keys
            .iter()
            .map(|key| BatchDescriptor::new("del", key.as_ref()))
            .collect();
        self.batch(&descriptors).await
    }

    fn batch_capability(&self) -> Result<Arc<dyn StoreCapability>, ClientError> {
        self.connection.ready_capability().inspect_err(|e| {
            self.sink.error(&format!("Batch rejected: {e}"));
        })
    }

    async fn submit(
        &self,
        capability: Arc<dyn StoreCapability>,
        submitted: usize,
        operations: Vec<Operation>,
    ) -> Result<Vec<Reply>, ClientError> {
        if submitted > self.options.max_pipeline_ops {
            self.sink.warn(&format!(
                "Batch of {submitted} operations exceeds max_pipeline_ops ({})",
                self.options.max_pipeline_ops
            ));
        }
        if operations.is_empty() {
            debug!("Every batch operation was skipped; nothing to submit");
            self.metrics.record_batch(submitted);
            return Ok(Vec::new());
        }

        let mut batch = AtomicBatch::with_capacity(operations.len());
        for op in operations {
            batch.push(op.into());
        }
        let expected = batch.len();

        let outcome = match capability.exec(batch).await {
            Ok(replies) if replies.len() == expected => Ok(replies),
            Ok(replies) => Err(ClientError::UnexpectedReply {
                command: "EXEC".into(),
                reply: format!("{} results for {expected} commands", replies.len()),
            }),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(replies) => {
                self.metrics.record_batch(submitted);
                debug!("Batch of {expected} commands executed");
                Ok(replies)
            }
            Err(e) => {
                self.metrics.record_error();
                self.sink.error(&format!("Batch execution failed: {e}"));
                Err(e)
            }
        }
    }
}
