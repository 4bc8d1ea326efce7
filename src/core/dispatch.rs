// src/core/dispatch.rs

//! Typed single-key operations on [`KvClient`].
//!
//! Every method counts exactly one operation. Readiness is not pre-checked:
//! the call goes to whatever capability the connection holds and the store's
//! own failure is surfaced. A failure is logged once through the sink, counted
//! as an error and returned to the caller.

use crate::core::client::KvClient;
use crate::core::commands::{Command, ScoreBoundary};
use crate::core::value::{Reply, SerializeOutcome, SetValue, serialize_value};
use crate::core::ClientError;
use bytes::Bytes;
use serde::Serialize;
use std::future::Future;
use tracing::debug;

impl KvClient {
    /// Wraps one logical operation with the counting and logging contract.
    async fn observe<T, F>(&self, label: &str, call: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        self.metrics.record_operation();
        match call.await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.metrics.record_error();
                self.sink.error(&format!("{label} failed: {e}"));
                Err(e)
            }
        }
    }

    async fn execute(&self, command: Command) -> Result<Reply, ClientError> {
        let capability = self.connection.capability()?;
        debug!("Dispatching {command}");
        capability.execute(command).await
    }

    async fn dispatch<T>(
        &self,
        command: Command,
        decode: impl FnOnce(Reply, &str) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let label = command.to_string();
        let name = command.name();
        self.observe(&label, async move {
            let reply = self.execute(command).await?;
            decode(reply, name)
        })
        .await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, ClientError> {
        self.dispatch(Command::Get { key: key.into() }, Reply::into_optional_bytes)
            .await
    }

    /// Stores `value` under `key`, optionally expiring after `expiry` seconds.
    ///
    /// Structured values are JSON-encoded first. If encoding fails the problem
    /// is logged and the call proceeds without a value: with an expiry only
    /// `EXPIRE` is issued, otherwise the store rejects the bare `SET`.
    /// `Some(0)` means no expiry.
    pub async fn set(
        &self,
        key: &str,
        value: impl Into<SetValue>,
        expiry: Option<u64>,
    ) -> Result<Reply, ClientError> {
        let value = match value.into() {
            SetValue::Text(bytes) => Some(bytes),
            SetValue::Structured(serde_json::Value::String(s)) => Some(Bytes::from(s)),
            SetValue::Structured(structured) => self.encode(key, serialize_value(&structured)),
        };
        self.store_value(key, value, expiry).await
    }

    /// Like [`KvClient::set`], for any serializable value.
    pub async fn set_serialized<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expiry: Option<u64>,
    ) -> Result<Reply, ClientError> {
        let value = self.encode(key, serialize_value(value));
        self.store_value(key, value, expiry).await
    }

    fn encode(&self, key: &str, outcome: SerializeOutcome) -> Option<Bytes> {
        if let SerializeOutcome::Degraded(e) = &outcome {
            self.sink
                .warn(&format!("Could not serialize value for '{key}': {e}"));
        }
        outcome.into_value()
    }

    async fn store_value(
        &self,
        key: &str,
        value: Option<Bytes>,
        expiry: Option<u64>,
    ) -> Result<Reply, ClientError> {
        let expiry = expiry.filter(|seconds| *seconds > 0);
        let command = match (value, expiry) {
            (None, Some(seconds)) => Command::Expire {
                key: key.into(),
                seconds,
            },
            (value, expiry) => Command::Set {
                key: key.into(),
                value,
                expiry,
            },
        };
        self.dispatch(command, |reply, _| match reply {
            Reply::Error(e) => Err(ClientError::Command(e)),
            reply => Ok(reply),
        })
        .await
    }

    pub async fn delete(&self, key: &str) -> Result<i64, ClientError> {
        self.dispatch(Command::Del { key: key.into() }, Reply::into_integer)
            .await
    }

    pub async fn get_list(&self, key: &str) -> Result<Vec<Bytes>, ClientError> {
        self.dispatch(
            Command::LRange {
                key: key.into(),
                start: 0,
                stop: -1,
            },
            Reply::into_bytes_vec,
        )
        .await
    }

    /// Appends `value` to the list at `key`, returning the new length.
    ///
    /// With `max_len`, the head is popped first when the list already holds
    /// `max_len` items. The length check, the pop and the push are separate
    /// round trips, so concurrent appenders can briefly push the list past
    /// its bound.
    pub async fn set_list(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        max_len: Option<usize>,
    ) -> Result<i64, ClientError> {
        let value = value.into();
        self.observe(&format!("RPUSH {key}"), async {
            if let Some(max_len) = max_len {
                let len = self
                    .execute(Command::LLen { key: key.into() })
                    .await?
                    .into_integer("LLEN")?;
                if len >= i64::try_from(max_len).unwrap_or(i64::MAX) {
                    self.execute(Command::LPop { key: key.into() })
                        .await?
                        .into_optional_bytes("LPOP")?;
                }
            }
            self.execute(Command::RPush {
                key: key.into(),
                value,
            })
            .await?
            .into_integer("RPUSH")
        })
        .await
    }

    pub async fn pop_list(&self, key: &str) -> Result<Option<Bytes>, ClientError> {
        self.dispatch(Command::LPop { key: key.into() }, Reply::into_optional_bytes)
            .await
    }

    pub async fn trim_list(&self, key: &str, start: i64, stop: i64) -> Result<(), ClientError> {
        self.dispatch(
            Command::LTrim {
                key: key.into(),
                start,
                stop,
            },
            Reply::into_status,
        )
        .await
    }

    /// Removes up to `count` occurrences of `value` (`0` removes all, a
    /// negative count scans from the tail).
    pub async fn delete_list(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        count: i64,
    ) -> Result<i64, ClientError> {
        self.dispatch(
            Command::LRem {
                key: key.into(),
                count,
                value: value.into(),
            },
            Reply::into_integer,
        )
        .await
    }

    pub async fn get_sorted_set(&self, key: &str) -> Result<Vec<Bytes>, ClientError> {
        self.dispatch(
            Command::ZRange {
                key: key.into(),
                start: 0,
                stop: -1,
            },
            Reply::into_bytes_vec,
        )
        .await
    }

    pub async fn add_sorted_set(
        &self,
        key: &str,
        member: impl Into<Bytes>,
        score: f64,
    ) -> Result<i64, ClientError> {
        self.dispatch(
            Command::ZAdd {
                key: key.into(),
                score,
                member: member.into(),
            },
            Reply::into_integer,
        )
        .await
    }

    pub async fn delete_sorted_set(
        &self,
        key: &str,
        member: impl Into<Bytes>,
    ) -> Result<i64, ClientError> {
        self.dispatch(
            Command::ZRem {
                key: key.into(),
                member: member.into(),
            },
            Reply::into_integer,
        )
        .await
    }

    pub async fn remove_sorted_set_by_score(
        &self,
        key: &str,
        min: impl Into<ScoreBoundary>,
        max: impl Into<ScoreBoundary>,
    ) -> Result<i64, ClientError> {
        self.dispatch(
            Command::ZRemRangeByScore {
                key: key.into(),
                min: min.into(),
                max: max.into(),
            },
            Reply::into_integer,
        )
        .await
    }

    pub async fn add_set(&self, key: &str, member: impl Into<Bytes>) -> Result<i64, ClientError> {
        self.dispatch(
            Command::SAdd {
                key: key.into(),
                member: member.into(),
            },
            Reply::into_integer,
        )
        .await
    }

    pub async fn get_set(&self, key: &str) -> Result<Vec<Bytes>, ClientError> {
        self.dispatch(Command::SMembers { key: key.into() }, Reply::into_bytes_vec)
            .await
    }

    pub async fn pop_set(&self, key: &str) -> Result<Option<Bytes>, ClientError> {
        self.dispatch(Command::SPop { key: key.into() }, Reply::into_optional_bytes)
            .await
    }

    pub async fn delete_set(
        &self,
        key: &str,
        member: impl Into<Bytes>,
    ) -> Result<i64, ClientError> {
        self.dispatch(
            Command::SRem {
                key: key.into(),
                member: member.into(),
            },
            Reply::into_integer,
        )
        .await
    }

    pub async fn increment(&self, key: &str) -> Result<i64, ClientError> {
        self.dispatch(Command::Incr { key: key.into() }, Reply::into_integer)
            .await
    }

    pub async fn decrement(&self, key: &str) -> Result<i64, ClientError> {
        self.dispatch(Command::Decr { key: key.into() }, Reply::into_integer)
            .await
    }

    /// Remaining time to live in seconds; `-1` without expiry, `-2` when the
    /// key does not exist.
    pub async fn get_ttl(&self, key: &str) -> Result<i64, ClientError> {
        self.dispatch(Command::Ttl { key: key.into() }, Reply::into_integer)
            .await
    }

    /// Sets a timeout on `key`. Returns `false` if the key does not exist.
    pub async fn expire(&self, key: &str, seconds: u64) -> Result<bool, ClientError> {
        self.dispatch(
            Command::Expire {
                key: key.into(),
                seconds,
            },
            |reply, name| Ok(reply.into_integer(name)? == 1),
        )
        .await
    }

    /// Removes every key of the selected database.
    pub async fn delete_all(&self) -> Result<(), ClientError> {
        self.dispatch(Command::FlushDb, Reply::into_status).await
    }
}
