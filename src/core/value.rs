// src/core/value.rs

//! Value types exchanged with the store capability.

use crate::core::ClientError;
use bytes::Bytes;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A reply produced by the store for a single command.
///
/// Per-item errors inside an atomic batch are carried as `Reply::Error`; a
/// failed single command is an `Err(ClientError)` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    SimpleString(String),
    BulkString(Bytes),
    Integer(i64),
    Array(Vec<Reply>),
    /// The store's "no value" sentinel.
    Null,
    Error(String),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::SimpleString("OK".into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Reply::Null)
    }

    /// Interprets the reply as an optional bulk value (`GET`, `LPOP`, `SPOP`).
    pub fn into_optional_bytes(self, command: &str) -> Result<Option<Bytes>, ClientError> {
        match self {
            Reply::BulkString(b) => Ok(Some(b)),
            Reply::SimpleString(s) => Ok(Some(Bytes::from(s))),
            Reply::Null => Ok(None),
            Reply::Error(e) => Err(ClientError::Command(e)),
            other => Err(unexpected(command, &other)),
        }
    }

    /// Interprets the reply as an integer (`DEL`, `INCR`, `TTL`, ...).
    pub fn into_integer(self, command: &str) -> Result<i64, ClientError> {
        match self {
            Reply::Integer(i) => Ok(i),
            Reply::Error(e) => Err(ClientError::Command(e)),
            other => Err(unexpected(command, &other)),
        }
    }

    /// Interprets the reply as an array of bulk values (`LRANGE`, `SMEMBERS`, ...).
    pub fn into_bytes_vec(self, command: &str) -> Result<Vec<Bytes>, ClientError> {
        match self {
            Reply::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Reply::BulkString(b) => Ok(b),
                    Reply::SimpleString(s) => Ok(Bytes::from(s)),
                    other => Err(unexpected(command, &other)),
                })
                .collect(),
            Reply::Null => Ok(Vec::new()),
            Reply::Error(e) => Err(ClientError::Command(e)),
            other => Err(unexpected(command, &other)),
        }
    }

    /// Interprets the reply as a status acknowledgement (`LTRIM`, `FLUSHDB`).
    pub fn into_status(self, command: &str) -> Result<(), ClientError> {
        match self {
            Reply::SimpleString(_) => Ok(()),
            Reply::Error(e) => Err(ClientError::Command(e)),
            other => Err(unexpected(command, &other)),
        }
    }
}

fn unexpected(command: &str, reply: &Reply) -> ClientError {
    ClientError::UnexpectedReply {
        command: command.to_string(),
        reply: format!("{reply:?}"),
    }
}

impl Serialize for Reply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Reply::SimpleString(s) => serializer.serialize_str(s),
            Reply::BulkString(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            Reply::Integer(i) => serializer.serialize_i64(*i),
            Reply::Null => serializer.serialize_none(),
            Reply::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Reply::Error(e) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", e)?;
                map.end()
            }
        }
    }
}

/// A value handed to `set`.
///
/// Scalars are stored as their string form; `Structured` values go through
/// the fallible JSON serialization step first.
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    Text(Bytes),
    Structured(serde_json::Value),
}

impl From<&str> for SetValue {
    fn from(s: &str) -> Self {
        SetValue::Text(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for SetValue {
    fn from(s: String) -> Self {
        SetValue::Text(Bytes::from(s))
    }
}

impl From<Bytes> for SetValue {
    fn from(b: Bytes) -> Self {
        SetValue::Text(b)
    }
}

impl From<Vec<u8>> for SetValue {
    fn from(v: Vec<u8>) -> Self {
        SetValue::Text(Bytes::from(v))
    }
}

impl From<serde_json::Value> for SetValue {
    fn from(v: serde_json::Value) -> Self {
        SetValue::Structured(v)
    }
}

macro_rules! set_value_from_display {
    ($($t:ty),*) => {
        $(
            impl From<$t> for SetValue {
                fn from(v: $t) -> Self {
                    SetValue::Text(Bytes::from(v.to_string()))
                }
            }
        )*
    };
}

set_value_from_display!(i32, i64, u32, u64, usize, f64);

/// The outcome of turning a structured value into its transport string.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializeOutcome {
    Encoded(Bytes),
    /// Serialization failed; the caller proceeds with an absent value.
    Degraded(ClientError),
}

impl SerializeOutcome {
    pub fn into_value(self) -> Option<Bytes> {
        match self {
            SerializeOutcome::Encoded(b) => Some(b),
            SerializeOutcome::Degraded(_) => None,
        }
    }
}

/// Serializes `value` to JSON without ever failing the caller.
pub fn serialize_value<T: Serialize + ?Sized>(value: &T) -> SerializeOutcome {
    match serde_json::to_vec(value) {
        Ok(encoded) => SerializeOutcome::Encoded(Bytes::from(encoded)),
        Err(e) => SerializeOutcome::Degraded(e.into()),
    }
}
