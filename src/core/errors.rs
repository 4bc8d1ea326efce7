// src/core/errors.rs

//! Defines the primary error type for the client facade.

use std::num::ParseIntError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The main error enum, covering connection, readiness, command and
/// serialization failures.
///
/// Connection-lifecycle errors are absorbed into state transitions by the
/// connection state machine; everything else is re-signaled to the caller.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Retry time exhausted after {elapsed:?}")]
    RetryTimeExhausted { elapsed: Duration },

    #[error("Retry attempts exhausted after {attempts} attempts: {last_error}")]
    RetryAttemptsExhausted { attempts: u32, last_error: String },

    /// The batch executor was invoked while the connection is not `Ready`.
    #[error("Store not ready")]
    NotReady,

    /// No capability has been established (never connected, or disconnected).
    #[error("Store connection not established")]
    NotConnected,

    /// An error reply from the store, surfaced verbatim.
    #[error("{0}")]
    Command(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("Value is not an integer or out of range")]
    NotAnInteger,

    #[error("Unexpected reply to '{command}': {reply}")]
    UnexpectedReply { command: String, reply: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Malformed '{command}' descriptor: {reason}")]
    MalformedDescriptor { command: String, reason: String },

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Internal Client Error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Returns `true` when the error is a refused TCP connection.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            ClientError::Io(e) => e.kind() == std::io::ErrorKind::ConnectionRefused,
            ClientError::Connection(msg) => msg.contains("ECONNREFUSED"),
            _ => false,
        }
    }

    /// Returns `true` for failures that belong to the connection lifecycle
    /// rather than to a single command.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Connection(_)
                | ClientError::RetryTimeExhausted { .. }
                | ClientError::RetryAttemptsExhausted { .. }
        )
    }
}

impl PartialEq for ClientError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ClientError::Io(e1), ClientError::Io(e2)) => {
                e1.kind() == e2.kind() && e1.to_string() == e2.to_string()
            }
            (ClientError::Connection(s1), ClientError::Connection(s2)) => s1 == s2,
            (
                ClientError::RetryTimeExhausted { elapsed: e1 },
                ClientError::RetryTimeExhausted { elapsed: e2 },
            ) => e1 == e2,
            (
                ClientError::RetryAttemptsExhausted {
                    attempts: a1,
                    last_error: l1,
                },
                ClientError::RetryAttemptsExhausted {
                    attempts: a2,
                    last_error: l2,
                },
            ) => a1 == a2 && l1 == l2,
            (ClientError::Command(s1), ClientError::Command(s2)) => s1 == s2,
            (
                ClientError::UnexpectedReply {
                    command: c1,
                    reply: r1,
                },
                ClientError::UnexpectedReply {
                    command: c2,
                    reply: r2,
                },
            ) => c1 == c2 && r1 == r2,
            (ClientError::Serialization(s1), ClientError::Serialization(s2)) => s1 == s2,
            (ClientError::UnknownCommand(s1), ClientError::UnknownCommand(s2)) => s1 == s2,
            (
                ClientError::MalformedDescriptor {
                    command: c1,
                    reason: r1,
                },
                ClientError::MalformedDescriptor {
                    command: c2,
                    reason: r2,
                },
            ) => c1 == c2 && r1 == r2,
            (ClientError::Metrics(s1), ClientError::Metrics(s2)) => s1 == s2,
            (ClientError::Internal(s1), ClientError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}

impl From<ParseIntError> for ClientError {
    fn from(_: ParseIntError) -> Self {
        ClientError::NotAnInteger
    }
}

impl From<std::str::Utf8Error> for ClientError {
    fn from(_: std::str::Utf8Error) -> Self {
        ClientError::WrongType
    }
}

impl From<prometheus::Error> for ClientError {
    fn from(e: prometheus::Error) -> Self {
        ClientError::Metrics(e.to_string())
    }
}
