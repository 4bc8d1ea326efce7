// src/core/connection/state.rs

use std::fmt;

/// The lifecycle states of a store connection.
///
/// ```text
/// Disconnected -> Connecting -> Ready <-> Degraded -> Reconnecting -> Ready
///                                                                  \-> TerminalFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    /// A transport error was reported; no automatic recovery is attempted.
    Degraded,
    Reconnecting,
    /// The connection machinery or a supervisor gave up retrying.
    TerminalFailed,
}

impl ConnectionState {
    /// Whether a capability is held in this state.
    pub fn holds_capability(self) -> bool {
        matches!(self, ConnectionState::Ready | ConnectionState::Degraded)
    }

    /// Whether a connection attempt is currently in flight.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::TerminalFailed => "terminal-failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
