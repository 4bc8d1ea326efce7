// src/core/connection/mod.rs

//! The connection state machine.
//!
//! A [`Connection`] owns the store capability exclusively. It is the only
//! component allowed to establish, replace or close it; the dispatcher and the
//! batch executor only observe it.

pub mod machine;
pub mod state;

pub use machine::Connection;
pub use state::ConnectionState;
