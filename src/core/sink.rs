// src/core/sink.rs

//! The output sink that receives operational messages from the facade.
//!
//! A sink is injected at construction. When none is supplied, a shared
//! [`TracingSink`] is created on first use and handed to every client.

use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Receives `log`/`warn`/`error` messages.
pub trait OutputSink: Send + Sync {
    fn log(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards sink messages to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn log(&self, message: &str) {
        info!(target: "spineldb_client", "{message}");
    }

    fn warn(&self, message: &str) {
        warn!(target: "spineldb_client", "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: "spineldb_client", "{message}");
    }
}

static DEFAULT_SINK: Lazy<Arc<dyn OutputSink>> = Lazy::new(|| Arc::new(TracingSink));

/// Returns the process-wide default sink.
pub fn default_sink() -> Arc<dyn OutputSink> {
    DEFAULT_SINK.clone()
}
