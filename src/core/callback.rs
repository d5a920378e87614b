//! Observability callbacks.
//!
//! Servers and clients expose three notification slots. Each slot holds at most
//! one callback; registering again replaces the previous one. Callbacks run
//! inline on the task that raised the event, so they must return quickly. A
//! panicking callback is caught and logged, it never takes the caller down.

use std::error::Error;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::warn;

use super::endpoint::Endpoint;
use super::state::ConnState;

/// Error callback; receives one or more errors at once.
pub type FuncError = Box<dyn Fn(&[&dyn Error]) + Send + Sync>;

/// Per-connection info callback: local, remote, transition.
pub type FuncInfo = Box<dyn Fn(&Endpoint, &Endpoint, ConnState) + Send + Sync>;

/// Server lifecycle info callback.
pub type FuncInfoServer = Box<dyn Fn(&str) + Send + Sync>;

/// Registered callback slots.
#[derive(Default)]
pub struct Callbacks {
    error: ArcSwapOption<FuncError>,
    info: ArcSwapOption<FuncInfo>,
    info_server: ArcSwapOption<FuncInfoServer>,
}

impl Callbacks {
    /// Create empty slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the error callback.
    pub fn register_error<F>(&self, f: F)
    where
        F: Fn(&[&dyn Error]) + Send + Sync + 'static,
    {
        self.error.store(Some(Arc::new(Box::new(f))));
    }

    /// Replace the connection info callback.
    pub fn register_info<F>(&self, f: F)
    where
        F: Fn(&Endpoint, &Endpoint, ConnState) + Send + Sync + 'static,
    {
        self.info.store(Some(Arc::new(Box::new(f))));
    }

    /// Replace the server info callback.
    pub fn register_info_server<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.info_server.store(Some(Arc::new(Box::new(f))));
    }

    /// Report errors. Does nothing for an empty slice.
    pub fn error(&self, errors: &[&dyn Error]) {
        if errors.is_empty() {
            return;
        }
        if let Some(f) = self.error.load_full() {
            guarded("error", || f(errors));
        }
    }

    /// Report a connection transition.
    pub fn info(&self, local: &Endpoint, remote: &Endpoint, state: ConnState) {
        if let Some(f) = self.info.load_full() {
            guarded("info", || f(local, remote, state));
        }
    }

    /// Report a server lifecycle message. Formatting only happens when a
    /// callback is registered.
    pub fn info_server(&self, msg: fmt::Arguments<'_>) {
        if let Some(f) = self.info_server.load_full() {
            let msg = msg.to_string();
            guarded("info_server", || f(&msg));
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("error", &self.error.load().is_some())
            .field("info", &self.info.load().is_some())
            .field("info_server", &self.info_server.load().is_some())
            .finish()
    }
}

fn guarded(slot: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!(slot, "callback panicked");
    }
}
