//! Typed publish/subscribe primitive used between components.
//!
//! Each `Event` belongs to one publisher and carries that publisher's origin
//! label into every callback. Dispatch is synchronous in the caller's thread;
//! listeners are expected to return within a few milliseconds. A listener
//! that panics is caught and logged so the tick loop keeps running.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::error;
use parking_lot::Mutex;

type Callback<P> = Arc<dyn Fn(&str, &P) + Send + Sync>;

pub struct Event<P> {
    origin: String,
    listeners: Mutex<Vec<(String, Callback<P>)>>,
}

impl<P> Event<P> {
    pub fn new(origin: impl Into<String>) -> Self {
        Event {
            origin: origin.into(),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Register a listener under a name. Registering the same name twice is a
    /// no-op, so wiring code may run more than once without doubling dispatch.
    pub fn add_listener<F>(&self, name: &str, f: F)
    where
        F: Fn(&str, &P) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|(n, _)| n == name) {
            return;
        }
        listeners.push((name.to_string(), Arc::new(f)));
    }

    pub fn remove_listener(&self, name: &str) {
        self.listeners.lock().retain(|(n, _)| n != name);
    }

    /// Dispatch to every listener in registration order. The listener list is
    /// snapshotted first, so callbacks may register or remove listeners
    /// without deadlocking.
    pub fn trigger(&self, parameter: &P) {
        let snapshot: Vec<Callback<P>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for f in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| f(&self.origin, parameter)));
            if result.is_err() {
                error!("listener panicked handling event from {}", self.origin);
            }
        }
    }
}

impl<P> std::fmt::Debug for Event<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("origin", &self.origin)
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}
