//! Observers for calls that reach the persistence layer.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

/// Receives every decorator call that could not be served from cache.
pub trait PersistenceLogger: Send + Sync {
    fn log_call(&self, method: &str, args: Value);
}

/// Emits each call as a debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPersistenceLogger;

impl PersistenceLogger for TracingPersistenceLogger {
    fn log_call(&self, method: &str, args: Value) {
        debug!(method, args = %args, "Persistence call");
    }
}

/// Records calls in memory, for diagnostics and tests.
#[derive(Debug, Default)]
pub struct CallCountLogger {
    calls: Mutex<Vec<(String, Value)>>,
}

impl CallCountLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn count_of(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(m, _)| m == method).count()
    }

    pub fn counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for (method, _) in self.calls.lock().iter() {
            *counts.entry(method.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}

impl PersistenceLogger for CallCountLogger {
    fn log_call(&self, method: &str, args: Value) {
        self.calls.lock().push((method.to_string(), args));
    }
}
