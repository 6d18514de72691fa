//! Execution context shared by guards, actions, and observers.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Cooperative cancellation token with an optional deadline.
///
/// The engine never checks the token between traversal steps. Honoring it
/// is the responsibility of individual action implementations; a
/// long-running action that ignores it cannot be interrupted externally.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
    deadline: Mutex<Option<Instant>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Sets an absolute deadline after which the token reads as cancelled.
    pub fn set_deadline(&self, deadline: Instant) {
        *self.deadline.lock() = Some(deadline);
    }

    /// True once [`cancel`](Self::cancel) has been called or the deadline
    /// has passed.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match *self.deadline.lock() {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

/// Thread-safe key/value store flowing through every action and guard
/// evaluation.
///
/// Holds two independent mappings: `data` carries the business payload read
/// by guards and actions, `metadata` carries engine/observability payload.
/// Each mapping has its own lock, so no operation blocks the other side.
/// There is no removal or eviction; unbounded growth over a single
/// context's lifetime is accepted.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    data: RwLock<HashMap<String, Value>>,
    metadata: RwLock<HashMap<String, Value>>,
    cancel: CancelToken,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context pre-populated with data entries.
    pub fn with_data(data: HashMap<String, Value>) -> Self {
        Self {
            data: RwLock::new(data),
            ..Default::default()
        }
    }

    pub fn set_data(&self, key: impl Into<String>, value: Value) {
        self.data.write().insert(key.into(), value);
    }

    pub fn get_data(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        self.metadata.write().insert(key.into(), value);
    }

    pub fn get_metadata(&self, key: &str) -> Option<Value> {
        self.metadata.read().get(key).cloned()
    }

    /// Returns an independent copy of the data mapping.
    pub fn all_data(&self) -> HashMap<String, Value> {
        self.data.read().clone()
    }

    /// The cooperative cancellation token carried by this context.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}
