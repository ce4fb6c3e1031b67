//! Cache invalidation hook.
//!
//! The editor reports every record whose cached view went stale after a
//! committed mutation. Views are keyed by `{collection, id}`.

use pagecraft_model::NodeRef;
use std::sync::Mutex;

pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, node: NodeRef);
}

/// Invalidator for callers without a cache
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate(&self, _node: NodeRef) {}
}

/// Collects invalidated keys in call order
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    seen: Mutex<Vec<NodeRef>>,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the keys recorded so far
    pub fn take(&self) -> Vec<NodeRef> {
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *seen)
    }
}

impl CacheInvalidator for RecordingInvalidator {
    fn invalidate(&self, node: NodeRef) {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(node);
    }
}
