use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory user id sequence standing in for the demo's storage layer.
#[derive(Debug, Default)]
pub struct UserCounter {
    current: AtomicU64,
}

impl UserCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next user id. Ids start at 1.
    pub fn increment(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last allocated id, 0 before the first allocation.
    pub fn value(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}
