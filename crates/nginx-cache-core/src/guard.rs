use std::sync::atomic::{AtomicBool, Ordering};

/// Once-per-context latch for automatic purges.
///
/// One logical change (publishing a post, say) fans out into many hook
/// invocations; only the first of them may reach the filesystem.
#[derive(Debug, Default)]
pub struct PurgeGuard {
    completed: AtomicBool,
}

impl PurgeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for exactly one caller; check and set are a single swap.
    pub fn try_claim(&self) -> bool {
        !self.completed.swap(true, Ordering::AcqRel)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}
