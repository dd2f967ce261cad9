//! Single-flight guard for the session refresh exchange.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Ensures at most one refresh runs at a time and that callers arriving
/// while one is in flight share its outcome instead of starting another.
#[derive(Debug, Default)]
pub(crate) struct RefreshGate {
    /// Bumped after every completed refresh.
    completed: AtomicU64,
    last_outcome: Mutex<Option<bool>>,
}

impl RefreshGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `refresh` unless another caller finished one while we waited for
    /// the lock, in which case its outcome is returned. The lock is released
    /// on every path, including cancellation.
    pub(crate) async fn run<F, Fut>(&self, refresh: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let seen = self.completed.load(Ordering::Acquire);
        let mut last = self.last_outcome.lock().await;

        if self.completed.load(Ordering::Acquire) != seen {
            if let Some(outcome) = *last {
                return outcome;
            }
        }

        let outcome = refresh().await;
        *last = Some(outcome);
        self.completed.fetch_add(1, Ordering::Release);
        outcome
    }
}
