//! Cooperative task cancellation.
//!
//! One cancellation source is live per task. Long-running operations (model
//! calls, tool execution) clone the current [`CancellationToken`] and observe
//! it at their own suspension points; nothing is forcibly preempted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Process-wide interrupt switch for the current task.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct InterruptCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    token: Mutex<CancellationToken>,
    interrupted: AtomicBool,
}

impl Default for InterruptCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: Mutex::new(CancellationToken::new()),
                interrupted: AtomicBool::new(false),
            }),
        }
    }

    /// Begin a new task: install a fresh cancellation source and clear any
    /// prior interrupted flag. The previous token is left behind in whatever
    /// state it was in; stale clones stay cancelled-or-inert and are never
    /// resurrected.
    pub fn start_task(&self) {
        *self.inner.token.lock() = CancellationToken::new();
        self.inner.interrupted.store(false, Ordering::SeqCst);
        tracing::debug!("interrupt coordinator armed for new task");
    }

    /// Interrupt the current task. Idempotent.
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        self.inner.token.lock().cancel();
        tracing::info!("task interrupt requested");
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.lock().is_cancelled()
    }

    /// Token for the current task, for cooperative observation.
    pub fn signal(&self) -> CancellationToken {
        self.inner.token.lock().clone()
    }

    /// Clear state between tasks.
    pub fn reset(&self) {
        self.start_task();
    }
}
