//! Single-consumer edge-triggered latch.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A cooperative latch: one consumer awaits [`wait`](WaitableFlag::wait),
/// any producer calls [`set`](WaitableFlag::set), and the consumer calls
/// [`clear`](WaitableFlag::clear) once it has drained whatever the flag
/// guards.
///
/// An edge-triggered signal, not a counting semaphore: repeated sets
/// collapse into one wake, and the consumer drains to empty before
/// clearing. `set` relies on `Notify`'s stored permit so a set landing
/// between the consumer's check and its await is never lost.
pub(crate) struct WaitableFlag {
    set: AtomicBool,
    notify: Notify,
}

impl WaitableFlag {
    pub(crate) fn new() -> Self {
        Self {
            set: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Suspend until the flag is set. Returns immediately if it already is.
    pub(crate) async fn wait(&self) {
        while !self.set.load(Ordering::Acquire) {
            self.notify.notified().await;
        }
    }

    /// Set the flag and wake the waiting consumer, if any.
    pub(crate) fn set(&self) {
        self.set.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Reset the flag. The consumer calls this after draining.
    pub(crate) fn clear(&self) {
        self.set.store(false, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }
}
