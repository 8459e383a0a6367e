//! Fixed-delay debounce timer.
//!
//! Every [`DebounceScheduler::arm`] call restarts the quiet period, so a burst
//! of edits collapses into a single action fired `delay` after the last one.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

pub struct DebounceScheduler {
    delay: Duration,
    generation: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for DebounceScheduler {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DebounceScheduler")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

impl DebounceScheduler {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm or re-arm the timer. The previous pending action, if any, is dropped.
    ///
    /// The action runs as its own task once the delay elapses, so a later
    /// re-arm never interrupts it. Must be called within a Tokio runtime.
    /// Returns `false` once the scheduler is disposed.
    pub fn arm<F, Fut>(&self, action: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // Held until the swap: the stored timer always carries the newest generation.
        let mut pending = self.pending();
        if self.disposed.load(Ordering::SeqCst) {
            return false;
        }

        let armed_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Re-armed or cancelled while the abort was in transit.
            if generation.load(Ordering::SeqCst) != armed_generation {
                return;
            }
            tracing::debug!("Debounce window elapsed after {:?}", delay);
            tokio::spawn(action());
        });

        if let Some(previous) = pending.replace(timer) {
            previous.abort();
        }
        true
    }

    /// Drop the pending action. Returns whether one was waiting.
    pub fn cancel(&self) -> bool {
        let mut pending = self.pending();
        self.generation.fetch_add(1, Ordering::SeqCst);
        pending.take().is_some_and(|timer| {
            let was_pending = !timer.is_finished();
            timer.abort();
            was_pending
        })
    }

    pub fn is_pending(&self) -> bool {
        self.pending()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Cancel and refuse all future arms.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        if self.cancel() {
            tracing::debug!("Disposed scheduler with a pending save");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.pending().take() {
            timer.abort();
        }
    }
}
