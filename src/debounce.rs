use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Coalesces bursts of mutations into one deferred action. Every call to
/// `schedule` cancels the pending run and restarts the quiescence window, so
/// only the last action scheduled before the window elapses ever runs.
pub struct Debouncer {
    delay: Duration,
    runtime: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Captures the current tokio runtime handle, so `schedule` stays usable
    /// from synchronous call sites on any thread.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; use [`Debouncer::with_runtime`]
    /// to construct one elsewhere.
    pub fn new(delay: Duration) -> Self {
        Self::with_runtime(delay, Handle::current())
    }

    pub fn with_runtime(delay: Duration, runtime: Handle) -> Self {
        Self {
            delay,
            runtime,
            pending: Mutex::new(None),
        }
    }

    /// The action must read state when it fires, not when it is scheduled,
    /// so the deferred write always carries the latest in-memory state.
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let delay = self.delay;
        let mut pending = self.pending.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        *pending = Some(self.runtime.spawn(async move {
            sleep(delay).await;
            action().await;
        }));
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }
}
