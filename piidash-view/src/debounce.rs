use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

/// Delay between the last search keystroke and applying it.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(200);

/// Cancellable delayed callback. At most one callback is pending; scheduling
/// a new one aborts the previous.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `f` after the delay unless another call arrives first. Returns
    /// true when `f` was deferred.
    ///
    /// Outside a tokio runtime there is no timer to wait on, so `f` runs
    /// immediately and this returns false.
    pub fn schedule<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let delay = self.delay;
                *pending = Some(handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    f();
                }));
                true
            }
            Err(_) => {
                drop(pending);
                warn!("no tokio runtime, applying debounced call immediately");
                f();
                false
            }
        }
    }

    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
