use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Stop request shared between the run loop and signal handlers
///
/// Checked only between ticks; it also cuts short any sleep in progress.
#[derive(Debug, Default)]
pub struct Shutdown {
    requested: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`; returns true if woken early by a stop request
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent request is not missed
        notified.as_mut().enable();

        if self.is_requested() {
            return true;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = notified => true,
        }
    }
}
