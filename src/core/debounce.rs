//! Re-armable delayed action
//!
//! Arming replaces whatever was scheduled before: the pending task is aborted
//! and the delay restarts, so a burst of triggers collapses into one action
//! fired `delay` after the last of them.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Single-slot debounce timer
pub struct Debouncer {
    runtime: Option<Handle>,
    delay: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl Debouncer {
    /// Create a debouncer spawning onto `runtime`
    ///
    /// Without a runtime, armed actions run immediately on the caller's thread.
    pub fn new(runtime: Option<Handle>, delay: Duration) -> Self {
        Debouncer {
            runtime,
            delay,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` after the delay, cancelling anything already pending
    pub fn arm<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.slot.lock();
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(previous) = slot.handle.take() {
            debug!("Debounce re-armed, cancelling pending action");
            previous.abort();
        }

        let Some(runtime) = &self.runtime else {
            drop(slot);
            action();
            return;
        };

        let token = slot.generation;
        let shared = Arc::clone(&self.slot);
        let delay = self.delay;
        slot.handle = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = shared.lock();
                if slot.generation != token {
                    return;
                }
                slot.handle = None;
            }
            action();
        }));
    }

    /// Abort the pending action, if any
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().handle.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
