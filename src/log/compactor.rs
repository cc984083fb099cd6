//! Background compaction worker.
//!
//! A dedicated thread wakes at a fixed interval and runs one compaction
//! pass. The wait is a condvar timed wait rather than a plain sleep, so
//! stopping the worker interrupts it immediately instead of after up to
//! one full interval. The worker holds only a weak reference to its
//! target and exits on its own if the store goes away.

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// Target of the background worker; one garbage-collection pass per call.
pub(crate) trait GcTarget: Send + Sync + 'static {
    fn run_gc(&self);
}

struct GcShared {
    stop: Mutex<bool>,
    wake: Condvar,
}

/// Interval-driven compaction thread.
pub(crate) struct GcWorker<T: GcTarget> {
    shared: Arc<GcShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: GcTarget> GcWorker<T> {
    /// Spawn the worker. The first pass runs one `interval` after start.
    pub(crate) fn start(target: Weak<T>, interval: Duration) -> Self {
        let shared = Arc::new(GcShared {
            stop: Mutex::new(false),
            wake: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || gc_loop(worker_shared, target, interval));

        Self {
            shared,
            handle: Mutex::new(Some(handle)),
            _marker: std::marker::PhantomData,
        }
    }

    /// Signal the worker to stop and join it. Idempotent.
    pub(crate) fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            *self.shared.stop.lock() = true;
            self.shared.wake.notify_all();
            let _ = handle.join();
        }
    }
}

impl<T: GcTarget> Drop for GcWorker<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn gc_loop<T: GcTarget>(shared: Arc<GcShared>, target: Weak<T>, interval: Duration) {
    loop {
        {
            let mut stop = shared.stop.lock();
            if *stop {
                return;
            }
            let result = shared.wake.wait_for(&mut stop, interval);
            if *stop {
                return;
            }
            if !result.timed_out() {
                // Spurious wakeup; go back to waiting.
                continue;
            }
        }

        let store = match target.upgrade() {
            Some(store) => store,
            None => return,
        };
        debug!("interval elapsed, running compaction");
        store.run_gc();
    }
}
