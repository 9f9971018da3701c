//! Cooperative stop signalling.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared stop flag with an interruptible sleep.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    requested: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl StopSignal {
    pub(crate) fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        // Taking the lock orders this wake-up after any sleeper's flag check.
        let _guard = self.lock.lock();
        self.wake.notify_all();
    }

    pub(crate) fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless a stop arrives first.
    ///
    /// Returns false if the sleep was cut short by a stop request.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.lock.lock();
        while !self.is_requested() {
            if self.wake.wait_until(&mut guard, deadline).timed_out() {
                return !self.is_requested();
            }
        }
        false
    }
}

/// Handle for requesting a stop from any thread.
///
/// Cheap to clone. Stopping is cooperative: an in-flight poll finishes, a
/// backoff sleep is cut short, and the loop exits at its next check.
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: Arc<StopSignal>,
}

impl StopHandle {
    pub(crate) fn new(signal: Arc<StopSignal>) -> Self {
        Self { signal }
    }

    /// Requests the polling loop to stop.
    pub fn stop(&self) {
        self.signal.request();
    }

    /// Returns true once a stop was requested.
    pub fn is_stopping(&self) -> bool {
        self.signal.is_requested()
    }
}

/// One-shot flag that threads can wait on.
#[derive(Debug, Default)]
pub(crate) struct ExitLatch {
    done: Mutex<bool>,
    wake: Condvar,
}

impl ExitLatch {
    pub(crate) fn set(&self) {
        *self.done.lock() = true;
        self.wake.notify_all();
    }

    pub(crate) fn clear(&self) {
        *self.done.lock() = false;
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.done.lock()
    }

    /// Waits until set. Returns false on timeout.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.done.lock();
        while !*done {
            if self.wake.wait_until(&mut done, deadline).timed_out() {
                return *done;
            }
        }
        true
    }
}
