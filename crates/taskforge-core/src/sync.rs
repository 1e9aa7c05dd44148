//! `Signalable`: a manual-reset wait primitive shared across the crate.
//!
//! This is the crate's stand-in for a platform waitable handle. It backs
//! `CancelToken`'s wait handle, a `Task`'s completion signal, and the
//! `done_signal` on a queued UI call.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::deadline::Deadline;

/// Outcome of waiting on a single [`Signalable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The handle was signaled before the deadline elapsed.
    Signaled,
    /// The deadline elapsed first.
    Timeout,
}

/// Outcome of [`Signalable::wait_any`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyOutcome {
    /// The handle at this index was signaled.
    Signaled(usize),
    /// The deadline elapsed before any handle signaled.
    Timeout,
}

/// A one-shot-or-reusable wait primitive: `set`/`reset` a boolean state,
/// block on it with a [`Deadline`].
///
/// Cloning a `Signalable` yields another handle to the same underlying
/// state (it is `Arc`-backed), matching how a `CancelToken`'s materialised
/// wait handle must be shared by every waiter.
#[derive(Clone)]
pub struct Signalable {
    inner: Arc<Inner>,
}

struct Inner {
    signaled: Mutex<bool>,
    condvar: Condvar,
    /// Extra wakers registered by `wait_any` callers so that a `set()` on
    /// this handle can also wake a wait that spans several handles.
    waiters: Mutex<Vec<Arc<Waker>>>,
}

/// An internal, single-use notifier shared by every handle passed to
/// [`Signalable::wait_any`]. Holding the lock while flipping `ready`
/// prevents the classic "set before wait" lost-wakeup race.
struct Waker {
    ready: Mutex<bool>,
    condvar: Condvar,
}

impl Waker {
    fn new() -> Self {
        Self {
            ready: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn wake(&self) {
        let mut ready = self.ready.lock();
        *ready = true;
        self.condvar.notify_all();
    }

    /// Waits until woken or `deadline` elapses; resets its own flag before
    /// returning so it can be reused across retry loops.
    fn wait_deadline(&self, deadline: Deadline) -> WaitOutcome {
        let mut ready = self.ready.lock();
        loop {
            if *ready {
                *ready = false;
                return WaitOutcome::Signaled;
            }
            match deadline.remaining() {
                Some(remaining) => {
                    if remaining.is_zero() {
                        return WaitOutcome::Timeout;
                    }
                    let result = self.condvar.wait_for(&mut ready, remaining);
                    if *ready {
                        *ready = false;
                        return WaitOutcome::Signaled;
                    }
                    if result.timed_out() {
                        return WaitOutcome::Timeout;
                    }
                }
                None => self.condvar.wait(&mut ready),
            }
        }
    }
}

impl Signalable {
    /// Creates a new, unset `Signalable`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                signaled: Mutex::new(false),
                condvar: Condvar::new(),
                waiters: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Creates a `Signalable` that is already set.
    pub fn new_set() -> Self {
        let s = Self::new();
        s.set();
        s
    }

    /// Sets the handle, waking anyone blocked in [`Signalable::wait`] or
    /// [`Signalable::wait_any`]. Idempotent.
    pub fn set(&self) {
        {
            let mut signaled = self.inner.signaled.lock();
            *signaled = true;
            self.inner.condvar.notify_all();
        }
        for waker in self.inner.waiters.lock().iter() {
            waker.wake();
        }
    }

    /// Clears the handle so a subsequent `wait` blocks again.
    pub fn reset(&self) {
        *self.inner.signaled.lock() = false;
    }

    /// Non-blocking read of the current state.
    pub fn is_set(&self) -> bool {
        *self.inner.signaled.lock()
    }

    /// Blocks until set or `deadline` elapses.
    pub fn wait(&self, deadline: Deadline) -> WaitOutcome {
        let mut signaled = self.inner.signaled.lock();
        loop {
            if *signaled {
                return WaitOutcome::Signaled;
            }
            match deadline.remaining() {
                Some(remaining) => {
                    if remaining.is_zero() {
                        return WaitOutcome::Timeout;
                    }
                    let result = self.inner.condvar.wait_for(&mut signaled, remaining);
                    if *signaled {
                        return WaitOutcome::Signaled;
                    }
                    if result.timed_out() {
                        return WaitOutcome::Timeout;
                    }
                }
                None => self.inner.condvar.wait(&mut signaled),
            }
        }
    }

    /// Registers a shared waker so a future `set()` also wakes a
    /// `wait_any` in progress. If already set, wakes it immediately.
    fn register(&self, waker: &Arc<Waker>) {
        let signaled = self.inner.signaled.lock();
        if *signaled {
            waker.wake();
        } else {
            self.inner.waiters.lock().push(waker.clone());
        }
    }

    fn unregister(&self, waker: &Arc<Waker>) {
        self.inner
            .waiters
            .lock()
            .retain(|w| !Arc::ptr_eq(w, waker));
    }

    /// Blocks until any of `handles` is set or `deadline` elapses, returning
    /// the index of the first handle observed set.
    ///
    /// If more than one handle is already set when called, the lowest index
    /// wins, matching the FIFO-ish determinism the rest of the crate favors.
    pub fn wait_any(handles: &[&Signalable], deadline: Deadline) -> AnyOutcome {
        if let Some(i) = handles.iter().position(|h| h.is_set()) {
            return AnyOutcome::Signaled(i);
        }

        let waker = Arc::new(Waker::new());
        for h in handles {
            h.register(&waker);
        }

        let outcome = loop {
            match waker.wait_deadline(deadline) {
                WaitOutcome::Timeout => break AnyOutcome::Timeout,
                WaitOutcome::Signaled => {
                    if let Some(i) = handles.iter().position(|h| h.is_set()) {
                        break AnyOutcome::Signaled(i);
                    }
                    // Spurious: woken by a registration race with nothing
                    // actually set yet. Loop and wait again.
                }
            }
        };

        for h in handles {
            h.unregister(&waker);
        }
        outcome
    }
}

impl Default for Signalable {
    fn default() -> Self {
        Self::new()
    }
}
