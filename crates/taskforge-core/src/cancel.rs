//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::logging::targets;
use crate::sync::Signalable;

/// A thread-safe, one-shot cancellation flag.
///
/// `cancelled` only ever flips `false -> true`. Cloning shares the same
/// underlying state (it is `Arc`-backed) — every clone observes the same
/// cancellation.
///
/// A `Signalable` wait handle is materialised lazily on first
/// [`CancelToken::wait_handle`] call; two threads racing to materialise it
/// agree on a single instance (`OnceLock`'s CAS-like `get_or_init`), and if
/// the token was already cancelled before materialisation, the freshly
/// created handle is signaled before being handed back.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<State>,
}

struct State {
    cancelled: AtomicBool,
    signal: OnceLock<Signalable>,
}

impl CancelToken {
    /// Creates a fresh, non-cancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(State {
                cancelled: AtomicBool::new(false),
                signal: OnceLock::new(),
            }),
        }
    }

    /// Creates a token that cancels itself after `duration`, by way of a
    /// background monitor thread rather than a platform one-shot timer
    /// (taskforge has no platform timer dependency). Calling `cancel()`
    /// manually before the deadline elapses still cancels immediately — the
    /// monitor thread simply becomes a no-op once it wakes, since
    /// cancellation is idempotent.
    pub fn with_timeout(duration: Duration) -> Self {
        let token = Self::new();
        let monitor = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(duration);
            monitor.cancel();
        });
        token
    }

    /// Requests cancellation. Idempotent: only the first call publishes to
    /// a materialised wait handle.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            tracing::trace!(target: targets::CANCEL, "token cancelled");
            if let Some(signal) = self.inner.signal.get() {
                signal.set();
            }
        }
    }

    /// Snapshot read of the cancellation state.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns the effective wait handle, materialising it on first call.
    ///
    /// If the token was already cancelled, the returned handle is set
    /// before this function returns, regardless of which concurrent caller
    /// won the materialisation race.
    pub fn wait_handle(&self) -> &Signalable {
        let signal = self.inner.signal.get_or_init(Signalable::new);
        if self.is_cancelled() {
            signal.set();
        }
        signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(CancelToken: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadline::Deadline;
    use crate::sync::WaitOutcome;
    use std::thread;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let t = CancelToken::new();
        assert!(!t.is_cancelled());
    }

    #[test]
    fn cancel_is_visible_to_clones() {
        let t = CancelToken::new();
        let t2 = t.clone();
        t.cancel();
        assert!(t2.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent() {
        let t = CancelToken::new();
        t.cancel();
        t.cancel();
        assert!(t.is_cancelled());
    }

    #[test]
    fn wait_handle_materialised_after_cancel_is_preset() {
        let t = CancelToken::new();
        t.cancel();
        let handle = t.wait_handle();
        assert_eq!(handle.wait(Deadline::elapsed()), WaitOutcome::Signaled);
    }

    #[test]
    fn wait_handle_materialised_before_cancel_gets_signaled_later() {
        let t = CancelToken::new();
        let handle = t.wait_handle().clone();
        assert_eq!(handle.wait(Deadline::from_millis(10)), WaitOutcome::Timeout);
        t.cancel();
        assert_eq!(handle.wait(Deadline::from_millis(50)), WaitOutcome::Signaled);
    }

    #[test]
    fn racing_wait_handle_calls_agree_on_one_instance() {
        let t = CancelToken::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = t.clone();
                thread::spawn(move || t.wait_handle().clone())
            })
            .collect();
        let signals: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        signals[0].set();
        for s in &signals[1..] {
            assert_eq!(s.wait(Deadline::from_millis(50)), WaitOutcome::Signaled);
        }
    }

    #[test]
    fn with_timeout_cancels_itself() {
        let t = CancelToken::with_timeout(Duration::from_millis(20));
        assert!(!t.is_cancelled());
        thread::sleep(Duration::from_millis(100));
        assert!(t.is_cancelled());
    }
}
