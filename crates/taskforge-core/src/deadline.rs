//! Absolute, monotonic wait deadlines.
//!
//! `Deadline` is the timeout primitive threaded through every blocking
//! operation in this crate (`ThreadPool` worker idle waits, `Task::wait`,
//! `UiDispatcher::modal_wait`). It is absolute rather than a plain
//! `Duration` so that a retried wait after a spurious wake-up respects the
//! original expiry instead of resetting the clock on every loop iteration.

use std::time::{Duration, Instant};

/// An absolute point in time after which a wait should give up.
///
/// Construct with [`Deadline::from_millis`] or [`Deadline::infinite`]; query
/// with [`Deadline::remaining`] / [`Deadline::is_elapsed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never elapses.
    pub const fn infinite() -> Self {
        Self(None)
    }

    /// A deadline `millis` milliseconds from now.
    pub fn from_millis(millis: u64) -> Self {
        Self(Some(Instant::now() + Duration::from_millis(millis)))
    }

    /// A deadline `duration` from now.
    pub fn from_duration(duration: Duration) -> Self {
        Self(Some(Instant::now() + duration))
    }

    /// A deadline that has already elapsed.
    pub fn elapsed() -> Self {
        Self(Some(Instant::now()))
    }

    /// Whether this deadline has already passed.
    pub fn is_elapsed(&self) -> bool {
        match self.0 {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    /// Time remaining until the deadline, or `None` for an infinite deadline.
    ///
    /// Returns `Some(Duration::ZERO)` rather than underflowing once the
    /// deadline has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Milliseconds remaining, saturating at `u64::MAX` for an infinite
    /// deadline and at `0` once elapsed.
    pub fn remaining_millis(&self) -> u64 {
        match self.remaining() {
            Some(d) => d.as_millis().min(u64::MAX as u128) as u64,
            None => u64::MAX,
        }
    }
}

impl Default for Deadline {
    /// Defaults to infinite, matching the common case of an unbounded wait.
    fn default() -> Self {
        Self::infinite()
    }
}
