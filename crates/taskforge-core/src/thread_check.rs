//! Thread identity tracking for the UI-thread injection protocol.
//!
//! `Task::wait` and `UiDispatcher::perform` both need to know whether the
//! calling thread is the UI thread. This module provides that, via a single
//! process-global `OnceLock<ThreadId>` recorded once by
//! `UiDispatcher::install()`.
//!
//! ```ignore
//! use taskforge_core::is_main_thread;
//!
//! fn some_operation() {
//!     if is_main_thread() {
//!         // Direct call
//!     } else {
//!         // Route through UiDispatcher::perform
//!     }
//! }
//! ```

use std::sync::OnceLock;
use std::thread::ThreadId;

/// Global storage for the main thread ID.
static MAIN_THREAD_ID: OnceLock<ThreadId> = OnceLock::new();

/// Set the main thread ID.
///
/// This is called by `UiDispatcher::install()`. It should only be called
/// once, from the UI thread, at application startup.
///
/// # Panics
///
/// Panics if called more than once.
pub fn set_main_thread() {
    let current = std::thread::current().id();
    if MAIN_THREAD_ID.set(current).is_err() {
        // Already set - verify it's the same thread
        if MAIN_THREAD_ID.get() != Some(&current) {
            panic!(
                "set_main_thread() called from different thread than original. \
                 The main thread ID can only be set once."
            );
        }
    }
}

/// Get the main thread ID if it has been set.
///
/// Returns `None` if `UiDispatcher::install()` has not been called yet.
#[inline]
pub fn main_thread_id() -> Option<ThreadId> {
    MAIN_THREAD_ID.get().copied()
}

/// Check if the current thread is the main (UI) thread.
///
/// Returns `true` if:
/// - We are on the main thread, OR
/// - The main thread has not been set yet (graceful fallback)
///
/// Returns `false` only if:
/// - The main thread has been set AND we are on a different thread
///
/// # Example
///
/// ```ignore
/// use taskforge_core::is_main_thread;
///
/// if is_main_thread() {
///     // Safe to call directly
///     update();
/// } else {
///     // Route through UiDispatcher::perform instead
/// }
/// ```
#[inline]
pub fn is_main_thread() -> bool {
    match MAIN_THREAD_ID.get() {
        Some(&main_id) => std::thread::current().id() == main_id,
        // If not set, assume we're fine (early initialization)
        None => true,
    }
}
