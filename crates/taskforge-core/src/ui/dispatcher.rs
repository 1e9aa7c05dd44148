//! The UI-thread injection protocol: [`UiDispatcher`].

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::deadline::Deadline;
use crate::error::{Result, TaskforgeError};
use crate::logging::targets;
use crate::sync::{AnyOutcome, Signalable, WaitOutcome};
use crate::task::panic_message;
use crate::thread_check;

use super::pump::{MessageClass, MessagePump};

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// Globally toggles whether the process is considered headless. A headless
/// process has no real UI thread to delegate to, so `Task::wait` should fall
/// back to a passive wait even when called from what `thread_check`
/// considers the main thread. Defaults to `false`.
static HEADLESS: AtomicBool = AtomicBool::new(false);

/// Marks the process as headless (no UI thread wait delegation) or not.
pub fn set_headless(headless: bool) {
    HEADLESS.store(headless, Ordering::SeqCst);
}

/// Whether the process is currently marked headless.
pub fn is_headless() -> bool {
    HEADLESS.load(Ordering::SeqCst)
}

type UiAction = Box<dyn FnOnce() + Send + 'static>;
type FailureHandler = Box<dyn Fn(&str) + Send + Sync + 'static>;

struct UiCall {
    id: u64,
    action: Option<UiAction>,
    done_signal: Signalable,
}

/// Decrements `waiting_depth` on drop, including on unwind. A dispatched UI
/// message's failure propagates out of `modal_wait_loop` as a panic (see
/// `run_extraction_hook`'s own `catch_unwind`, which only shields the queued
/// action itself, not the loop around it); without this guard that panic
/// would skip the matching `fetch_sub` and leave `should_suppress_close_window`
/// stuck reporting `true` forever.
struct WaitingDepthGuard<'a> {
    depth: &'a AtomicUsize,
}

impl<'a> WaitingDepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::AcqRel);
        Self { depth }
    }
}

impl Drop for WaitingDepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The process-global singleton bound to the UI thread.
///
/// `install()` captures the calling thread as the UI thread and registers a
/// [`MessagePump`]. Every other public method may be called from any
/// thread, except `modal_wait`, which is UI-thread-only by contract (not
/// enforced here beyond a debug assertion: calling it off the UI thread is a
/// programming error to be caught in testing, not guarded against at
/// runtime).
pub struct UiDispatcher {
    /// Claims the right to install, guarding against a second `install()`
    /// call; flips first but is not itself what callers should branch on.
    claimed: AtomicBool,
    /// True once `install()` has fully completed (main thread ID recorded,
    /// pump stored). This, not `claimed`, is what `is_installed` reports.
    installed: AtomicBool,
    pump: OnceLock<Box<dyn MessagePump>>,
    queue: Mutex<VecDeque<UiCall>>,
    waiting_depth: AtomicUsize,
    failure_handler: OnceLock<FailureHandler>,
}

static_assertions::assert_impl_all!(UiDispatcher: Send, Sync);

static DISPATCHER: UiDispatcher = UiDispatcher::new();

impl UiDispatcher {
    const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
            installed: AtomicBool::new(false),
            pump: OnceLock::new(),
            queue: Mutex::new(VecDeque::new()),
            waiting_depth: AtomicUsize::new(0),
            failure_handler: OnceLock::new(),
        }
    }

    /// The process-global dispatcher instance.
    pub fn global() -> &'static UiDispatcher {
        &DISPATCHER
    }

    /// Installs the dispatcher, capturing the calling thread as the UI
    /// thread and registering `pump` as the host message-pump adapter.
    ///
    /// # Errors
    ///
    /// Returns [`TaskforgeError::AlreadyInstalled`] if called more than
    /// once.
    pub fn install(&self, pump: Box<dyn MessagePump>) -> Result<()> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return Err(TaskforgeError::AlreadyInstalled);
        }
        thread_check::set_main_thread();
        self.pump
            .set(pump)
            .unwrap_or_else(|_| unreachable!("claimed flag guards single-set"));
        // Only now does another thread's `is_installed()`/`is_main_thread()`
        // race see a fully ready dispatcher: flipping this after the main
        // thread ID and the pump are both in place closes the window where
        // a concurrent caller could observe "installed" yet find no pump.
        self.installed.store(true, Ordering::Release);
        tracing::debug!(target: targets::UI_DISPATCH, "ui dispatcher installed");
        Ok(())
    }

    /// Whether `install` has fully completed.
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Registers a handler invoked when a `perform`ed action fails (panics).
    /// Without one, failures are logged and swallowed rather than propagated
    /// — a panic crossing the UI thread's extraction hook must never bring
    /// down the whole process.
    pub fn set_failure_handler<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let _ = self.failure_handler.set(Box::new(handler));
    }

    fn pump(&self) -> &dyn MessagePump {
        self.pump
            .get()
            .map(|p| p.as_ref())
            .expect("UiDispatcher used before install()")
    }

    /// Runs `action` on the UI thread.
    ///
    /// If the caller is already the UI thread, `action` runs inline and this
    /// returns `true` immediately. Otherwise the action is queued and this
    /// blocks until it either runs (`true`) or is retracted because `cancel`
    /// fired before the UI thread picked it up (`false`).
    ///
    /// When this returns, `action` is guaranteed not to be — and never again
    /// to be — executing.
    pub fn perform(&self, action: impl FnOnce() + Send + 'static, cancel: CancelToken) -> bool {
        if thread_check::is_main_thread() {
            action();
            return true;
        }

        let done_signal = Signalable::new();
        let id = NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed);
        let call = UiCall {
            id,
            action: Some(Box::new(action)),
            done_signal: done_signal.clone(),
        };
        self.queue.lock().push_back(call);
        self.pump().post_wakeup();
        tracing::trace!(target: targets::UI_DISPATCH, id, "perform queued");

        let cancel_handle = cancel.wait_handle();
        match Signalable::wait_any(&[&done_signal, cancel_handle], Deadline::infinite()) {
            AnyOutcome::Signaled(0) => true,
            AnyOutcome::Signaled(_) => {
                let retracted = {
                    let mut queue = self.queue.lock();
                    if let Some(pos) = queue.iter().position(|c| c.id == id) {
                        queue.remove(pos);
                        true
                    } else {
                        false
                    }
                };
                if retracted {
                    tracing::trace!(target: targets::UI_DISPATCH, id, "perform retracted");
                    false
                } else {
                    // Already picked up (or finished): cannot un-run it.
                    done_signal.wait(Deadline::infinite());
                    true
                }
            }
            AnyOutcome::Timeout => unreachable!("perform waits with an infinite deadline"),
        }
    }

    /// The UI thread's extraction hook: pops and runs one queued call.
    /// Called by the host whenever it observes the dispatcher's wake-up
    /// notification, whether that happens inside `modal_wait` or in the
    /// application's own normal event-loop turn.
    pub fn run_extraction_hook(&self) {
        let call = self.queue.lock().pop_front();
        let Some(mut call) = call else {
            return;
        };
        let action = call
            .action
            .take()
            .expect("UiCall action taken more than once");

        tracing::trace!(target: targets::UI_DISPATCH, id = call.id, "extraction hook running call");
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(action)) {
            let message = panic_message(panic);
            if let Some(handler) = self.failure_handler.get() {
                handler(&message);
            } else {
                tracing::warn!(
                    target: targets::UI_DISPATCH,
                    id = call.id,
                    %message,
                    "ui action failed with no handler installed"
                );
            }
        }
        call.done_signal.set();
    }

    /// Whether a window-close request should be suppressed right now. The
    /// host's window-close handling should consult this before tearing a
    /// window down: a window must not be torn down while the UI thread is
    /// mid-`modal_wait`, since a queued `perform` targeting that window could
    /// still be in flight.
    pub fn should_suppress_close_window(&self) -> bool {
        self.waiting_depth.load(Ordering::Acquire) > 0
    }

    /// The UI thread's bounded wait: blocks until any of `handles` signals
    /// or `deadline` elapses, dispatching paint/timer/thread-posted messages
    /// as they arrive so the UI does not appear frozen.
    ///
    /// Only the UI thread may call this.
    pub fn modal_wait(&self, handles: &[&Signalable], deadline: Deadline) -> AnyOutcome {
        debug_assert!(
            thread_check::is_main_thread(),
            "modal_wait must be called from the UI thread"
        );
        let _guard = WaitingDepthGuard::enter(&self.waiting_depth);
        self.modal_wait_loop(handles, deadline)
    }

    fn modal_wait_loop(&self, handles: &[&Signalable], deadline: Deadline) -> AnyOutcome {
        let pump = self.pump();
        let mut pending_quit = false;

        let outcome = loop {
            if deadline.is_elapsed() {
                break AnyOutcome::Timeout;
            }

            for message in pump.drain_permitted() {
                match message.class {
                    MessageClass::Quit => pending_quit = true,
                    MessageClass::ThreadPosted => self.run_extraction_hook(),
                    MessageClass::Paint | MessageClass::Timer | MessageClass::Other => {
                        pump.dispatch(&message)
                    }
                }
            }

            let mut waitable = Vec::with_capacity(handles.len() + 1);
            waitable.extend_from_slice(handles);
            waitable.push(pump.message_signal());

            match Signalable::wait_any(&waitable, deadline) {
                AnyOutcome::Signaled(i) if i < handles.len() => break AnyOutcome::Signaled(i),
                AnyOutcome::Signaled(_) => continue, // woke for a new message; loop and drain it
                AnyOutcome::Timeout => break AnyOutcome::Timeout,
            }
        };

        if pending_quit {
            pump.repost_quit();
        }
        outcome
    }
}

/// Delegates a single-handle wait to `modal_wait` when called from an
/// installed, non-headless UI thread; otherwise waits passively. Used by
/// `Task::wait`.
pub(crate) fn delegate_wait_if_ui_thread(handle: &Signalable, deadline: Deadline) -> WaitOutcome {
    let dispatcher = UiDispatcher::global();
    if thread_check::is_main_thread() && dispatcher.is_installed() && !is_headless() {
        match dispatcher.modal_wait(&[handle], deadline) {
            AnyOutcome::Signaled(_) => WaitOutcome::Signaled,
            AnyOutcome::Timeout => WaitOutcome::Timeout,
        }
    } else {
        handle.wait(deadline)
    }
}
