//! The submitted-unit-of-work lifecycle: [`Task`], its terminal
//! [`TaskState`], and the FIFO [`TaskQueue`] that holds pending tasks.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::deadline::Deadline;
use crate::logging::targets;
use crate::sync::{Signalable, WaitOutcome};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// The terminal-state machine of a submitted task.
///
/// Monotone: a task only ever transitions out of `Pending`, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Submitted, not yet finished (queued or running).
    Pending,
    /// The action returned successfully, or voluntarily stopped after
    /// observing cancellation (there is no separate "aborted" state: a
    /// cooperative early return in response to cancellation is
    /// indistinguishable from ordinary success).
    Completed,
    /// The action returned an error, or panicked. [`Task::failure`] holds
    /// the captured textual description.
    Failed,
    /// Accepted but never executed because the pool was tearing down.
    Discarded,
}

/// What a task's action returns: `Ok(())` for success, `Err(message)` for a
/// captured failure. A panic inside the action is caught at the worker
/// boundary and treated the same as `Err`.
pub type ActionResult = std::result::Result<(), String>;

type BoxedAction = Box<dyn FnOnce(CancelToken) -> ActionResult + Send + 'static>;

struct Status {
    state: TaskState,
    failure: Option<String>,
}

struct Inner {
    id: u64,
    action: Mutex<Option<BoxedAction>>,
    cancel: CancelToken,
    status: Mutex<Status>,
    complete_signal: OnceLock<Signalable>,
}

/// A handle to one submission: shared simultaneously by the submitter, the
/// pool's queue (while pending) or the executing worker (while running),
/// and any observers. All are clones of the same `Arc`-backed state, so the
/// underlying storage outlives the last of them.
#[derive(Clone)]
pub struct Task {
    inner: Arc<Inner>,
}

impl Task {
    /// Builds a new, `Pending` task. `cancel` is the caller-supplied token
    /// if any; otherwise the task creates and owns its own.
    ///
    /// `action` receives the task's effective cancel token (own or
    /// supplied) so it can poll `is_cancelled()` without capturing one
    /// itself.
    pub(crate) fn new<F>(action: F, cancel: Option<CancelToken>) -> Self
    where
        F: FnOnce(CancelToken) -> ActionResult + Send + 'static,
    {
        let cancel = cancel.unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
                action: Mutex::new(Some(Box::new(action))),
                cancel,
                status: Mutex::new(Status {
                    state: TaskState::Pending,
                    failure: None,
                }),
                complete_signal: OnceLock::new(),
            }),
        }
    }

    /// A task that is born `Discarded` (the pool is tearing down). No
    /// action is ever invoked.
    pub(crate) fn new_discarded(cancel: Option<CancelToken>) -> Self {
        let task = Self::new(|_| Ok(()), cancel);
        // Drop the action immediately without running it, then finish.
        task.inner.action.lock().take();
        task.finish(TaskState::Discarded, None);
        task
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> TaskState {
        self.inner.status.lock().state
    }

    /// The effective cancel token: the caller-supplied one, or this task's
    /// own embedded token.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    /// The captured failure description, present iff `state() ==
    /// TaskState::Failed`.
    pub fn failure(&self) -> Option<String> {
        self.inner.status.lock().failure.clone()
    }

    /// The completion wait handle, materialised lazily. Pre-set if the task
    /// has already left `Pending`.
    pub fn complete_handle(&self) -> Signalable {
        let sig = self.inner.complete_signal.get_or_init(Signalable::new);
        if self.state() != TaskState::Pending {
            sig.set();
        }
        sig.clone()
    }

    /// Blocks until the task finishes or `deadline` elapses.
    ///
    /// If the caller is the UI thread and a `UiDispatcher` is installed
    /// (and the process is not headless), the wait is delegated to
    /// [`crate::ui::UiDispatcher::modal_wait`] so paint/timer/posted
    /// messages keep flowing; otherwise this performs a passive wait.
    ///
    /// Returns `true` if the task finished before the deadline, `false` on
    /// timeout. If `throw_on_error` is set and the task finished `Failed`,
    /// this **panics** carrying the captured failure message — the
    /// original concrete error cannot be reconstructed across the task
    /// boundary, only its text.
    pub fn wait(&self, throw_on_error: bool, deadline: Deadline) -> bool {
        if self.state() == TaskState::Pending {
            let handle = self.complete_handle();
            let outcome = crate::ui::delegate_wait_if_ui_thread(&handle, deadline);
            if outcome == WaitOutcome::Timeout {
                return false;
            }
        }

        if throw_on_error {
            if let Some(message) = self.failure() {
                panic!("task failed: {message}");
            }
        }
        true
    }

    /// Runs on a worker thread. Precondition: `state() == Pending`.
    ///
    /// Captures the action's outcome (including a caught panic) into
    /// `state`/`failure`, drops the action so captured resources release
    /// promptly, and publishes completion. Never propagates a failure out
    /// of the worker — that is the whole point of the capture.
    pub(crate) fn execute(&self) {
        let action = self
            .inner
            .action
            .lock()
            .take()
            .expect("Task::execute called on a task with no action (already ran or discarded)");

        tracing::trace!(target: targets::TASK, id = self.inner.id, "task starting");
        let cancel = self.inner.cancel.clone();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| action(cancel)));

        let (state, failure) = match outcome {
            Ok(Ok(())) => (TaskState::Completed, None),
            Ok(Err(message)) => (TaskState::Failed, Some(message)),
            Err(panic) => (TaskState::Failed, Some(panic_message(panic))),
        };
        self.finish(state, failure);
    }

    /// Runs when the pool discards a still-pending task at shutdown.
    /// Precondition: `state() == Pending`.
    pub(crate) fn discard(&self) {
        self.inner.action.lock().take();
        self.finish(TaskState::Discarded, None);
    }

    fn finish(&self, state: TaskState, failure: Option<String>) {
        {
            let mut status = self.inner.status.lock();
            status.state = state;
            status.failure = failure;
        }
        // The lock release above happens-before this read; any observer
        // that sees the signal set will, on locking `status`, see the
        // terminal state too.
        if let Some(sig) = self.inner.complete_signal.get() {
            sig.set();
        }
        tracing::trace!(target: targets::TASK, id = self.inner.id, ?state, "task finished");
    }
}

static_assertions::assert_impl_all!(Task: Send, Sync, Clone);

pub(crate) fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

/// A plain FIFO of pending [`Task`]s.
///
/// This is an owned container rather than an intrusive linked list — the
/// allocation-per-submission cost is a fair trade for dropping an intrusive
/// `next` pointer and the aliasing it would require. It holds no
/// synchronization of its own: every access happens while the owning
/// `ThreadPool` holds its single mutex.
#[derive(Default)]
pub(crate) struct TaskQueue {
    items: VecDeque<Task>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn append(&mut self, task: Task) {
        self.items.push_back(task);
    }

    pub(crate) fn extract_front(&mut self) -> Option<Task> {
        self.items.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_pending() {
        let t = Task::new(|_| Ok(()), None);
        assert_eq!(t.state(), TaskState::Pending);
        assert!(t.failure().is_none());
    }

    #[test]
    fn execute_success_completes() {
        let t = Task::new(|_| Ok(()), None);
        t.execute();
        assert_eq!(t.state(), TaskState::Completed);
        assert!(t.failure().is_none());
    }

    #[test]
    fn execute_error_fails_with_message() {
        let t = Task::new(|_| Err("boom".to_string()), None);
        t.execute();
        assert_eq!(t.state(), TaskState::Failed);
        assert_eq!(t.failure().as_deref(), Some("boom"));
    }

    #[test]
    fn execute_panic_is_captured_as_failed() {
        let t = Task::new(|_| panic!("kaboom"), None);
        t.execute();
        assert_eq!(t.state(), TaskState::Failed);
        assert_eq!(t.failure().as_deref(), Some("kaboom"));
    }

    #[test]
    fn abort_via_voluntary_early_return_is_completed() {
        let t = Task::new(
            |cancel| {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                Err("should not happen in this test".to_string())
            },
            None,
        );
        t.cancel_token().cancel();
        t.execute();
        assert_eq!(t.state(), TaskState::Completed);
    }

    #[test]
    fn discard_drops_action_without_running_it() {
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran2 = ran.clone();
        let t = Task::new(
            move |_| {
                ran2.store(true, Ordering::SeqCst);
                Ok(())
            },
            None,
        );
        t.discard();
        assert_eq!(t.state(), TaskState::Discarded);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn new_discarded_task_is_born_discarded() {
        let t = Task::new_discarded(None);
        assert_eq!(t.state(), TaskState::Discarded);
    }

    #[test]
    fn complete_handle_is_preset_for_finished_tasks() {
        let t = Task::new(|_| Ok(()), None);
        t.execute();
        let handle = t.complete_handle();
        assert_eq!(handle.wait(Deadline::elapsed()), WaitOutcome::Signaled);
    }

    #[test]
    fn wait_false_on_timeout_while_pending() {
        let t = Task::new(|_| Ok(()), None);
        assert!(!t.wait(false, Deadline::from_millis(10)));
        assert_eq!(t.state(), TaskState::Pending);
    }

    #[test]
    fn wait_true_after_completion() {
        let t = Task::new(|_| Ok(()), None);
        t.execute();
        assert!(t.wait(false, Deadline::infinite()));
    }

    #[test]
    #[should_panic(expected = "task failed: boom")]
    fn wait_throw_on_error_panics_with_message() {
        let t = Task::new(|_| Err("boom".to_string()), None);
        t.execute();
        t.wait(true, Deadline::infinite());
    }

    #[test]
    fn task_queue_is_fifo() {
        let mut q = TaskQueue::new();
        let a = Task::new(|_| Ok(()), None);
        let b = Task::new(|_| Ok(()), None);
        q.append(a.clone());
        q.append(b.clone());
        assert_eq!(q.len(), 2);
        let first = q.extract_front().unwrap();
        assert!(Arc::ptr_eq(&first.inner, &a.inner));
        let second = q.extract_front().unwrap();
        assert!(Arc::ptr_eq(&second.inner, &b.inner));
        assert!(q.is_empty());
    }
}
