//! The bounded-FIFO thread pool: [`ThreadPool`] and [`ThreadPoolConfig`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::cancel::CancelToken;
use crate::error::{Result, TaskforgeError};
use crate::logging::targets;
use crate::task::{ActionResult, Task, TaskQueue};

static WORKER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Tunables for [`ThreadPool::new`].
///
/// `Default` sizes a locally constructed pool to the logical CPU count. The
/// process-global default pool uses its own, more permissive numbers instead
/// — see [`crate::pool::default_pool`].
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Upper bound on live worker threads. Must be ≥ 1.
    pub max_threads: usize,
    /// Upper bound on queued, not-yet-dequeued tasks. Must be ≥ 1.
    pub max_queue_len: usize,
    /// How long an idle worker waits for a task before exiting.
    pub idle_timeout_ms: u64,
    /// Per-worker stack size in KiB, or `0` for the platform default.
    pub stack_size_kb: usize,
    /// Thread name prefix, for diagnostics only.
    pub name: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            max_threads: num_cpus::get().max(1),
            max_queue_len: usize::MAX,
            idle_timeout_ms: 15_000,
            stack_size_kb: 0,
            name: "taskforge-worker".to_string(),
        }
    }
}

impl ThreadPoolConfig {
    pub fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = n;
        self
    }

    pub fn max_queue_len(mut self, n: usize) -> Self {
        self.max_queue_len = n;
        self
    }

    pub fn idle_timeout_ms(mut self, ms: u64) -> Self {
        self.idle_timeout_ms = ms;
        self
    }

    pub fn stack_size_kb(mut self, kb: usize) -> Self {
        self.stack_size_kb = kb;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// The process-global default pool's configuration: generous enough for
/// ad-hoc background work across a whole application (`max_threads = 2000`,
/// `max_queue_len = 2^32 - 1`, `idle_timeout = 15_000ms`, platform-default
/// stack size).
fn default_pool_config() -> ThreadPoolConfig {
    ThreadPoolConfig {
        max_threads: 2000,
        max_queue_len: u32::MAX as usize,
        idle_timeout_ms: 15_000,
        stack_size_kb: 0,
        name: "taskforge-default".to_string(),
    }
}

struct PoolState {
    queue: TaskQueue,
    total_count: usize,
    idle_count: usize,
    idle_timeout: Duration,
    workers: Vec<(u64, JoinHandle<()>)>,
    /// Ids of workers that have decided to exit (idle-reaped) but whose
    /// handle a worker can never join for itself. Drained opportunistically
    /// by `take_retired` from whichever thread next touches `workers`, so
    /// the vec stays bounded by live worker count over a long-running pool
    /// instead of growing by one `JoinHandle` per reaped thread forever.
    retiring: Vec<u64>,
}

impl PoolState {
    /// Removes and returns the handles of every retired worker except
    /// `keep` (a worker must never try to join its own handle; that would
    /// deadlock, since it has not returned yet).
    fn take_retired(&mut self, keep: Option<u64>) -> Vec<JoinHandle<()>> {
        if self.retiring.is_empty() {
            return Vec::new();
        }
        let mut taken = Vec::new();
        let mut i = 0;
        while i < self.workers.len() {
            let id = self.workers[i].0;
            if Some(id) != keep && self.retiring.contains(&id) {
                let (id, handle) = self.workers.remove(i);
                self.retiring.retain(|&r| r != id);
                taken.push(handle);
            } else {
                i += 1;
            }
        }
        taken
    }
}

struct Inner {
    state: Mutex<PoolState>,
    cv_item: Condvar,
    cv_space: Condvar,
    cv_idle: Condvar,
    /// Lock-free fast-path flag, mirrored inside `state` writes so the two
    /// never disagree; lets `submit` skip the mutex entirely once the pool
    /// is known to be tearing down.
    destroying: AtomicBool,
    max_queue: usize,
    max_threads: usize,
    stack_size_kb: usize,
    name: String,
}

enum SpawnDecision {
    WakeOne,
    SpawnOne,
    Nothing,
}

/// A bounded-FIFO thread pool with backpressure, elastic worker spawning,
/// idle-thread reaping, and deadlock-free shutdown.
///
/// Workers are real OS threads, symmetric and stateless between tasks.
/// There is no work-stealing and no priority scheduling — tasks run in
/// strict submission order per pool.
pub struct ThreadPool {
    inner: Arc<Inner>,
}

static_assertions::assert_impl_all!(ThreadPool: Send, Sync);

impl ThreadPool {
    /// Builds a pool with no threads yet running; the first `submit` spawns
    /// the first worker.
    pub fn new(config: ThreadPoolConfig) -> Self {
        let max_threads = config.max_threads.max(1);
        let max_queue = config.max_queue_len.max(1);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(PoolState {
                    queue: TaskQueue::new(),
                    total_count: 0,
                    idle_count: 0,
                    idle_timeout: Duration::from_millis(config.idle_timeout_ms),
                    workers: Vec::new(),
                    retiring: Vec::new(),
                }),
                cv_item: Condvar::new(),
                cv_space: Condvar::new(),
                cv_idle: Condvar::new(),
                destroying: AtomicBool::new(false),
                max_queue,
                max_threads,
                stack_size_kb: config.stack_size_kb,
                name: config.name,
            }),
        }
    }

    /// Submits `action` for execution. `action` receives the task's
    /// effective cancel token.
    ///
    /// If the pool is tearing down, the returned task is born `Discarded`
    /// and `action` is dropped without running — this is not treated as an
    /// error; submission after shutdown is a routine race, not a misuse.
    ///
    /// Blocks (inside the pool mutex) while the queue is full, providing
    /// backpressure.
    ///
    /// # Errors
    ///
    /// Returns [`TaskforgeError::SpawnFailed`] if this submission needed a
    /// new worker thread and the platform refused to create one. The task
    /// remains queued; an existing worker may still pick it up.
    pub fn submit<F>(&self, action: F, cancel: Option<CancelToken>) -> Result<Task>
    where
        F: FnOnce(CancelToken) -> ActionResult + Send + 'static,
    {
        if self.inner.destroying.load(Ordering::Acquire) {
            return Ok(Task::new_discarded(cancel));
        }

        let task = Task::new(action, cancel);

        let decision = {
            let mut state = self.inner.state.lock();
            if self.inner.destroying.load(Ordering::Acquire) {
                drop(state);
                task.discard();
                return Ok(task);
            }
            while state.queue.len() >= self.inner.max_queue {
                self.inner.cv_space.wait(&mut state);
                if self.inner.destroying.load(Ordering::Acquire) {
                    drop(state);
                    task.discard();
                    return Ok(task);
                }
            }

            state.queue.append(task.clone());
            if state.idle_count > 0 {
                SpawnDecision::WakeOne
            } else if state.total_count < self.inner.max_threads {
                state.total_count += 1;
                SpawnDecision::SpawnOne
            } else {
                SpawnDecision::Nothing
            }
        };

        match decision {
            SpawnDecision::WakeOne => {
                self.inner.cv_item.notify_one();
            }
            SpawnDecision::SpawnOne => match spawn_worker(&self.inner) {
                Ok((id, handle)) => {
                    let mut state = self.inner.state.lock();
                    state.workers.push((id, handle));
                    let retired = state.take_retired(None);
                    drop(state);
                    for handle in retired {
                        let _ = handle.join();
                    }
                }
                Err(io_err) => {
                    self.inner.state.lock().total_count -= 1;
                    return Err(TaskforgeError::SpawnFailed(io_err.to_string()));
                }
            },
            SpawnDecision::Nothing => {}
        }

        tracing::trace!(target: targets::POOL, pool = %self.inner.name, "task submitted");
        Ok(task)
    }

    /// Blocks until the queue is empty and every worker is idle. Does not
    /// change pool state; the caller is responsible for avoiding races with
    /// concurrent submissions that would make this loop forever.
    pub fn wait_idle(&self) {
        let mut state = self.inner.state.lock();
        while !(state.queue.is_empty() && state.idle_count == state.total_count) {
            self.inner.cv_idle.wait(&mut state);
        }
    }

    /// Live worker thread count.
    pub fn total_count(&self) -> usize {
        self.inner.state.lock().total_count
    }

    /// Workers currently blocked waiting for a task.
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle_count
    }

    /// Tasks currently queued (submitted, not yet picked up by a worker).
    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn max_threads(&self) -> usize {
        self.inner.max_threads
    }

    pub fn max_queue_len(&self) -> usize {
        self.inner.max_queue
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Step 1: must precede steps 2/3 so a racing `submit` observes
        // `destroying` and returns a `Discarded` task instead of enqueueing
        // into a dying pool.
        self.inner.destroying.store(true, Ordering::Release);

        let handles = {
            let mut state = self.inner.state.lock();
            // Step 2: idle workers exit on their very next loop iteration.
            state.idle_timeout = Duration::ZERO;
            // Step 3.
            self.inner.cv_item.notify_all();

            // Step 4: discard whatever never started, then wait for every
            // in-flight task to finish and every worker to exit. Tasks
            // already running are not interrupted — cancellation is
            // cooperative, never forced.
            while let Some(task) = state.queue.extract_front() {
                task.discard();
            }
            while state.total_count != 0 {
                self.inner.cv_idle.wait(&mut state);
            }

            debug_assert!(state.queue.is_empty());
            debug_assert_eq!(state.idle_count, 0);
            std::mem::take(&mut state.workers)
        };

        for (_, handle) in handles {
            let _ = handle.join();
        }

        tracing::debug!(target: targets::POOL, pool = %self.inner.name, "thread pool shut down");
    }
}

fn spawn_worker(inner: &Arc<Inner>) -> std::io::Result<(u64, JoinHandle<()>)> {
    let id = WORKER_SEQ.fetch_add(1, Ordering::Relaxed);
    let worker_inner = inner.clone();
    let mut builder = std::thread::Builder::new().name(format!("{}-{}", inner.name, id));
    if inner.stack_size_kb > 0 {
        builder = builder.stack_size(inner.stack_size_kb * 1024);
    }
    let handle = builder.spawn(move || worker_loop(&worker_inner, id))?;
    Ok((id, handle))
}

fn worker_loop(inner: &Arc<Inner>, id: u64) {
    loop {
        let mut state = inner.state.lock();
        state.idle_count += 1;
        let deadline = crate::deadline::Deadline::from_duration(state.idle_timeout);

        let task = loop {
            if let Some(task) = state.queue.extract_front() {
                break Some(task);
            }
            if state.idle_count == state.total_count {
                inner.cv_idle.notify_all();
            }
            // Re-read `idle_timeout` live (rather than trusting only the
            // deadline snapshotted at loop entry) so a shutdown zeroing it
            // out is honored immediately, even for a worker already
            // mid-wait on a much longer original deadline.
            if state.idle_timeout.is_zero() {
                break None;
            }
            let remaining = match deadline.remaining() {
                Some(remaining) if remaining.is_zero() => break None,
                Some(remaining) => remaining,
                None => unreachable!("idle deadline is always finite for a worker"),
            };
            let result = inner.cv_item.wait_for(&mut state, remaining);
            if result.timed_out() && state.queue.is_empty() {
                break None;
            }
            // Otherwise loop: either a task arrived, or this was a
            // spurious wake-up; re-checking the queue handles both.
        };

        match task {
            Some(task) => {
                state.idle_count -= 1;
                drop(state);
                inner.cv_space.notify_one();
                task.execute();
            }
            None => {
                state.total_count -= 1;
                state.idle_count -= 1;
                state.retiring.push(id);
                let retired = state.take_retired(Some(id));
                if state.total_count == 0 {
                    inner.cv_idle.notify_all();
                }
                drop(state);
                for handle in retired {
                    let _ = handle.join();
                }
                return;
            }
        }
    }
}

static DEFAULT_POOL: OnceLock<ThreadPool> = OnceLock::new();

/// Explicitly initializes the process-global default pool with a specific
/// configuration. Optional — [`default_pool`] lazily initializes it with its
/// own default numbers on first use if this was never called.
///
/// # Errors
///
/// Returns [`TaskforgeError::DefaultPoolAlreadyInitialized`] if the default
/// pool was already constructed, whether by a prior call to this function or
/// by an earlier [`default_pool`]/[`submit_to_default`] call.
pub fn init_default_pool(config: ThreadPoolConfig) -> Result<()> {
    DEFAULT_POOL
        .set(ThreadPool::new(config))
        .map_err(|_| TaskforgeError::DefaultPoolAlreadyInitialized)
}

/// The lazily constructed, process-global default pool, built with
/// [`default_pool_config`] if nothing initialized it first.
pub fn default_pool() -> &'static ThreadPool {
    DEFAULT_POOL.get_or_init(|| ThreadPool::new(default_pool_config()))
}

/// Convenience wrapper for `default_pool().submit(..)`.
pub fn submit_to_default<F>(action: F, cancel: Option<CancelToken>) -> Result<Task>
where
    F: FnOnce(CancelToken) -> ActionResult + Send + 'static,
{
    default_pool().submit(action, cancel)
}
