//! Core systems for taskforge.
//!
//! This crate provides the foundational components of a thread pool for
//! long-running desktop applications that mix CPU-bound work, I/O-bound
//! work, and interactive UI updates:
#![warn(missing_docs)]
//!
//! - **ThreadPool**: a bounded-FIFO task queue drained by an elastic set of
//!   worker threads, with backpressure, idle-thread reaping, and
//!   deadlock-free shutdown.
//! - **Task / CancelToken**: the lifecycle of a submitted unit of work, its
//!   terminal-state machine, failure capture, and cooperative cancellation.
//! - **UiDispatcher**: a cross-thread remote-invocation primitive that lets
//!   background tasks run work on a single, distinguished UI thread, plus a
//!   companion modal wait that keeps paint/timer/cross-thread-post messages
//!   flowing while a UI-thread wait is in progress.
//!
//! # ThreadPool example
//!
//! ```
//! use taskforge_core::{ThreadPool, ThreadPoolConfig, Deadline};
//!
//! let pool = ThreadPool::new(ThreadPoolConfig::default().max_threads(2));
//! let task = pool.submit(|_cancel| {
//!     // do work
//!     Ok(())
//! }, None).unwrap();
//! assert!(task.wait(true, Deadline::from_millis(1000)));
//! ```
//!
//! # Cancellation example
//!
//! ```
//! use taskforge_core::{CancelToken, ThreadPool, ThreadPoolConfig, Deadline};
//!
//! let pool = ThreadPool::new(ThreadPoolConfig::default());
//! let cancel = CancelToken::new();
//! let task = pool.submit(
//!     |cancel| {
//!         while !cancel.is_cancelled() {
//!             std::thread::sleep(std::time::Duration::from_millis(5));
//!         }
//!         Ok(())
//!     },
//!     Some(cancel.clone()),
//! ).unwrap();
//! cancel.cancel();
//! assert!(task.wait(true, Deadline::from_millis(1000)));
//! ```

mod cancel;
mod deadline;
mod error;
pub mod logging;
mod pool;
mod sync;
mod task;
pub mod thread_check;
pub mod ui;

pub use cancel::CancelToken;
pub use deadline::Deadline;
pub use error::{Result, TaskforgeError};
pub use pool::{default_pool, init_default_pool, submit_to_default, ThreadPool, ThreadPoolConfig};
pub use sync::{AnyOutcome, Signalable, WaitOutcome};
pub use task::{ActionResult, Task, TaskState};
pub use thread_check::{is_main_thread, main_thread_id};
pub use ui::{
    is_headless, set_headless, HostEvent, MessageClass, MessagePump, PumpMessage,
    RecordingMessagePump, UiDispatcher, WinitMessagePump,
};
