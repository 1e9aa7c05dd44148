//! End-to-end scenarios spanning more than one module: a real `ThreadPool`
//! submitting work, a real `CancelToken` interrupting it mid-flight, and the
//! `UiDispatcher`/`Task::wait` integration that keeps the UI thread pumping
//! messages while it blocks on a background task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskforge_core::{
    submit_to_default, CancelToken, Deadline, MessageClass, RecordingMessagePump, ThreadPool,
    ThreadPoolConfig, UiDispatcher,
};

#[test]
fn fifo_single_worker_preserves_submission_order() {
    let pool = ThreadPool::new(ThreadPoolConfig::default().max_threads(1));
    let order = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let order = order.clone();
            pool.submit(
                move |_cancel| {
                    order.lock().unwrap().push(i);
                    Ok(())
                },
                None,
            )
            .unwrap()
        })
        .collect();

    for task in &tasks {
        assert!(task.wait(true, Deadline::from_millis(2000)));
    }
    assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
}

#[test]
fn cancelling_midflight_stops_a_cooperative_task_early() {
    let pool = ThreadPool::new(ThreadPoolConfig::default().max_threads(2));
    let cancel = CancelToken::new();
    let iterations = Arc::new(AtomicUsize::new(0));
    let iterations2 = iterations.clone();

    let task = pool
        .submit(
            move |cancel| {
                loop {
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    iterations2.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                }
            },
            Some(cancel.clone()),
        )
        .unwrap();

    std::thread::sleep(Duration::from_millis(30));
    cancel.cancel();

    assert!(task.wait(true, Deadline::from_millis(2000)));
    assert!(iterations.load(Ordering::SeqCst) > 0);
}

#[test]
fn failed_task_wait_panics_carrying_the_captured_message() {
    let pool = ThreadPool::new(ThreadPoolConfig::default().max_threads(1));
    let task = pool
        .submit(|_cancel| Err("disk full".to_string()), None)
        .unwrap();

    // Don't use throw_on_error so we can inspect the captured failure
    // ourselves before separately exercising the panic path.
    assert!(task.wait(false, Deadline::from_millis(1000)));
    assert_eq!(task.failure().as_deref(), Some("disk full"));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        task.wait(true, Deadline::infinite());
    }));
    assert!(result.is_err());
}

#[test]
fn shutdown_drains_in_flight_work_and_discards_the_rest() {
    let pool = ThreadPool::new(
        ThreadPoolConfig::default()
            .max_threads(1)
            .max_queue_len(64),
    );
    let gate = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let gate2 = gate.clone();
    let first = pool
        .submit(
            move |_cancel| {
                while !gate2.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            },
            None,
        )
        .unwrap();

    let never_ran = Arc::new(AtomicUsize::new(0));
    let mut rest = Vec::new();
    for _ in 0..15 {
        let never_ran = never_ran.clone();
        rest.push(
            pool.submit(
                move |_cancel| {
                    never_ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                None,
            )
            .unwrap(),
        );
    }

    gate.store(true, Ordering::SeqCst);
    drop(pool);

    assert!(first.wait(false, Deadline::elapsed()));
    assert_eq!(never_ran.load(Ordering::SeqCst), 0);
    for task in &rest {
        assert_eq!(task.state(), taskforge_core::TaskState::Discarded);
    }
}

#[test]
fn default_pool_runs_submitted_work() {
    let task = submit_to_default(|_cancel| Ok(()), None).unwrap();
    assert!(task.wait(true, Deadline::from_millis(2000)));
}

/// The UI thread submits long-running work to a pool, then waits for it with
/// `Task::wait`. While that wait is outstanding, `modal_wait` (reached via
/// the wait's delegation into the installed dispatcher) keeps draining a
/// paint message injected from the worker, proving the UI thread never
/// blocks in a way that would freeze repainting.
#[test]
fn task_wait_on_the_ui_thread_keeps_pumping_paint_messages_until_the_task_finishes() {
    let pump = Arc::new(RecordingMessagePump::new());
    UiDispatcher::global()
        .install(Box::new(SharedPump(pump.clone())))
        .expect("only this test installs the process dispatcher");

    let pool = ThreadPool::new(ThreadPoolConfig::default().max_threads(1));
    let pump_for_worker = pump.clone();
    let task = pool
        .submit(
            move |_cancel| {
                std::thread::sleep(Duration::from_millis(30));
                pump_for_worker.inject(MessageClass::Paint);
                std::thread::sleep(Duration::from_millis(30));
                Ok(())
            },
            None,
        )
        .unwrap();

    assert!(task.wait(true, Deadline::from_millis(2000)));
    assert!(pump.dispatched().contains(&MessageClass::Paint));
}

struct SharedPump(Arc<RecordingMessagePump>);

impl taskforge_core::MessagePump for SharedPump {
    fn post_wakeup(&self) {
        self.0.post_wakeup()
    }
    fn message_signal(&self) -> &taskforge_core::Signalable {
        self.0.message_signal()
    }
    fn drain_permitted(&self) -> Vec<taskforge_core::PumpMessage> {
        self.0.drain_permitted()
    }
    fn dispatch(&self, message: &taskforge_core::PumpMessage) {
        self.0.dispatch(message)
    }
    fn repost_quit(&self) {
        self.0.repost_quit()
    }
}
