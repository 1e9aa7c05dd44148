//! The host message-pump abstraction.
//!
//! `modal_wait` wants a pull-style platform message queue: peek a message,
//! classify it, dispatch or defer it. `winit`'s event loop is push/callback
//! driven, so [`WinitMessagePump`] adapts it to the same shape the
//! dispatcher needs, and [`RecordingMessagePump`] gives tests a full
//! in-memory stand-in with no window at all. Keeping the platform coupling
//! behind this small trait means the dispatcher itself never needs to know
//! which windowing backend is in use.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;

use parking_lot::Mutex;
use winit::event_loop::EventLoopProxy;

use crate::sync::Signalable;

/// The class of a pending UI message, used by `modal_wait` to decide what
/// may run during a wait and what must wait for the wait to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// A window repaint request.
    Paint,
    /// A timer firing.
    Timer,
    /// A message posted to the UI thread itself rather than to a window —
    /// in this crate, exclusively the dispatcher's own wake-up
    /// notification.
    ThreadPosted,
    /// The application-exit sentinel.
    Quit,
    /// Anything else; never drained or dispatched during `modal_wait`.
    Other,
}

/// One message pulled from the pump.
#[derive(Debug, Clone, Copy)]
pub struct PumpMessage {
    pub class: MessageClass,
}

/// The user-event type routed through `winit`'s `EventLoopProxy`. A typed
/// enum variant, rather than a raw window handle and a reserved message
/// code, is the notification the dispatcher posts to wake the UI thread.
#[derive(Debug, Clone, Copy)]
pub enum HostEvent {
    /// A `UiDispatcher::perform` call queued work; the UI thread should run
    /// its extraction hook.
    UiCallReady,
}

/// The host event-dispatch abstraction `UiDispatcher` is built against.
///
/// Implementors own whatever queue of pending messages the host platform
/// exposes; this crate only needs to: wake the UI thread up, learn when a
/// new permitted-class message has arrived, drain those messages, and hand
/// back non-`ThreadPosted` ones for the host to dispatch.
pub trait MessagePump: Send + Sync {
    /// Wakes the UI thread with a `ThreadPosted`-class notification. This is
    /// the "post a no-op notification message" step of `perform`.
    fn post_wakeup(&self);

    /// Signaled whenever at least one permitted-class message is waiting to
    /// be drained. `modal_wait` includes this handle in its `wait_any` call
    /// so a new message interrupts the wait.
    fn message_signal(&self) -> &Signalable;

    /// Pops every currently queued permitted-class message
    /// (`Paint`/`Timer`/`ThreadPosted`/`Quit`), resetting `message_signal`
    /// if the queue is left empty. Never blocks.
    fn drain_permitted(&self) -> Vec<PumpMessage>;

    /// Dispatches a non-`ThreadPosted`, non-`Quit` message that `modal_wait`
    /// decided should run now. `ThreadPosted` messages are handled by the
    /// dispatcher's own extraction hook and never reach this method.
    fn dispatch(&self, message: &PumpMessage);

    /// Re-queues the application-exit sentinel after a `modal_wait` that
    /// deferred it, so the outer message loop observes it once the wait
    /// returns.
    fn repost_quit(&self);
}

#[derive(Default)]
struct Queue {
    items: VecDeque<PumpMessage>,
}

/// Production [`MessagePump`] wired to a `winit::event_loop::EventLoopProxy`.
///
/// `winit` delivers paint and timer activity through its own callback-based
/// `ApplicationHandler` methods rather than a queue this crate can peek, so
/// in a real integration `drain_permitted` only ever yields `ThreadPosted`
/// messages (the dispatcher's own wake-ups, fed in via [`Self::enqueue`] from
/// the host's `user_event` handler). `Paint`/`Timer` classification exists so
/// the class-filtering logic in `modal_wait` is exercised uniformly in tests
/// against [`RecordingMessagePump`]; `dispatch` and `repost_quit` are no-ops
/// here because `winit` owns that machinery directly.
pub struct WinitMessagePump {
    proxy: StdMutex<EventLoopProxy<HostEvent>>,
    signal: Signalable,
    queue: Mutex<Queue>,
}

impl WinitMessagePump {
    pub fn new(proxy: EventLoopProxy<HostEvent>) -> Self {
        Self {
            proxy: StdMutex::new(proxy),
            signal: Signalable::new(),
            queue: Mutex::new(Queue {
                items: VecDeque::new(),
            }),
        }
    }

    /// Feeds a message the host observed (typically `HostEvent::UiCallReady`
    /// arriving in `ApplicationHandler::user_event`) into the drainable
    /// queue for a `modal_wait` in progress.
    pub fn enqueue(&self, message: PumpMessage) {
        self.queue.lock().items.push_back(message);
        self.signal.set();
    }
}

impl MessagePump for WinitMessagePump {
    fn post_wakeup(&self) {
        // The proxy wakes the event loop; the payload itself carries no
        // data; the host's `user_event` handler is expected to call
        // `enqueue` with a `ThreadPosted` message in response.
        let _ = self.proxy.lock().unwrap().send_event(HostEvent::UiCallReady);
    }

    fn message_signal(&self) -> &Signalable {
        &self.signal
    }

    fn drain_permitted(&self) -> Vec<PumpMessage> {
        let mut queue = self.queue.lock();
        let drained: Vec<_> = queue.items.drain(..).collect();
        if queue.items.is_empty() {
            self.signal.reset();
        }
        drained
    }

    fn dispatch(&self, _message: &PumpMessage) {}

    fn repost_quit(&self) {}
}

/// In-memory [`MessagePump`] for tests: no window, no `winit` event loop.
/// Exercises the full `MessageClass` set, unlike [`WinitMessagePump`].
#[derive(Default)]
pub struct RecordingMessagePump {
    signal: Signalable,
    queue: Mutex<Queue>,
    dispatched: Mutex<Vec<MessageClass>>,
    wakeups: AtomicUsize,
    quit_reposted: AtomicUsize,
}

impl RecordingMessagePump {
    pub fn new() -> Self {
        Self {
            signal: Signalable::new(),
            queue: Mutex::new(Queue {
                items: VecDeque::new(),
            }),
            dispatched: Mutex::new(Vec::new()),
            wakeups: AtomicUsize::new(0),
            quit_reposted: AtomicUsize::new(0),
        }
    }

    /// Simulates an externally-arriving message of the given class (e.g. a
    /// test injecting a paint message during a `modal_wait`).
    pub fn inject(&self, class: MessageClass) {
        self.queue.lock().items.push_back(PumpMessage { class });
        self.signal.set();
    }

    pub fn wakeup_count(&self) -> usize {
        self.wakeups.load(Ordering::SeqCst)
    }

    pub fn dispatched(&self) -> Vec<MessageClass> {
        self.dispatched.lock().clone()
    }

    pub fn quit_reposted_count(&self) -> usize {
        self.quit_reposted.load(Ordering::SeqCst)
    }
}

impl MessagePump for RecordingMessagePump {
    fn post_wakeup(&self) {
        self.wakeups.fetch_add(1, Ordering::SeqCst);
        self.inject(MessageClass::ThreadPosted);
    }

    fn message_signal(&self) -> &Signalable {
        &self.signal
    }

    fn drain_permitted(&self) -> Vec<PumpMessage> {
        let mut queue = self.queue.lock();
        let drained: Vec<_> = queue.items.drain(..).collect();
        if queue.items.is_empty() {
            self.signal.reset();
        }
        drained
    }

    fn dispatch(&self, message: &PumpMessage) {
        self.dispatched.lock().push(message.class);
    }

    fn repost_quit(&self) {
        self.quit_reposted.fetch_add(1, Ordering::SeqCst);
        self.inject(MessageClass::Quit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadline::Deadline;
    use crate::sync::WaitOutcome;

    #[test]
    fn post_wakeup_enqueues_a_thread_posted_message_and_signals() {
        let pump = RecordingMessagePump::new();
        pump.post_wakeup();
        assert_eq!(pump.wakeup_count(), 1);
        assert_eq!(
            pump.message_signal().wait(Deadline::elapsed()),
            WaitOutcome::Signaled
        );
        let drained = pump.drain_permitted();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].class, MessageClass::ThreadPosted);
    }

    #[test]
    fn drain_permitted_resets_signal_once_empty() {
        let pump = RecordingMessagePump::new();
        pump.inject(MessageClass::Paint);
        pump.drain_permitted();
        assert_eq!(
            pump.message_signal().wait(Deadline::elapsed()),
            WaitOutcome::Timeout
        );
    }

    #[test]
    fn dispatch_records_message_class() {
        let pump = RecordingMessagePump::new();
        pump.dispatch(&PumpMessage {
            class: MessageClass::Paint,
        });
        assert_eq!(pump.dispatched(), vec![MessageClass::Paint]);
    }
}
