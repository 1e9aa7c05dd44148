//! The UI-thread injection protocol: [`UiDispatcher`] plus the
//! [`MessagePump`] abstraction it drives its platform coupling through.

pub mod dispatcher;
pub mod pump;

pub use dispatcher::{is_headless, set_headless, UiDispatcher};
pub use pump::{HostEvent, MessageClass, MessagePump, PumpMessage, RecordingMessagePump, WinitMessagePump};

pub(crate) use dispatcher::delegate_wait_if_ui_thread;
