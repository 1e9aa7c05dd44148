//! Tracing span/target conventions used throughout taskforge.
//!
//! taskforge uses the `tracing` crate for instrumentation. Install a
//! subscriber in your application to see logs:
//!
//! ```ignore
//! tracing_subscriber::fmt::init();
//! ```

/// Target names for log filtering with `tracing` directives, e.g.
/// `RUST_LOG=taskforge_core::pool=debug`.
pub mod targets {
    /// The thread pool: submission, dispatch, idle reaping, shutdown.
    pub const POOL: &str = "taskforge_core::pool";
    /// Individual task lifecycle (execute/discard/state transitions).
    pub const TASK: &str = "taskforge_core::task";
    /// Cancellation token state changes.
    pub const CANCEL: &str = "taskforge_core::cancel";
    /// The UI dispatcher: `perform`, extraction hook, `modal_wait`.
    pub const UI_DISPATCH: &str = "taskforge_core::ui_dispatch";
}

#[cfg(test)]
mod tests {
    use super::targets;

    #[test]
    fn targets_are_namespaced_under_the_crate() {
        for t in [targets::POOL, targets::TASK, targets::CANCEL, targets::UI_DISPATCH] {
            assert!(t.starts_with("taskforge_core::"));
        }
    }
}
