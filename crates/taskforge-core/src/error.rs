//! Error types for taskforge.

use std::fmt;

/// The crate's error type.
#[derive(Debug)]
pub enum TaskforgeError {
    /// The platform refused to create a worker thread. The task that
    /// triggered the spawn attempt remains queued; an existing worker may
    /// still pick it up.
    SpawnFailed(String),
    /// `UiDispatcher::install` was called more than once.
    AlreadyInstalled,
    /// The default global pool has already been initialized via
    /// `init_default_pool`.
    DefaultPoolAlreadyInitialized,
}

impl fmt::Display for TaskforgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed(msg) => write!(f, "failed to spawn worker thread: {msg}"),
            Self::AlreadyInstalled => write!(f, "UI dispatcher has already been installed"),
            Self::DefaultPoolAlreadyInitialized => {
                write!(f, "the default thread pool has already been initialized")
            }
        }
    }
}

impl std::error::Error for TaskforgeError {}

/// A specialized `Result` for taskforge operations.
pub type Result<T> = std::result::Result<T, TaskforgeError>;
