//! Error types for crossqueue.
//!
//! Only structural failures are errors here. Disconnected, expired, and
//! blocked are ordinary boolean states reported by [`Connection`] and
//! friends, never `Err` values.
//!
//! [`Connection`]: crate::connection::Connection

use thiserror::Error;

/// Errors raised by task-runner operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The runner has been stopped and no longer accepts tasks.
    #[error("task runner has been stopped")]
    Stopped,
    /// The runner's task channel is at capacity.
    #[error("task runner queue is full")]
    Full,
    /// No runner with this name is registered.
    #[error("no task runner named `{0}` is registered")]
    UnknownRunner(String),
    /// A runner with this name already exists in the registry.
    #[error("a task runner named `{0}` is already registered")]
    AlreadyRegistered(String),
}

/// A specialized `Result` for crossqueue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
