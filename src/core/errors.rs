use thiserror::Error;

use crate::core::failure::CallFailure;

/// The owner's run loop is not running (not yet started, or already stopped),
/// so it cannot be woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("owner run loop is not running")]
pub struct RunLoopUnavailable;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The owner's run loop could not be woken at submission time.
    #[error("owner run loop is unavailable")]
    RunLoopUnavailable,
    /// The callable failed while running on the owner thread.
    #[error("call failed on the owner thread: {0}")]
    CallFailed(CallFailure),
    /// A drain pass was entered from inside another drain pass.
    #[error("drain re-entered while a drain pass was running")]
    ReentrancyViolation,
    #[error("operation must run on the owner thread")]
    NotOwnerThread,
    /// The dispatcher was shut down before the call could run.
    #[error("dispatcher has been shut down")]
    ShutDown,
    #[error("pending queue is full ({capacity} calls)")]
    QueueFull { capacity: usize },
}

impl From<RunLoopUnavailable> for DispatchError {
    fn from(_: RunLoopUnavailable) -> Self {
        Self::RunLoopUnavailable
    }
}
