use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

/// A failure raised by a dispatched callable while it ran.
///
/// Panics are the failure channel for dispatched closures: the payload is
/// captured where the closure ran and carried back to the caller as this
/// value, so the owner thread's run loop never unwinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CallFailure {
    message: String,
}

impl CallFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Builds a failure from a panic payload, keeping the message when the
    /// payload is a string.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_string(),
                Err(_) => "callable panicked with a non-string payload".to_string(),
            },
        };

        Self { message }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Runs `callable`, converting a panic into a [`CallFailure`].
pub(crate) fn invoke_caught<F, R>(callable: F) -> Result<R, CallFailure>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(callable)).map_err(CallFailure::from_panic)
}
