use std::sync::Arc;

use crate::core::completion::{CallHandle, Completion};
use crate::core::errors::DispatchError;
use crate::core::failure::{CallFailure, invoke_caught};

/// Whether the caller waits for the owner thread to run the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallMode {
    Synchronous,
    Asynchronous,
}

trait Invoke: Send {
    fn invoke(self: Box<Self>) -> Result<(), CallFailure>;
    fn abandon(self: Box<Self>, reason: DispatchError);
}

struct SyncCall<F, R> {
    callable: Option<F>,
    completion: Arc<Completion<R>>,
}

impl<F, R> Invoke for SyncCall<F, R>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    fn invoke(mut self: Box<Self>) -> Result<(), CallFailure> {
        let Some(callable) = self.callable.take() else {
            return Ok(());
        };

        match invoke_caught(callable) {
            Ok(value) => {
                self.completion.post(Ok(value));
                Ok(())
            }
            Err(failure) => {
                self.completion
                    .post(Err(DispatchError::CallFailed(failure.clone())));
                Err(failure)
            }
        }
    }

    fn abandon(mut self: Box<Self>, reason: DispatchError) {
        self.callable = None;
        self.completion.post(Err(reason));
    }
}

impl<F, R> Drop for SyncCall<F, R> {
    fn drop(&mut self) {
        // Dropped unexecuted, e.g. with its dispatcher: never leave the caller waiting.
        if self.completion.is_pending() {
            self.completion.post(Err(DispatchError::ShutDown));
        }
    }
}

struct AsyncCall<F> {
    callable: F,
}

impl<F> Invoke for AsyncCall<F>
where
    F: FnOnce() + Send,
{
    fn invoke(self: Box<Self>) -> Result<(), CallFailure> {
        invoke_caught(self.callable)
    }

    fn abandon(self: Box<Self>, _reason: DispatchError) {}
}

/// A single call marshaled to the owner thread.
///
/// Built on the calling thread, executed (or abandoned) exactly once, since
/// both operations consume the envelope.
pub(crate) struct CallEnvelope {
    id: u64,
    mode: CallMode,
    call: Box<dyn Invoke>,
}

impl CallEnvelope {
    pub(crate) fn synchronous<F, R>(id: u64, callable: F) -> (Self, CallHandle<R>)
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let completion = Arc::new(Completion::new());
        let envelope = Self {
            id,
            mode: CallMode::Synchronous,
            call: Box::new(SyncCall {
                callable: Some(callable),
                completion: Arc::clone(&completion),
            }),
        };

        (envelope, CallHandle::new(completion))
    }

    pub(crate) fn asynchronous<F>(id: u64, callable: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id,
            mode: CallMode::Asynchronous,
            call: Box::new(AsyncCall { callable }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn mode(&self) -> CallMode {
        self.mode
    }

    /// Runs the callable on the current thread and posts its outcome.
    ///
    /// A failure is posted to a synchronous caller and also returned here
    /// for diagnostics.
    pub(crate) fn execute(self) -> Result<(), CallFailure> {
        self.call.invoke()
    }

    /// Drops the callable without running it, failing a synchronous caller
    /// with `reason`.
    pub(crate) fn abandon(self, reason: DispatchError) {
        self.call.abandon(reason);
    }
}

impl std::fmt::Debug for CallEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallEnvelope")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
