//! One-shot result slot shared by the owner thread and a waiting caller.
//!
//! The owner thread is the single writer and the submitting caller the single
//! reader. The slot's mutex and condvar provide the happens-before edge between
//! the owner's write and the caller's read.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::core::errors::DispatchError;

pub(crate) type Outcome<R> = Result<R, DispatchError>;

enum Slot<R> {
    Pending,
    Ready(Outcome<R>),
    Taken,
}

pub(crate) struct Completion<R> {
    slot: Mutex<Slot<R>>,
    ready: Condvar,
}

impl<R> Completion<R> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending),
            ready: Condvar::new(),
        }
    }

    /// Stores the outcome and releases the waiter.
    ///
    /// Only the first post is kept; returns `false` when the slot was already
    /// written.
    pub(crate) fn post(&self, outcome: Outcome<R>) -> bool {
        let mut slot = self.lock();

        if !matches!(*slot, Slot::Pending) {
            return false;
        }

        *slot = Slot::Ready(outcome);
        drop(slot);
        self.ready.notify_all();

        true
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(*self.lock(), Slot::Pending)
    }

    fn wait_ready(&self, timeout: Duration) -> bool {
        let slot = self.lock();
        let (slot, _) = self
            .ready
            .wait_timeout_while(slot, timeout, |slot| matches!(slot, Slot::Pending))
            .unwrap_or_else(PoisonError::into_inner);

        !matches!(*slot, Slot::Pending)
    }

    fn take(&self) -> Outcome<R> {
        let mut slot = self.lock();

        loop {
            match std::mem::replace(&mut *slot, Slot::Taken) {
                Slot::Ready(outcome) => return outcome,
                Slot::Pending => {
                    *slot = Slot::Pending;
                    slot = self.ready.wait(slot).unwrap_or_else(PoisonError::into_inner);
                }
                Slot::Taken => unreachable!("completion outcome is taken by its only handle"),
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<R>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The caller's side of a dispatched call.
///
/// Returned by [`Dispatcher::submit`](crate::Dispatcher::submit). Waiting has
/// no built-in bound; [`CallHandle::wait_timeout`] lets the caller apply one.
/// Giving up on the wait does not cancel the call: it still runs on the owner
/// thread at the next drain.
pub struct CallHandle<R> {
    completion: Arc<Completion<R>>,
}

impl<R> CallHandle<R> {
    pub(crate) fn new(completion: Arc<Completion<R>>) -> Self {
        Self { completion }
    }

    /// A handle whose outcome is already known, used by the owner-thread
    /// fast path.
    pub(crate) fn ready(outcome: Outcome<R>) -> Self {
        let completion = Arc::new(Completion::new());
        completion.post(outcome);

        Self { completion }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        !self.completion.is_pending()
    }

    /// Blocks until the call finished or `timeout` elapsed.
    ///
    /// Returns `true` when the outcome is available, in which case
    /// [`CallHandle::wait`] returns without blocking.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.completion.wait_ready(timeout)
    }

    /// Blocks until the owner thread ran the call, then returns its value or
    /// the failure it raised.
    pub fn wait(self) -> Result<R, DispatchError> {
        self.completion.take()
    }
}

impl<R> std::fmt::Debug for CallHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}
