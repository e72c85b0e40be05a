//! Values that live on the owner thread, reachable from any thread.
//!
//! Toolkit objects are usually `!Send`: they must be created, used, and
//! dropped on the thread that runs the toolkit's loop. [`OwnerBound`] keeps
//! such a value in an owner-thread slot and routes every access through the
//! dispatcher, so the handle itself can be shared freely.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::controllers::dispatcher::Dispatcher;
use crate::core::errors::DispatchError;
use crate::core::failure::CallFailure;

thread_local! {
    static OWNER_SLOTS: RefCell<HashMap<u64, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

static NEXT_SLOT: AtomicU64 = AtomicU64::new(1);

/// A `Send + Sync` handle to a value of type `T` stored on the owner thread.
///
/// `T` itself never leaves the owner thread; only the closures passed to
/// [`OwnerBound::with`] travel there. Dropping the handle releases the value
/// on the owner thread at its next drain.
pub struct OwnerBound<T: 'static> {
    dispatcher: Dispatcher,
    slot: u64,
    _owner_only: PhantomData<fn() -> T>,
}

impl<T: 'static> OwnerBound<T> {
    /// Creates the value on the owner thread by running `init` there.
    pub fn new<F>(dispatcher: &Dispatcher, init: F) -> Result<Self, DispatchError>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let slot = NEXT_SLOT.fetch_add(1, Ordering::Relaxed);

        dispatcher.call(move || {
            let value: Rc<dyn Any> = Rc::new(RefCell::new(init()));
            OWNER_SLOTS.with(|slots| slots.borrow_mut().insert(slot, value));
        })?;

        Ok(Self {
            dispatcher: dispatcher.clone(),
            slot,
            _owner_only: PhantomData,
        })
    }

    /// Runs `f` against the value on the owner thread and returns its result.
    ///
    /// Fails with [`DispatchError::CallFailed`] when the value is already
    /// borrowed by an enclosing `with` on the same handle.
    pub fn with<F, R>(&self, f: F) -> Result<R, DispatchError>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let slot = self.slot;

        self.dispatcher
            .call(move || with_slot::<T, _, _>(slot, f))
            .and_then(|outcome| outcome)
    }

    /// Queues `f` against the value without waiting for it to run.
    pub fn with_nosync<F>(&self, f: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        let slot = self.slot;

        self.dispatcher.call_nosync(move || {
            if let Err(err) = with_slot::<T, _, _>(slot, f) {
                warn!(slot, %err, "owner-bound update skipped");
            }
        })
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl<T: 'static> Drop for OwnerBound<T> {
    fn drop(&mut self) {
        let slot = self.slot;

        // On the owner thread the slot is reachable even after shutdown.
        if self.dispatcher.is_owner_thread() {
            release_slot(slot);
            return;
        }

        if let Err(err) = self.dispatcher.call_nosync(move || release_slot(slot)) {
            debug!(slot, %err, "owner-bound value not released");
        }
    }
}

impl<T: 'static> std::fmt::Debug for OwnerBound<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerBound")
            .field("slot", &self.slot)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

fn with_slot<T, F, R>(slot: u64, f: F) -> Result<R, DispatchError>
where
    T: 'static,
    F: FnOnce(&mut T) -> R,
{
    let value = OWNER_SLOTS
        .with(|slots| slots.borrow().get(&slot).cloned())
        .ok_or_else(|| slot_failure(slot, "is not present on this thread"))?;

    let cell = value
        .downcast::<RefCell<T>>()
        .map_err(|_| slot_failure(slot, "holds a different type"))?;

    let mut guard = cell
        .try_borrow_mut()
        .map_err(|_| slot_failure(slot, "is already borrowed"))?;

    Ok(f(&mut guard))
}

fn release_slot(slot: u64) {
    // Take the value out before dropping it, so its own drop may use the
    // slots again.
    let value = OWNER_SLOTS.with(|slots| slots.borrow_mut().remove(&slot));
    drop(value);
}

fn slot_failure(slot: u64, reason: &str) -> DispatchError {
    DispatchError::CallFailed(CallFailure::new(format!("owner-bound slot {slot} {reason}")))
}

#[cfg(test)]
fn live_slots() -> usize {
    OWNER_SLOTS.with(|slots| slots.borrow().len())
}
