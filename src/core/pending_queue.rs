use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::envelope::CallEnvelope;
use crate::core::errors::DispatchError;

struct Closed {
    reason: DispatchError,
    /// Ids of the envelopes handed back by `close`.
    abandoned: HashSet<u64>,
}

struct QueueState {
    entries: Vec<CallEnvelope>,
    closed: Option<Closed>,
}

/// Where an envelope went when its submitter tried to take it back.
pub(crate) enum Withdrawal {
    /// Still queued; now owned by the submitter again.
    Withdrawn(CallEnvelope),
    /// Already removed by a drain.
    Drained,
    /// Abandoned when the queue was closed for `reason`.
    Closed(DispatchError),
}

/// FIFO of envelopes waiting for the owner thread.
///
/// Any number of producers append; the owner thread is the only consumer and
/// removes everything at once, so a burst of submissions costs the consumer a
/// single lock acquisition.
pub(crate) struct PendingQueue {
    state: Mutex<QueueState>,
    max_pending: Option<usize>,
}

impl PendingQueue {
    pub(crate) fn new(max_pending: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                entries: Vec::new(),
                closed: None,
            }),
            max_pending,
        }
    }

    /// Appends to the tail.
    ///
    /// Fails with the close reason once the queue is closed, or when the
    /// configured bound is reached; the rejected envelope is dropped.
    pub(crate) fn enqueue(&self, envelope: CallEnvelope) -> Result<(), DispatchError> {
        let mut state = self.lock();

        if let Some(closed) = &state.closed {
            return Err(closed.reason.clone());
        }

        if let Some(capacity) = self.max_pending
            && state.entries.len() >= capacity
        {
            return Err(DispatchError::QueueFull { capacity });
        }

        state.entries.push(envelope);

        Ok(())
    }

    /// Removes and returns every queued envelope in submission order.
    pub(crate) fn drain_all(&self) -> Vec<CallEnvelope> {
        std::mem::take(&mut self.lock().entries)
    }

    /// Takes one envelope back if it is still queued.
    pub(crate) fn withdraw(&self, id: u64) -> Withdrawal {
        let mut state = self.lock();

        if let Some(position) = state.entries.iter().position(|envelope| envelope.id() == id) {
            return Withdrawal::Withdrawn(state.entries.remove(position));
        }

        match &state.closed {
            Some(closed) if closed.abandoned.contains(&id) => {
                Withdrawal::Closed(closed.reason.clone())
            }
            _ => Withdrawal::Drained,
        }
    }

    /// Rejects all further envelopes with `reason` and hands back the ones
    /// still queued. Only the first close takes effect.
    pub(crate) fn close(&self, reason: DispatchError) -> Vec<CallEnvelope> {
        let mut state = self.lock();
        if state.closed.is_some() {
            return Vec::new();
        }

        let leftovers = std::mem::take(&mut state.entries);
        state.closed = Some(Closed {
            reason,
            abandoned: leftovers.iter().map(CallEnvelope::id).collect(),
        });

        leftovers
    }

    /// The reason given to the first `close`, if any.
    pub(crate) fn closed_reason(&self) -> Option<DispatchError> {
        self.lock().closed.as_ref().map(|closed| closed.reason.clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
