use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::failure::CallFailure;

/// Snapshot of a dispatcher's diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Calls handed to the owner thread through the queue.
    pub marshaled: u64,
    /// Calls run in place because the caller was the owner thread.
    pub fast_path: u64,
    /// Successful run-loop wakes.
    pub wakes: u64,
    pub wake_failures: u64,
    /// Drain passes that found at least one queued call.
    pub drains: u64,
    pub executed: u64,
    pub failed: u64,
    /// Queued calls dropped without running, by shutdown or a failed wake.
    pub abandoned: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    marshaled: AtomicU64,
    fast_path: AtomicU64,
    wakes: AtomicU64,
    wake_failures: AtomicU64,
    drains: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    Marshaled,
    FastPath,
    Wake,
    WakeFailure,
    Drain,
    Executed,
    Failed,
    Abandoned,
}

impl StatsCounters {
    pub(crate) fn add(&self, counter: Counter, amount: u64) {
        let cell = match counter {
            Counter::Marshaled => &self.marshaled,
            Counter::FastPath => &self.fast_path,
            Counter::Wake => &self.wakes,
            Counter::WakeFailure => &self.wake_failures,
            Counter::Drain => &self.drains,
            Counter::Executed => &self.executed,
            Counter::Failed => &self.failed,
            Counter::Abandoned => &self.abandoned,
        };

        cell.fetch_add(amount, Ordering::Relaxed);
    }

    pub(crate) fn bump(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub(crate) fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            marshaled: self.marshaled.load(Ordering::Relaxed),
            fast_path: self.fast_path.load(Ordering::Relaxed),
            wakes: self.wakes.load(Ordering::Relaxed),
            wake_failures: self.wake_failures.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub executed: usize,
    pub failed: usize,
}

impl DrainReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executed == 0
    }
}

/// A failed asynchronous call, kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncFailure {
    pub id: u64,
    pub failure: CallFailure,
}
