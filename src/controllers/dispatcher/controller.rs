use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::controllers::dispatcher::config::DispatcherConfig;
use crate::controllers::dispatcher::stats::{
    AsyncFailure, Counter, DispatchStats, DrainReport, StatsCounters,
};
use crate::core::completion::CallHandle;
use crate::core::envelope::{CallEnvelope, CallMode};
use crate::core::errors::DispatchError;
use crate::core::failure::{CallFailure, invoke_caught};
use crate::core::owner_gate::OwnerGate;
use crate::core::pending_queue::{PendingQueue, Withdrawal};
use crate::core::ports::interrupter::Interrupter;

struct DispatcherShared {
    gate: OwnerGate,
    interrupter: Box<dyn Interrupter>,
    queue: PendingQueue,
    config: DispatcherConfig,
    next_id: AtomicU64,
    draining: AtomicBool,
    counters: StatsCounters,
    async_failures: Mutex<VecDeque<AsyncFailure>>,
}

/// Marshals closures onto the owner thread's run loop.
///
/// Cloning is cheap and every clone refers to the same queue. Calls made on
/// the owner thread run in place; calls from other threads are queued, the
/// run loop is woken through the [`Interrupter`], and the loop runs them when
/// it invokes [`Dispatcher::drain`].
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<DispatcherShared>,
}

impl Dispatcher {
    pub fn bind<I>(gate: OwnerGate, interrupter: I, config: DispatcherConfig) -> Self
    where
        I: Interrupter + 'static,
    {
        debug!(
            dispatcher = %config.name,
            owner = ?gate.owner(),
            max_pending = ?config.max_pending,
            "dispatcher bound to owner thread"
        );

        Self {
            shared: Arc::new(DispatcherShared {
                gate,
                interrupter: Box::new(interrupter),
                queue: PendingQueue::new(config.max_pending),
                config,
                next_id: AtomicU64::new(1),
                draining: AtomicBool::new(false),
                counters: StatsCounters::default(),
                async_failures: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Binds the dispatcher to the calling thread, which becomes the owner.
    pub fn bind_current<I>(interrupter: I, config: DispatcherConfig) -> Self
    where
        I: Interrupter + 'static,
    {
        Self::bind(OwnerGate::current(), interrupter, config)
    }

    #[must_use]
    pub fn is_owner_thread(&self) -> bool {
        self.shared.gate.is_owner_thread()
    }

    #[must_use]
    pub fn owner(&self) -> ThreadId {
        self.shared.gate.owner()
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// Runs `callable` on the owner thread and returns its value.
    ///
    /// Blocks until the owner thread has run the call; there is no timeout.
    /// A panic inside `callable` comes back as [`DispatchError::CallFailed`].
    pub fn call<F, R>(&self, callable: F) -> Result<R, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit(callable)?.wait()
    }

    /// Queues `callable` for the owner thread and returns without waiting.
    ///
    /// Errors only report that the call could not be queued; the call's own
    /// outcome is never reported to the caller.
    pub fn call_nosync<F>(&self, callable: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_open()?;

        if self.is_owner_thread() {
            let id = self.next_id();
            if let Err(failure) = self.run_in_place(id, callable) {
                self.record_async_failure(id, failure);
            }
            return Ok(());
        }

        self.marshal(CallEnvelope::asynchronous(self.next_id(), callable))
    }

    /// Queues `callable` and hands back the caller's end of the call.
    ///
    /// On the owner thread the call runs immediately and the returned handle
    /// is already finished.
    pub fn submit<F, R>(&self, callable: F) -> Result<CallHandle<R>, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.ensure_open()?;

        let id = self.next_id();

        if self.is_owner_thread() {
            let outcome = self
                .run_in_place(id, callable)
                .map_err(DispatchError::CallFailed);
            return Ok(CallHandle::ready(outcome));
        }

        let (envelope, handle) = CallEnvelope::synchronous(id, callable);
        self.marshal(envelope)?;

        Ok(handle)
    }

    /// Runs every queued call, in submission order.
    ///
    /// This is the hook the owner's run loop invokes after being woken. A
    /// failing call does not stop the calls queued behind it.
    pub fn drain(&self) -> Result<DrainReport, DispatchError> {
        if !self.is_owner_thread() {
            debug!(
                dispatcher = %self.shared.config.name,
                owner = ?self.owner(),
                "drain refused off the owner thread"
            );
            return Err(DispatchError::NotOwnerThread);
        }

        let Some(_pass) = DrainPass::enter(&self.shared.draining) else {
            return Err(DispatchError::ReentrancyViolation);
        };

        let batch = self.shared.queue.drain_all();
        if batch.is_empty() {
            return Ok(DrainReport::default());
        }

        self.shared.counters.bump(Counter::Drain);
        let mut report = DrainReport::default();

        for envelope in batch {
            let id = envelope.id();
            let mode = envelope.mode();
            let started = Instant::now();
            let outcome = envelope.execute();
            self.check_slow_call(id, started.elapsed());

            report.executed += 1;
            trace!(dispatcher = %self.shared.config.name, id, ?mode, "executed queued call");

            if let Err(failure) = outcome {
                report.failed += 1;
                match mode {
                    CallMode::Asynchronous => self.record_async_failure(id, failure),
                    CallMode::Synchronous => {
                        debug!(
                            dispatcher = %self.shared.config.name,
                            id,
                            %failure,
                            "synchronous call failed, returning failure to caller"
                        );
                    }
                }
            }
        }

        self.shared
            .counters
            .add(Counter::Executed, report.executed as u64);
        self.shared
            .counters
            .add(Counter::Failed, report.failed as u64);

        debug!(
            dispatcher = %self.shared.config.name,
            executed = report.executed,
            failed = report.failed,
            "drain pass finished"
        );

        Ok(report)
    }

    /// Stops accepting calls and fails every call still queued.
    ///
    /// Callers blocked in [`Dispatcher::call`] on a queued call are released
    /// with [`DispatchError::ShutDown`]. Returns the number of abandoned
    /// calls; a second shutdown abandons nothing.
    pub fn shutdown(&self) -> usize {
        self.close(DispatchError::ShutDown)
    }

    /// Shuts down because the owner's run loop has terminated.
    ///
    /// Same as [`Dispatcher::shutdown`], except that queued and later calls
    /// fail with [`DispatchError::RunLoopUnavailable`]. Run-loop adapters
    /// call this when their loop exits.
    pub fn run_loop_exited(&self) -> usize {
        self.close(DispatchError::RunLoopUnavailable)
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.queue.closed_reason().is_some()
    }

    /// Number of calls waiting for the next drain.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.shared.counters.snapshot()
    }

    /// Removes and returns the recorded asynchronous call failures, oldest
    /// first.
    pub fn take_async_failures(&self) -> Vec<AsyncFailure> {
        self.shared
            .async_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    fn close(&self, reason: DispatchError) -> usize {
        let abandoned = self.shared.queue.close(reason.clone());
        let count = abandoned.len();

        for envelope in abandoned {
            envelope.abandon(reason.clone());
        }

        self.shared
            .counters
            .add(Counter::Abandoned, count as u64);

        info!(
            dispatcher = %self.shared.config.name,
            abandoned = count,
            %reason,
            "dispatcher shut down"
        );

        count
    }

    fn ensure_open(&self) -> Result<(), DispatchError> {
        match self.shared.queue.closed_reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> u64 {
        self.shared.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn run_in_place<F, R>(&self, id: u64, callable: F) -> Result<R, CallFailure>
    where
        F: FnOnce() -> R,
    {
        self.shared.counters.bump(Counter::FastPath);

        let started = Instant::now();
        let outcome = invoke_caught(callable);
        self.check_slow_call(id, started.elapsed());

        outcome
    }

    fn marshal(&self, envelope: CallEnvelope) -> Result<(), DispatchError> {
        debug_assert!(
            !self.is_owner_thread(),
            "owner-thread calls take the fast path and are never queued"
        );

        let id = envelope.id();
        self.shared.queue.enqueue(envelope)?;
        self.shared.counters.bump(Counter::Marshaled);

        match self.shared.interrupter.notify() {
            Ok(()) => {
                self.shared.counters.bump(Counter::Wake);
                Ok(())
            }
            Err(unavailable) => {
                self.shared.counters.bump(Counter::WakeFailure);

                // A drain or a shutdown may have raced the failed wake; only
                // a call that is still queued can be taken back.
                match self.shared.queue.withdraw(id) {
                    Withdrawal::Withdrawn(envelope) => {
                        envelope.abandon(DispatchError::RunLoopUnavailable);
                        self.shared.counters.bump(Counter::Abandoned);

                        warn!(
                            dispatcher = %self.shared.config.name,
                            id,
                            "could not wake owner run loop: {unavailable}"
                        );

                        Err(unavailable.into())
                    }
                    Withdrawal::Drained => {
                        debug!(
                            dispatcher = %self.shared.config.name,
                            id,
                            "wake failed after the call was already drained"
                        );
                        Ok(())
                    }
                    Withdrawal::Closed(reason) => {
                        debug!(
                            dispatcher = %self.shared.config.name,
                            id,
                            %reason,
                            "wake failed and the call was abandoned by shutdown"
                        );
                        Err(reason)
                    }
                }
            }
        }
    }

    fn record_async_failure(&self, id: u64, failure: CallFailure) {
        warn!(
            dispatcher = %self.shared.config.name,
            id,
            %failure,
            "asynchronous call failed on the owner thread"
        );

        let capacity = self.shared.config.async_failure_capacity;
        if capacity == 0 {
            return;
        }

        let mut failures = self
            .shared
            .async_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while failures.len() >= capacity {
            failures.pop_front();
        }
        failures.push_back(AsyncFailure { id, failure });
    }

    fn check_slow_call(&self, id: u64, elapsed: Duration) {
        if let Some(threshold) = self.shared.config.slow_call_warning
            && elapsed > threshold
        {
            warn!(
                dispatcher = %self.shared.config.name,
                id,
                elapsed_ms = elapsed.as_millis() as u64,
                "owner-thread call blocked the run loop"
            );
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.shared.config.name)
            .field("owner", &self.shared.gate.owner())
            .field("pending", &self.pending())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Marks a drain pass as running for as long as it is alive.
struct DrainPass<'a> {
    draining: &'a AtomicBool,
}

impl<'a> DrainPass<'a> {
    fn enter(draining: &'a AtomicBool) -> Option<Self> {
        if draining.swap(true, Ordering::Acquire) {
            return None;
        }

        Some(Self { draining })
    }
}

impl Drop for DrainPass<'_> {
    fn drop(&mut self) {
        self.draining.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::RunLoopUnavailable;
    use std::sync::atomic::AtomicUsize;
    use std::thread::{self, JoinHandle};

    #[derive(Default)]
    struct WakeLog {
        wakes: AtomicUsize,
        unavailable: AtomicBool,
    }

    #[derive(Clone, Default)]
    struct CountingWaker {
        log: Arc<WakeLog>,
    }

    impl CountingWaker {
        fn wakes(&self) -> usize {
            self.log.wakes.load(Ordering::SeqCst)
        }

        fn set_unavailable(&self) {
            self.log.unavailable.store(true, Ordering::SeqCst);
        }
    }

    impl Interrupter for CountingWaker {
        fn notify(&self) -> Result<(), RunLoopUnavailable> {
            if self.log.unavailable.load(Ordering::SeqCst) {
                return Err(RunLoopUnavailable);
            }

            self.log.wakes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn bind_here(config: DispatcherConfig) -> (Dispatcher, CountingWaker) {
        let waker = CountingWaker::default();
        let dispatcher = Dispatcher::bind_current(waker.clone(), config);

        (dispatcher, waker)
    }

    /// Plays the owner's run loop until `worker` finishes.
    fn pump_until_finished<T>(dispatcher: &Dispatcher, worker: &JoinHandle<T>) {
        let deadline = Instant::now() + Duration::from_secs(5);

        while !worker.is_finished() {
            dispatcher.drain().expect("drain on the owner thread");
            assert!(Instant::now() < deadline, "worker did not finish in time");
            thread::sleep(Duration::from_millis(1));
        }

        dispatcher.drain().expect("final drain on the owner thread");
    }

    #[test]
    fn sync_call_runs_once_on_owner_thread_and_returns_value() {
        let (dispatcher, waker) = bind_here(DispatcherConfig::default());
        let owner = thread::current().id();
        let runs = Arc::new(AtomicUsize::new(0));

        let caller = {
            let dispatcher = dispatcher.clone();
            let runs = Arc::clone(&runs);
            thread::spawn(move || {
                dispatcher.call(move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    (thread::current().id(), 6 * 7)
                })
            })
        };

        pump_until_finished(&dispatcher, &caller);
        let (ran_on, value) = caller.join().unwrap().expect("call succeeds");

        assert_eq!(ran_on, owner);
        assert_eq!(value, 42);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(waker.wakes(), 1);
        assert_eq!(dispatcher.stats().marshaled, 1);
    }

    #[test]
    fn calls_from_one_thread_run_in_submission_order() {
        let (dispatcher, _waker) = bind_here(DispatcherConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let caller = {
            let dispatcher = dispatcher.clone();
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                for n in 0..50 {
                    let seen = Arc::clone(&seen);
                    dispatcher
                        .call_nosync(move || seen.lock().unwrap().push(n))
                        .unwrap();
                }
                let seen = Arc::clone(&seen);
                dispatcher.call(move || seen.lock().unwrap().push(50)).unwrap();
            })
        };

        pump_until_finished(&dispatcher, &caller);
        caller.join().unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..=50).collect::<Vec<_>>());
    }

    #[test]
    fn owner_thread_call_takes_fast_path() {
        let (dispatcher, waker) = bind_here(DispatcherConfig::default());

        let value = dispatcher.call(|| 7).unwrap();

        assert_eq!(value, 7);
        assert_eq!(waker.wakes(), 0);
        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(dispatcher.drain(), Ok(DrainReport::default()));

        let stats = dispatcher.stats();
        assert_eq!(stats.fast_path, 1);
        assert_eq!(stats.marshaled, 0);
        assert_eq!(stats.drains, 0);
    }

    #[test]
    fn owner_thread_nosync_runs_immediately() {
        let (dispatcher, waker) = bind_here(DispatcherConfig::default());
        let ran = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&ran);
        dispatcher
            .call_nosync(move || flag.store(true, Ordering::SeqCst))
            .unwrap();

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(waker.wakes(), 0);
    }

    #[test]
    fn owner_thread_failure_is_returned_from_fast_path() {
        let (dispatcher, _waker) = bind_here(DispatcherConfig::default());

        let err = dispatcher
            .call(|| -> u8 { panic!("fast path failure") })
            .unwrap_err();

        assert_eq!(
            err,
            DispatchError::CallFailed(CallFailure::new("fast path failure"))
        );
    }

    #[test]
    fn nested_call_from_owner_callable_runs_in_place() {
        let (dispatcher, waker) = bind_here(DispatcherConfig::default());

        let caller = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                let inner = dispatcher.clone();
                dispatcher.call(move || inner.call(|| 5))
            })
        };

        pump_until_finished(&dispatcher, &caller);

        assert_eq!(caller.join().unwrap(), Ok(Ok(5)));
        assert_eq!(waker.wakes(), 1);
        assert_eq!(dispatcher.stats().fast_path, 1);
    }

    #[test]
    fn sync_failure_surfaces_to_caller() {
        let (dispatcher, _waker) = bind_here(DispatcherConfig::default());

        let caller = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || dispatcher.call(|| -> u32 { panic!("expected failure") }))
        };

        pump_until_finished(&dispatcher, &caller);

        match caller.join().unwrap() {
            Err(DispatchError::CallFailed(failure)) => {
                assert_eq!(failure.message(), "expected failure");
            }
            other => panic!("expected call failure, got {other:?}"),
        }
        assert_eq!(dispatcher.stats().failed, 1);
        assert!(dispatcher.take_async_failures().is_empty());
    }

    #[test]
    fn nosync_failure_is_recorded_but_not_returned() {
        let (dispatcher, _waker) = bind_here(DispatcherConfig::default());
        let after = Arc::new(AtomicBool::new(false));

        let caller = {
            let dispatcher = dispatcher.clone();
            let after = Arc::clone(&after);
            thread::spawn(move || {
                let queued = dispatcher.call_nosync(|| panic!("boom"));
                dispatcher
                    .call_nosync(move || after.store(true, Ordering::SeqCst))
                    .unwrap();
                queued
            })
        };

        pump_until_finished(&dispatcher, &caller);

        assert_eq!(caller.join().unwrap(), Ok(()));
        assert!(after.load(Ordering::SeqCst), "later calls still run");

        let failures = dispatcher.take_async_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].failure.message(), "boom");
        assert!(dispatcher.take_async_failures().is_empty());
    }

    #[test]
    fn async_failure_record_keeps_most_recent_entries() {
        let (dispatcher, _waker) = bind_here(
            DispatcherConfig::default().with_async_failure_capacity(2),
        );

        for n in 0..3 {
            dispatcher
                .call_nosync(move || panic!("failure {n}"))
                .unwrap();
        }

        let messages: Vec<String> = dispatcher
            .take_async_failures()
            .into_iter()
            .map(|entry| entry.failure.message().to_string())
            .collect();

        assert_eq!(messages, vec!["failure 1", "failure 2"]);
    }

    #[test]
    fn burst_from_many_threads_keeps_every_value_and_per_thread_order() {
        let (dispatcher, _waker) = bind_here(DispatcherConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let callers: Vec<_> = (0..10_usize)
            .map(|thread_index| {
                let dispatcher = dispatcher.clone();
                let seen = Arc::clone(&seen);
                thread::spawn(move || {
                    for n in 0..100 {
                        let value = thread_index * 100 + n;
                        let seen = Arc::clone(&seen);
                        dispatcher
                            .call_nosync(move || seen.lock().unwrap().push(value))
                            .unwrap();
                    }
                })
            })
            .collect();

        for caller in &callers {
            pump_until_finished(&dispatcher, caller);
        }
        for caller in callers {
            caller.join().unwrap();
        }
        dispatcher.drain().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1000);

        let mut sorted = seen.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..1000).collect::<Vec<_>>());

        for thread_index in 0..10 {
            let own: Vec<usize> = seen
                .iter()
                .copied()
                .filter(|value| value / 100 == thread_index)
                .collect();
            let expected: Vec<usize> = (0..100).map(|n| thread_index * 100 + n).collect();
            assert_eq!(own, expected);
        }
    }

    #[test]
    fn unavailable_run_loop_fails_submission_immediately() {
        let (dispatcher, waker) = bind_here(DispatcherConfig::default());
        waker.set_unavailable();
        let ran = Arc::new(AtomicBool::new(false));

        let caller = {
            let dispatcher = dispatcher.clone();
            let ran = Arc::clone(&ran);
            thread::spawn(move || {
                let flag = Arc::clone(&ran);
                let sync = dispatcher.call(move || flag.store(true, Ordering::SeqCst));
                let nosync = dispatcher.call_nosync(move || ran.store(true, Ordering::SeqCst));
                (sync, nosync)
            })
        };

        let (sync, nosync) = caller.join().unwrap();

        assert_eq!(sync, Err(DispatchError::RunLoopUnavailable));
        assert_eq!(nosync, Err(DispatchError::RunLoopUnavailable));
        assert_eq!(dispatcher.pending(), 0);

        dispatcher.drain().unwrap();
        assert!(!ran.load(Ordering::SeqCst), "withdrawn calls never run");

        let stats = dispatcher.stats();
        assert_eq!(stats.wake_failures, 2);
        assert_eq!(stats.abandoned, 2);
    }

    #[test]
    fn draining_empty_queue_is_a_no_op() {
        let (dispatcher, _waker) = bind_here(DispatcherConfig::default());

        assert_eq!(dispatcher.drain(), Ok(DrainReport::default()));
        assert_eq!(dispatcher.drain(), Ok(DrainReport::default()));
        assert_eq!(dispatcher.stats(), DispatchStats::default());
    }

    #[test]
    fn drain_off_owner_thread_is_rejected() {
        let (dispatcher, _waker) = bind_here(DispatcherConfig::default());

        let result = thread::spawn(move || dispatcher.drain()).join().unwrap();

        assert_eq!(result, Err(DispatchError::NotOwnerThread));
    }

    #[test]
    fn nested_drain_is_a_reentrancy_violation() {
        let (dispatcher, _waker) = bind_here(DispatcherConfig::default());
        let nested = Arc::new(Mutex::new(None));

        let caller = {
            let dispatcher = dispatcher.clone();
            let nested = Arc::clone(&nested);
            thread::spawn(move || {
                let inner = dispatcher.clone();
                dispatcher
                    .call_nosync(move || *nested.lock().unwrap() = Some(inner.drain()))
                    .unwrap();
            })
        };

        pump_until_finished(&dispatcher, &caller);
        caller.join().unwrap();

        assert_eq!(
            *nested.lock().unwrap(),
            Some(Err(DispatchError::ReentrancyViolation))
        );
        assert_eq!(dispatcher.drain(), Ok(DrainReport::default()));
    }

    #[test]
    fn shutdown_releases_blocked_caller_and_rejects_new_calls() {
        let (dispatcher, _waker) = bind_here(DispatcherConfig::default());

        let caller = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                let blocked = dispatcher.call(|| 1);
                let later = dispatcher.call_nosync(|| {});
                (blocked, later)
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while dispatcher.pending() == 0 {
            assert!(Instant::now() < deadline, "call was never queued");
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(dispatcher.shutdown(), 1);
        assert_eq!(dispatcher.shutdown(), 0);

        let (blocked, later) = caller.join().unwrap();
        assert_eq!(blocked, Err(DispatchError::ShutDown));
        assert_eq!(later, Err(DispatchError::ShutDown));
        assert!(dispatcher.is_shut_down());
        assert_eq!(dispatcher.call(|| 2), Err(DispatchError::ShutDown));
    }

    #[test]
    fn exited_run_loop_fails_queued_and_later_calls_as_unavailable() {
        let (dispatcher, _waker) = bind_here(DispatcherConfig::default());

        let caller = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                let blocked = dispatcher.call(|| 1);
                let later = dispatcher.call_nosync(|| {});
                (blocked, later)
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while dispatcher.pending() == 0 {
            assert!(Instant::now() < deadline, "call was never queued");
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(dispatcher.run_loop_exited(), 1);
        assert_eq!(dispatcher.shutdown(), 0);

        let (blocked, later) = caller.join().unwrap();
        assert_eq!(blocked, Err(DispatchError::RunLoopUnavailable));
        assert_eq!(later, Err(DispatchError::RunLoopUnavailable));
        assert_eq!(dispatcher.call(|| 2), Err(DispatchError::RunLoopUnavailable));
        assert!(dispatcher.is_shut_down());
    }

    #[test]
    fn wake_failure_reports_call_abandoned_by_concurrent_shutdown() {
        let target: Arc<Mutex<Option<Dispatcher>>> = Arc::default();
        let shut_down_on_wake = Arc::clone(&target);
        let dispatcher = Dispatcher::bind_current(
            move || -> Result<(), RunLoopUnavailable> {
                if let Some(dispatcher) = shut_down_on_wake.lock().unwrap().take() {
                    dispatcher.shutdown();
                }
                Err(RunLoopUnavailable)
            },
            DispatcherConfig::default(),
        );
        *target.lock().unwrap() = Some(dispatcher.clone());
        let ran = Arc::new(AtomicBool::new(false));

        let result = {
            let dispatcher = dispatcher.clone();
            let ran = Arc::clone(&ran);
            thread::spawn(move || dispatcher.call_nosync(move || ran.store(true, Ordering::SeqCst)))
                .join()
                .unwrap()
        };

        assert_eq!(result, Err(DispatchError::ShutDown));
        dispatcher.drain().unwrap();
        assert!(!ran.load(Ordering::SeqCst));

        let stats = dispatcher.stats();
        assert_eq!(stats.wake_failures, 1);
        assert_eq!(stats.abandoned, 1);
    }

    #[test]
    fn bounded_queue_rejects_overflow() {
        let (dispatcher, _waker) = bind_here(DispatcherConfig::default().with_max_pending(Some(2)));

        let results = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                (0..3)
                    .map(|_| dispatcher.call_nosync(|| {}))
                    .collect::<Vec<_>>()
            })
            .join()
            .unwrap()
        };

        assert_eq!(
            results,
            vec![
                Ok(()),
                Ok(()),
                Err(DispatchError::QueueFull { capacity: 2 })
            ]
        );
        assert_eq!(dispatcher.drain().unwrap().executed, 2);
    }

    #[test]
    fn timed_out_wait_still_runs_call_at_next_drain() {
        let (dispatcher, _waker) = bind_here(DispatcherConfig::default());
        let gave_up = Arc::new(AtomicBool::new(false));

        let caller = {
            let dispatcher = dispatcher.clone();
            let gave_up = Arc::clone(&gave_up);
            thread::spawn(move || {
                let handle = dispatcher.submit(|| "late")?;
                let finished_early = handle.wait_timeout(Duration::from_millis(20));
                gave_up.store(true, Ordering::SeqCst);
                assert!(!finished_early);
                handle.wait()
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while !gave_up.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "caller never timed out");
            thread::sleep(Duration::from_millis(1));
        }

        pump_until_finished(&dispatcher, &caller);

        assert_eq!(caller.join().unwrap(), Ok("late"));
    }

    #[test]
    fn independent_dispatchers_do_not_share_queues() {
        let (first, _first_waker) = bind_here(DispatcherConfig::default().with_name("first"));
        let (second, _second_waker) = bind_here(DispatcherConfig::default().with_name("second"));

        let caller = {
            let first = first.clone();
            thread::spawn(move || first.call_nosync(|| {}))
        };
        caller.join().unwrap().unwrap();

        assert_eq!(first.pending(), 1);
        assert_eq!(second.pending(), 0);
        assert_eq!(second.drain(), Ok(DrainReport::default()));
        assert_eq!(first.drain().unwrap().executed, 1);
    }
}
