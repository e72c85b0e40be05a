//! A cooperative run loop for owner threads without a GUI toolkit.
//!
//! The loop sleeps on a condvar until it is woken or its optional tick
//! elapses, then hands the event to a handler on the owner thread. It is the
//! run loop used by the headless demo, the benchmarks, and the tests.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::controllers::dispatcher::Dispatcher;
use crate::core::errors::RunLoopUnavailable;
use crate::core::ports::interrupter::Interrupter;

/// What a wake does before the loop has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EarlyWake {
    /// Fail with [`RunLoopUnavailable`].
    #[default]
    Reject,
    /// Remember the wake and deliver it once the loop starts.
    Defer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    /// The loop was woken through its [`LoopWaker`].
    Wake,
    /// The configured tick elapsed without a wake.
    Tick,
}

struct LoopState {
    phase: LoopPhase,
    wake_pending: bool,
}

struct LoopShared {
    state: Mutex<LoopState>,
    signal: Condvar,
    early_wake: EarlyWake,
}

impl LoopShared {
    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self) {
        self.lock().phase = LoopPhase::Stopped;
        self.signal.notify_all();
    }
}

pub struct HeadlessRunLoop {
    shared: Arc<LoopShared>,
    tick: Option<Duration>,
}

impl HeadlessRunLoop {
    #[must_use]
    pub fn new(early_wake: EarlyWake) -> Self {
        Self {
            shared: Arc::new(LoopShared {
                state: Mutex::new(LoopState {
                    phase: LoopPhase::Idle,
                    wake_pending: false,
                }),
                signal: Condvar::new(),
                early_wake,
            }),
            tick: None,
        }
    }

    /// Delivers [`LoopEvent::Tick`] whenever `tick` passes without a wake.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = Some(tick);
        self
    }

    #[must_use]
    pub fn waker(&self) -> LoopWaker {
        LoopWaker {
            shared: Arc::clone(&self.shared),
        }
    }

    #[must_use]
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            shared: Arc::clone(&self.shared),
        }
    }

    #[must_use]
    pub fn phase(&self) -> LoopPhase {
        self.shared.lock().phase
    }

    /// Marks the loop as running so wakes are accepted. Starting twice is
    /// fine; starting a stopped loop is not.
    pub fn start(&self) -> Result<(), RunLoopUnavailable> {
        let mut state = self.shared.lock();

        match state.phase {
            LoopPhase::Stopped => Err(RunLoopUnavailable),
            LoopPhase::Idle | LoopPhase::Running => {
                state.phase = LoopPhase::Running;
                Ok(())
            }
        }
    }

    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Handles a pending wake without blocking.
    ///
    /// Returns `true` when a wake was pending and `on_wake` ran. Any number
    /// of wakes since the last pump are delivered as one. Only a running
    /// loop delivers wakes; a deferred wake waits for [`HeadlessRunLoop::start`].
    pub fn pump(&self, on_wake: impl FnOnce()) -> bool {
        {
            let mut state = self.shared.lock();
            if state.phase != LoopPhase::Running || !state.wake_pending {
                return false;
            }
            state.wake_pending = false;
        }

        on_wake();
        true
    }

    /// Starts the loop and blocks the calling thread, handing every event to
    /// `handler`, until the loop is stopped.
    pub fn run(&self, mut handler: impl FnMut(LoopEvent)) -> Result<(), RunLoopUnavailable> {
        self.start()?;

        let mut next_tick = self.tick.map(|tick| Instant::now() + tick);

        loop {
            let event = {
                let mut state = self.shared.lock();

                loop {
                    if state.phase == LoopPhase::Stopped {
                        return Ok(());
                    }

                    if state.wake_pending {
                        state.wake_pending = false;
                        break LoopEvent::Wake;
                    }

                    match (next_tick, self.tick) {
                        (Some(deadline), Some(tick)) => {
                            let now = Instant::now();
                            if now >= deadline {
                                next_tick = Some(now + tick);
                                break LoopEvent::Tick;
                            }

                            state = self
                                .shared
                                .signal
                                .wait_timeout(state, deadline - now)
                                .unwrap_or_else(PoisonError::into_inner)
                                .0;
                        }
                        _ => {
                            state = self
                                .shared
                                .signal
                                .wait(state)
                                .unwrap_or_else(PoisonError::into_inner);
                        }
                    }
                }
            };

            handler(event);
        }
    }

    /// Runs the loop as `dispatcher`'s owner: every wake drains the
    /// dispatcher. When the loop stops, queued and later calls fail with
    /// [`RunLoopUnavailable`] so no caller is left waiting on a loop that is
    /// gone.
    pub fn drive(&self, dispatcher: &Dispatcher) -> Result<(), RunLoopUnavailable> {
        let outcome = self.run(|event| {
            if event != LoopEvent::Wake {
                return;
            }

            match dispatcher.drain() {
                Ok(report) if report.is_empty() => {
                    trace!(dispatcher = %dispatcher.config().name, "wake found nothing queued");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(dispatcher = %dispatcher.config().name, %err, "drain hook failed");
                }
            }
        });

        let abandoned = dispatcher.run_loop_exited();
        debug!(
            dispatcher = %dispatcher.config().name,
            abandoned,
            "headless run loop finished"
        );

        outcome
    }
}

impl Default for HeadlessRunLoop {
    fn default() -> Self {
        Self::new(EarlyWake::default())
    }
}

/// The [`Interrupter`] for a [`HeadlessRunLoop`].
#[derive(Clone)]
pub struct LoopWaker {
    shared: Arc<LoopShared>,
}

impl Interrupter for LoopWaker {
    fn notify(&self) -> Result<(), RunLoopUnavailable> {
        let mut state = self.shared.lock();

        match (state.phase, self.shared.early_wake) {
            (LoopPhase::Stopped, _) | (LoopPhase::Idle, EarlyWake::Reject) => {
                return Err(RunLoopUnavailable);
            }
            (LoopPhase::Running, _) | (LoopPhase::Idle, EarlyWake::Defer) => {
                state.wake_pending = true;
            }
        }

        drop(state);
        self.shared.signal.notify_one();

        Ok(())
    }
}

/// Stops a [`HeadlessRunLoop`] from any thread.
#[derive(Clone)]
pub struct LoopStopper {
    shared: Arc<LoopShared>,
}

impl LoopStopper {
    pub fn stop(&self) {
        self.shared.stop();
    }
}
