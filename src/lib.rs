mod adapters;
mod controllers;
mod core;

pub use adapters::headless_loop::{
    EarlyWake, HeadlessRunLoop, LoopEvent, LoopPhase, LoopStopper, LoopWaker,
};
pub use adapters::owner_bound::OwnerBound;
#[cfg(feature = "gui")]
pub use adapters::winit_waker::WinitWaker;
pub use controllers::dispatcher::config::{
    ENV_ASYNC_FAILURES, ENV_MAX_PENDING, ENV_NAME, ENV_SLOW_CALL_MS,
};
pub use controllers::dispatcher::{
    AsyncFailure, DispatchStats, Dispatcher, DispatcherConfig, DrainReport,
};
pub use crate::core::completion::CallHandle;
pub use crate::core::errors::{DispatchError, RunLoopUnavailable};
pub use crate::core::failure::CallFailure;
pub use crate::core::owner_gate::OwnerGate;
pub use crate::core::ports::interrupter::Interrupter;
