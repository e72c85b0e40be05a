//! Cross-thread call dispatcher.
//!
//! The dispatcher owns the pending queue and decides, per call, between the
//! owner-thread fast path and marshaling through the queue.
//!
//! # Architecture
//!
//! - **Input**: closures submitted from any thread via `call`, `call_nosync`
//!   or `submit`
//! - **Output**: the [`Interrupter`](crate::Interrupter) port, used to wake
//!   the owner's run loop
//! - **Core**: envelopes, the pending queue, and the owner gate from `core/`

pub mod config;
mod controller;
pub mod stats;

pub use config::DispatcherConfig;
pub use controller::Dispatcher;
pub use stats::{AsyncFailure, DispatchStats, DrainReport};
