//! Adapters between the dispatcher and the run loops that host it.

pub mod headless_loop;
pub mod owner_bound;
#[cfg(feature = "gui")]
pub mod winit_waker;
