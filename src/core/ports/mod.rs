//! Port definitions for the dispatcher core.
//!
//! The core touches the host run loop through [`Interrupter`](interrupter::Interrupter) only.

pub mod interrupter;
