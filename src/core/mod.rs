pub mod completion;
pub mod envelope;
pub mod errors;
pub mod failure;
pub mod owner_gate;
pub mod pending_queue;
pub mod ports;
