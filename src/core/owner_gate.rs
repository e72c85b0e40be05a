use std::thread::{self, ThreadId};

/// Identity of the owner thread, captured when a dispatcher is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerGate {
    owner: ThreadId,
}

impl OwnerGate {
    /// Binds the gate to the calling thread.
    #[must_use]
    pub fn current() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    #[must_use]
    pub fn for_thread(owner: ThreadId) -> Self {
        Self { owner }
    }

    #[must_use]
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    #[inline]
    #[must_use]
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }
}
