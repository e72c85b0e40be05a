use std::sync::{Mutex, PoisonError};

use winit::event_loop::EventLoopProxy;

use crate::core::errors::RunLoopUnavailable;
use crate::core::ports::interrupter::Interrupter;

/// Wakes a winit event loop by sending it a user event.
///
/// The event loop's handler is expected to call
/// [`Dispatcher::drain`](crate::Dispatcher::drain) whenever that event
/// arrives. Once the event loop has exited, wakes fail with
/// [`RunLoopUnavailable`].
pub struct WinitWaker<E: 'static> {
    proxy: Mutex<EventLoopProxy<E>>,
    make_event: fn() -> E,
}

impl<E: Send + 'static> WinitWaker<E> {
    pub fn new(proxy: EventLoopProxy<E>, make_event: fn() -> E) -> Self {
        Self {
            proxy: Mutex::new(proxy),
            make_event,
        }
    }
}

impl<E: Send + 'static> Interrupter for WinitWaker<E> {
    fn notify(&self) -> Result<(), RunLoopUnavailable> {
        self.proxy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send_event((self.make_event)())
            .map_err(|_| RunLoopUnavailable)
    }
}
