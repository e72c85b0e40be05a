use crate::core::errors::RunLoopUnavailable;

/// Wakes the owner thread's run loop so that it runs the drain hook.
///
/// Implementations must be callable from any thread and may coalesce several
/// notifications into one wake, since a drain always empties the whole queue.
/// When the run loop is not running, `notify` either records a wake to honor
/// once the loop starts, or fails with [`RunLoopUnavailable`]; it must never
/// silently drop the request.
pub trait Interrupter: Send + Sync {
    fn notify(&self) -> Result<(), RunLoopUnavailable>;
}

impl<F> Interrupter for F
where
    F: Fn() -> Result<(), RunLoopUnavailable> + Send + Sync,
{
    #[inline]
    fn notify(&self) -> Result<(), RunLoopUnavailable> {
        self()
    }
}
