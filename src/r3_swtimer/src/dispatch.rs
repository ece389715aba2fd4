//! The dispatcher: executes deferred calls in a thread context
use alloc::sync::Arc;
use core::fmt;

use crate::{klock::lock_cpu, PendCallError, Port, TimerFn, TimerId, TimerService};

/// A deferred call carried by the dispatch queue from an interrupt context to
/// the dispatcher thread.
pub struct Dispatch {
    entry_point: TimerFn,
    entry_param: usize,
    /// The timer that produced this message, if any.
    source: Option<TimerId>,
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("entry_point", &Arc::as_ptr(&self.entry_point))
            .field("entry_param", &self.entry_param)
            .field("source", &self.source)
            .finish()
    }
}

impl Dispatch {
    #[inline]
    pub(crate) fn new(entry_point: TimerFn, entry_param: usize, source: Option<TimerId>) -> Self {
        Self {
            entry_point,
            entry_param,
            source,
        }
    }

    /// Get the timer that produced this message. Returns `None` for a call
    /// pended by [`TimerService::pend_call`].
    #[inline]
    pub fn source(&self) -> Option<TimerId> {
        self.source
    }

    /// Call the entry point.
    #[inline]
    pub fn invoke(self) {
        (self.entry_point)(self.entry_param);
    }
}

impl<P: Port> TimerService<P> {
    /// The body of the dispatcher thread. Waits for deferred calls and
    /// executes them one by one until [`PortDispatch::recv`] reports that the
    /// queue has been closed.
    ///
    /// The port must call this on exactly one dedicated thread per service.
    ///
    /// [`PortDispatch::recv`]: crate::port::PortDispatch::recv
    pub fn run_dispatcher(&self) {
        log::debug!("dispatcher started");

        while let Some(msg) = self.port.recv() {
            match msg.source() {
                Some(timer) => log::trace!("dispatching the callback of {timer:?}"),
                None => log::trace!("dispatching a pended call"),
            }
            msg.invoke();

            lock_cpu(&self.port, &self.state).stats.dispatched += 1;
        }

        log::debug!("dispatch queue closed; dispatcher exiting");
    }

    /// Defer a function call to the dispatcher thread.
    ///
    /// This never blocks and is legal in any context, including an interrupt
    /// context. Calls are executed in the order they were enqueued, interleaved
    /// with timer callbacks.
    pub fn pend_call(
        &self,
        f: impl Fn(usize) + Send + Sync + 'static,
        param: usize,
    ) -> Result<(), PendCallError> {
        self.port
            .try_send(Dispatch::new(Arc::new(f), param, None))
            .map_err(|_| PendCallError::QueueOverflow)
    }
}
