//! The interface between the timer service and a port.
//!
//! A port provides the collaborators the service consumes but doesn't
//! implement by itself: a critical-section primitive, a way to tell an
//! interrupt context from a thread context, a bounded dispatch queue, and an
//! asynchronous error-notification channel. The port is also responsible for
//! calling [`TimerService::timer_tick`] on every tick and for running
//! [`TimerService::run_dispatcher`] on a dedicated thread.
//!
//! [`TimerService::timer_tick`]: crate::TimerService::timer_tick
//! [`TimerService::run_dispatcher`]: crate::TimerService::run_dispatcher
use crate::{AsyncError, Dispatch};

/// Implemented by a port. This trait contains items related to controlling
/// the execution context.
///
/// # Safety
///
/// The service relies on CPU Lock for the memory safety of its state. While a
/// context is in a CPU Lock state, no other context (including the context
/// that calls [`TimerService::timer_tick`]) may enter the CPU Lock state.
///
/// [`TimerService::timer_tick`]: crate::TimerService::timer_tick
pub unsafe trait PortThreading {
    /// Enter a CPU Lock state, waiting for another context to leave it if
    /// necessary.
    ///
    /// # Safety
    ///
    /// Only meant to be called by the service. The current context must not
    /// be in a CPU Lock state already.
    unsafe fn enter_cpu_lock(&self);

    /// Leave a CPU Lock state.
    ///
    /// # Safety
    ///
    /// Only meant to be called by the service. The current context must be in
    /// a CPU Lock state entered by [`Self::enter_cpu_lock`].
    unsafe fn leave_cpu_lock(&self);

    /// Return a flag indicating whether the current context is in a CPU Lock
    /// state entered through `self`. Must return `false` when another context
    /// holds CPU Lock.
    fn is_cpu_lock_active(&self) -> bool;

    /// Return a flag indicating whether the current context is an interrupt
    /// context.
    fn is_interrupt_context(&self) -> bool;
}

/// Implemented by a port. This trait contains items related to the dispatch
/// queue carrying expired timers' callbacks from the tick handler to the
/// dispatcher thread.
pub trait PortDispatch {
    /// Enqueue `msg` without blocking. Return `Err(msg)` if the queue is full
    /// or closed.
    ///
    /// This is called in an interrupt context and with CPU Lock active. It
    /// must complete in bounded time and must not call into the service.
    fn try_send(&self, msg: Dispatch) -> Result<(), Dispatch>;

    /// Dequeue a message, blocking the current thread until one becomes
    /// available. Return `None` when the queue has been closed and drained.
    ///
    /// This is only called by [`TimerService::run_dispatcher`].
    ///
    /// [`TimerService::run_dispatcher`]: crate::TimerService::run_dispatcher
    fn recv(&self) -> Option<Dispatch>;
}

/// Implemented by a port. This trait contains items related to reporting
/// errors that can't be returned to any caller.
pub trait PortDiagnostics {
    /// Report an asynchronous error.
    ///
    /// This is called in an interrupt context and with CPU Lock active, so
    /// the same restrictions as [`PortDispatch::try_send`] apply.
    fn report_async_error(&self, error: AsyncError) {
        log::warn!("{error}");
    }
}

/// Represents a particular group of traits that a port should implement.
pub trait Port: PortThreading + PortDispatch + PortDiagnostics {}

impl<T: PortThreading + PortDispatch + PortDiagnostics> Port for T {}
