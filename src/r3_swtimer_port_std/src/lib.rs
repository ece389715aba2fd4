//! Simulation environment for running [`r3_swtimer`] on a hosted environment.
//!
//! [`StdPort`] implements the port traits on top of `std` threads. A spin lock
//! stands in for CPU Lock, a bounded `crossbeam` channel serves as the
//! dispatch queue, and interrupt contexts are simulated by tagging the
//! current thread with a [`ThreadRole`].
//!
//! [`Kernel`] ties a [`TimerService`] to a dispatcher thread and, optionally,
//! a ticker thread that calls [`TimerService::timer_tick`] periodically.
//!
//! ```rust,no_run
//! use r3_swtimer::{TimerDefiner, TimerKind};
//! use r3_swtimer_port_std::{Kernel, KernelCfg};
//!
//! let kernel = Kernel::boot(&KernelCfg::manual()).unwrap();
//! let timer = TimerDefiner::new()
//!     .kind(TimerKind::OneShot)
//!     .start(|_| println!("expired"))
//!     .finish(kernel.service())
//!     .unwrap();
//! kernel.service().start(timer, 10).unwrap();
//! kernel.advance(10);
//! kernel.sync();
//! ```
#![cfg_attr(
    feature = "doc",
    doc(html_logo_url = "https://r3-os.github.io/r3/logo-small.svg")
)]
#![deny(unsafe_op_in_unsafe_fn)]
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use r3_swtimer::{
    port::{PortDiagnostics, PortDispatch, PortThreading},
    AsyncError, Dispatch, PendCallError, Ticks, TimerService,
};
use spin::Mutex as SpinMutex;
use std::{
    cell::Cell,
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle, ThreadId},
    time::{Duration, Instant},
};

mod cfg;
mod error;
pub use self::{cfg::*, error::*};

/// The role of a thread, as seen by [`StdPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    Unknown,
    /// The thread is simulating an interrupt context.
    Interrupt,
    /// The dispatcher thread.
    Dispatcher,
}

thread_local! {
    /// The current thread's role. It's automatically assigned to the threads
    /// managed by [`Kernel`] and temporarily overridden by
    /// [`interrupt_context`].
    static THREAD_ROLE: Cell<ThreadRole> = Cell::new(ThreadRole::Unknown);
}

/// Get the current thread's role.
pub fn thread_role() -> ThreadRole {
    THREAD_ROLE.with(|r| r.get())
}

/// Call `f` in a simulated interrupt context. Nestable.
pub fn interrupt_context<R>(f: impl FnOnce() -> R) -> R {
    struct RestoreRole(ThreadRole);

    impl Drop for RestoreRole {
        fn drop(&mut self) {
            THREAD_ROLE.with(|r| r.set(self.0));
        }
    }

    let _guard = RestoreRole(THREAD_ROLE.with(|r| r.replace(ThreadRole::Interrupt)));
    f()
}

/// The port implementation for a hosted environment.
pub struct StdPort {
    cpu_lock: SpinMutex<()>,
    /// The thread currently in the CPU Lock state.
    cpu_lock_owner: SpinMutex<Option<ThreadId>>,
    /// The sending half of the dispatch queue. Taken when the queue is
    /// closed.
    dispatch_send: SpinMutex<Option<Sender<Dispatch>>>,
    dispatch_recv: Receiver<Dispatch>,
    /// The last [`Self::ASYNC_ERROR_LOG_LEN`] asynchronous errors.
    async_errors: SpinMutex<VecDeque<AsyncError>>,
    num_async_errors: AtomicU64,
}

impl std::fmt::Debug for StdPort {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("StdPort")
            .field("queue_len", &self.dispatch_recv.len())
            .field("queue_capacity", &self.dispatch_recv.capacity())
            .field("num_async_errors", &self.num_async_errors())
            .finish_non_exhaustive()
    }
}

impl StdPort {
    /// The maximum number of asynchronous errors retained for
    /// [`Self::take_async_errors`]. Older errors are discarded but still
    /// counted by [`Self::num_async_errors`].
    pub const ASYNC_ERROR_LOG_LEN: usize = 64;

    /// Construct a `StdPort` with a dispatch queue of the specified capacity.
    pub fn new(dispatch_queue_capacity: usize) -> Result<Self, BootError> {
        // A zero-capacity channel is a rendezvous channel, from which an
        // interrupt context can't send without blocking
        if dispatch_queue_capacity == 0 {
            return Err(BootError::QueueAllocation);
        }

        let (send, recv) = channel::bounded(dispatch_queue_capacity);
        Ok(Self {
            cpu_lock: SpinMutex::new(()),
            cpu_lock_owner: SpinMutex::new(None),
            dispatch_send: SpinMutex::new(Some(send)),
            dispatch_recv: recv,
            async_errors: SpinMutex::new(VecDeque::with_capacity(Self::ASYNC_ERROR_LOG_LEN)),
            num_async_errors: AtomicU64::new(0),
        })
    }

    /// Close the dispatch queue. The dispatcher exits after draining the
    /// messages already in the queue. Subsequent sends fail.
    pub fn close_dispatch_queue(&self) {
        log::trace!("closing the dispatch queue");
        drop(self.dispatch_send.lock().take());
    }

    /// Get the number of messages in the dispatch queue.
    pub fn dispatch_queue_len(&self) -> usize {
        self.dispatch_recv.len()
    }

    /// Get the total number of asynchronous errors reported so far.
    pub fn num_async_errors(&self) -> u64 {
        self.num_async_errors.load(Ordering::Relaxed)
    }

    /// Take the asynchronous errors reported since the last call, oldest
    /// first. At most [`Self::ASYNC_ERROR_LOG_LEN`] errors are returned.
    pub fn take_async_errors(&self) -> Vec<AsyncError> {
        self.async_errors.lock().drain(..).collect()
    }
}

unsafe impl PortThreading for StdPort {
    unsafe fn enter_cpu_lock(&self) {
        std::mem::forget(self.cpu_lock.lock());
        *self.cpu_lock_owner.lock() = Some(thread::current().id());
    }

    unsafe fn leave_cpu_lock(&self) {
        *self.cpu_lock_owner.lock() = None;
        // Safety: The guard was forgotten by `enter_cpu_lock`, and the caller
        //         is the owner of CPU Lock
        unsafe { self.cpu_lock.force_unlock() };
    }

    fn is_cpu_lock_active(&self) -> bool {
        *self.cpu_lock_owner.lock() == Some(thread::current().id())
    }

    fn is_interrupt_context(&self) -> bool {
        thread_role() == ThreadRole::Interrupt
    }
}

impl PortDispatch for StdPort {
    fn try_send(&self, msg: Dispatch) -> Result<(), Dispatch> {
        let send = self.dispatch_send.lock();
        let Some(send) = &*send else {
            return Err(msg);
        };
        send.try_send(msg).map_err(TrySendError::into_inner)
    }

    fn recv(&self) -> Option<Dispatch> {
        self.dispatch_recv.recv().ok()
    }
}

impl PortDiagnostics for StdPort {
    fn report_async_error(&self, error: AsyncError) {
        log::error!("{error} ({})", error.result_code());
        self.num_async_errors.fetch_add(1, Ordering::Relaxed);

        let mut async_errors = self.async_errors.lock();
        if async_errors.len() >= Self::ASYNC_ERROR_LOG_LEN {
            async_errors.pop_front();
        }
        async_errors.push_back(error);
    }
}

/// A [`TimerService`] driven by worker threads.
///
/// Dropping a `Kernel` has the same effect as calling [`Self::shutdown`],
/// except that a panic in the dispatcher thread isn't propagated if the
/// current thread is already panicking.
pub struct Kernel {
    service: Arc<TimerService<StdPort>>,
    dispatcher: Option<JoinHandle<()>>,
    ticker: Option<Ticker>,
}

struct Ticker {
    /// Dropping this stops the ticker thread.
    stop_send: Sender<()>,
    join_handle: JoinHandle<()>,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("service", &self.service)
            .field("has_ticker", &self.ticker.is_some())
            .finish()
    }
}

impl Kernel {
    /// Create a timer service and start its worker threads.
    pub fn boot(cfg: &KernelCfg) -> Result<Self, BootError> {
        log::debug!("booting with {cfg:?}");

        let port = StdPort::new(cfg.dispatch_queue_capacity)?;
        let service = Arc::new(TimerService::new(port, &cfg.service_cfg())?);

        log::trace!("starting the dispatcher thread");
        let dispatcher = {
            let service = Arc::clone(&service);
            thread::Builder::new()
                .name(cfg.dispatcher_name.clone())
                .spawn(move || {
                    THREAD_ROLE.with(|role| role.set(ThreadRole::Dispatcher));
                    service.run_dispatcher();
                })
                .map_err(BootError::Spawn)?
        };

        // From now on, `Drop` takes care of the dispatcher if we bail out
        let mut kernel = Self {
            service,
            dispatcher: Some(dispatcher),
            ticker: None,
        };

        if let Some(period) = cfg.tick_period {
            kernel.ticker = Some(Ticker::start(Arc::clone(&kernel.service), period)?);
        }

        Ok(kernel)
    }

    /// Get the timer service.
    #[inline]
    pub fn service(&self) -> &TimerService<StdPort> {
        &self.service
    }

    /// Get a shared reference to the timer service, which can be moved to
    /// other threads (including timer callbacks).
    #[inline]
    pub fn shared_service(&self) -> Arc<TimerService<StdPort>> {
        Arc::clone(&self.service)
    }

    /// Get the port.
    #[inline]
    pub fn port(&self) -> &StdPort {
        self.service.port()
    }

    /// Generate one tick from the current thread.
    pub fn tick(&self) {
        interrupt_context(|| self.service.timer_tick());
    }

    /// Generate `ticks` ticks from the current thread.
    pub fn advance(&self, ticks: Ticks) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Wait until the dispatcher has executed all the deferred calls enqueued
    /// before this call.
    ///
    /// # Panics
    ///
    /// Panics if called by the dispatcher thread, or if the dispatcher thread
    /// exits (e.g., because a deferred call panicked) before reaching the
    /// barrier.
    pub fn sync(&self) {
        assert_ne!(
            thread_role(),
            ThreadRole::Dispatcher,
            "`sync` would deadlock on the dispatcher thread"
        );

        let (done_send, done_recv) = channel::bounded(1);
        let done = move |_: usize| {
            let _ = done_send.try_send(());
        };

        // The barrier itself has to wait for a vacant slot
        loop {
            match self.service.pend_call(done.clone(), 0) {
                Ok(()) => break,
                Err(PendCallError::QueueOverflow) => {
                    assert!(
                        !self.is_dispatcher_finished(),
                        "the dispatcher thread has exited with a full queue"
                    );
                    thread::sleep(Duration::from_micros(100));
                }
            }
        }

        loop {
            match done_recv.recv_timeout(Duration::from_millis(10)) {
                Ok(()) => return,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    panic!("the barrier was discarded without being executed")
                }
            }

            // A barrier stranded in the queue keeps `done_send` alive
            if self.is_dispatcher_finished() && done_recv.try_recv().is_err() {
                panic!("the dispatcher thread has exited before reaching the barrier");
            }
        }
    }

    /// Get a flag indicating whether the dispatcher thread has exited, e.g.,
    /// because a deferred call panicked.
    pub fn is_dispatcher_finished(&self) -> bool {
        self.dispatcher
            .as_ref()
            .map_or(true, |dispatcher| dispatcher.is_finished())
    }

    /// Take the asynchronous errors reported since the last call.
    pub fn take_async_errors(&self) -> Vec<AsyncError> {
        self.port().take_async_errors()
    }

    /// Stop the worker threads. Deferred calls already in the queue are
    /// executed before this method returns.
    ///
    /// # Panics
    ///
    /// Propagates a panic that occurred in the dispatcher thread (i.e., in a
    /// timer callback).
    pub fn shutdown(mut self) {
        if let Err(e) = self.stop_threads() {
            std::panic::resume_unwind(e);
        }
    }

    fn stop_threads(&mut self) -> thread::Result<()> {
        if let Some(ticker) = self.ticker.take() {
            ticker.stop();
        }

        self.port().close_dispatch_queue();

        let Some(dispatcher) = self.dispatcher.take() else {
            return Ok(());
        };
        log::trace!("waiting for the dispatcher thread to exit");
        let result = dispatcher.join();
        log::trace!("stopped the dispatcher thread");
        result
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        if let Err(e) = self.stop_threads() {
            if !thread::panicking() {
                std::panic::resume_unwind(e);
            }
        }
    }
}

impl Ticker {
    fn start(service: Arc<TimerService<StdPort>>, period: Duration) -> Result<Self, BootError> {
        let (stop_send, stop_recv) = channel::bounded::<()>(0);

        log::trace!("starting the ticker thread (period = {period:?})");
        let join_handle = thread::Builder::new()
            .name("ticker".to_owned())
            .spawn(move || {
                let mut next_deadline = Instant::now() + period;
                loop {
                    match stop_recv.recv_deadline(next_deadline) {
                        Err(RecvTimeoutError::Timeout) => {
                            interrupt_context(|| service.timer_tick());
                            next_deadline += period;
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(BootError::Spawn)?;

        Ok(Self {
            stop_send,
            join_handle,
        })
    }

    fn stop(self) {
        // `stop_recv.recv_deadline` will return `Err(Disconnected)` when we
        // drop the corresponding sender
        log::trace!("stopping the ticker thread");
        drop(self.stop_send);
        if self.join_handle.join().is_err() {
            log::error!("the ticker thread panicked");
        }
        log::trace!("stopped the ticker thread");
    }
}
