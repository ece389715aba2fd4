//! A single-threaded port for unit tests.
//!
//! The dispatch queue is a bounded `VecDeque`, and [`PortDispatch::recv`]
//! returns `None` as soon as the queue is empty, so
//! [`crate::TimerService::run_dispatcher`] drains the queue and returns.
use spin::Mutex as SpinMutex;
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
    vec::Vec,
};

use crate::{
    port::{PortDiagnostics, PortDispatch, PortThreading},
    AsyncError, Dispatch,
};

pub(crate) struct TestPort {
    cpu_lock: SpinMutex<()>,
    interrupt: AtomicBool,
    queue: SpinMutex<VecDeque<Dispatch>>,
    queue_capacity: usize,
    async_errors: SpinMutex<Vec<AsyncError>>,
}

impl TestPort {
    pub(crate) fn new(queue_capacity: usize) -> Self {
        Self {
            cpu_lock: SpinMutex::new(()),
            interrupt: AtomicBool::new(false),
            queue: SpinMutex::new(VecDeque::new()),
            queue_capacity,
            async_errors: SpinMutex::new(Vec::new()),
        }
    }

    pub(crate) fn is_cpu_lock_held(&self) -> bool {
        self.cpu_lock.is_locked()
    }

    /// Run `f` in a simulated interrupt context.
    pub(crate) fn in_interrupt<R>(&self, f: impl FnOnce() -> R) -> R {
        assert!(!self.interrupt.swap(true, Ordering::Relaxed));
        let ret = f();
        self.interrupt.store(false, Ordering::Relaxed);
        ret
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn async_errors(&self) -> Vec<AsyncError> {
        self.async_errors.lock().clone()
    }
}

unsafe impl PortThreading for TestPort {
    unsafe fn enter_cpu_lock(&self) {
        core::mem::forget(self.cpu_lock.lock());
    }

    unsafe fn leave_cpu_lock(&self) {
        // Safety: The guard was forgotten by `enter_cpu_lock`
        unsafe { self.cpu_lock.force_unlock() };
    }

    fn is_cpu_lock_active(&self) -> bool {
        self.cpu_lock.is_locked()
    }

    fn is_interrupt_context(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }
}

impl PortDispatch for TestPort {
    fn try_send(&self, msg: Dispatch) -> Result<(), Dispatch> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.queue_capacity {
            return Err(msg);
        }
        queue.push_back(msg);
        Ok(())
    }

    fn recv(&self) -> Option<Dispatch> {
        self.queue.lock().pop_front()
    }
}

impl PortDiagnostics for TestPort {
    fn report_async_error(&self, error: AsyncError) {
        log::warn!("{error}");
        self.async_errors.lock().push(error);
    }
}
