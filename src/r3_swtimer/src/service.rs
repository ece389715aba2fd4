//! The timer service instance and the public timer operations
use core::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};
use slab::Slab;

use crate::{
    delta_list::DeltaList,
    error::BadIdError,
    klock::{lock_cpu, CpuLockCell, CpuLockGuard},
    state::expect_thread_context,
    timer::{TimerAttr, TimerCb},
    BootError, CreateTimerError, DeleteTimerError, Port, QueryTimerError, ServiceCfg,
    StartTimerError, StopTimerError, Ticks, TimerDescriptor, TimerId, TimerKind, TimerName,
    TimerRef, TimerState, TICKS_FOREVER,
};

/// A deferred software timer service.
///
/// A `TimerService` owns an arena of timer slots and the delta list of armed
/// timers. It doesn't own any threads; the port `P` drives it by calling
/// [`Self::timer_tick`] on every tick (in an interrupt context) and by running
/// [`Self::run_dispatcher`] on a dedicated thread. Multiple independent
/// instances can coexist.
///
/// # Contexts
///
/// Operations that mutate the delta list ([`start`], [`stop`], [`delete`])
/// fail with `IllegalContext` in an interrupt context. The read-only
/// operations and [`create`] can be called in any context.
///
/// [`start`]: Self::start
/// [`stop`]: Self::stop
/// [`delete`]: Self::delete
/// [`create`]: Self::create
pub struct TimerService<P: Port> {
    pub(crate) port: P,
    /// Distinguishes this instance's [`TimerId`]s from other instances'.
    pub(crate) tag: u32,
    pub(crate) state: CpuLockCell<ServiceState>,
}

/// The mutable state of a [`TimerService`], protected by CPU Lock.
pub(crate) struct ServiceState {
    pub(crate) timers: Slab<TimerCb>,
    pub(crate) timer_capacity: usize,
    pub(crate) delta_list: DeltaList,
    /// The serial number assigned to the next created timer.
    pub(crate) next_serial: u32,
    pub(crate) tick_count: u64,
    pub(crate) stats: ServiceStats,
}

/// Diagnostic counters of a [`TimerService`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    /// The number of timer expirations.
    pub fired: u64,
    /// The number of timer expirations whose callback was dropped because the
    /// dispatch queue was full.
    pub dropped: u64,
    /// The number of deferred calls executed by the dispatcher.
    pub dispatched: u64,
}

/// The source of [`TimerService::tag`].
static NEXT_SERVICE_TAG: AtomicU32 = AtomicU32::new(0);

/// Get the [`TimerCb`] for the specified handle.
#[inline]
fn timer_cb(timers: &Slab<TimerCb>, tag: u32, id: TimerId) -> Result<&TimerCb, BadIdError> {
    if id.service != tag {
        return Err(BadIdError::ResourceUnavailable);
    }
    match timers.get(id.index) {
        Some(cb) if cb.serial == id.serial => Ok(cb),
        _ => Err(BadIdError::ResourceUnavailable),
    }
}

impl<P: Port> TimerService<P> {
    /// Construct a timer service.
    ///
    /// All timer slots are allocated up front.
    pub fn new(port: P, cfg: &ServiceCfg) -> Result<Self, BootError> {
        if cfg.timer_capacity == 0 {
            return Err(BootError::InvalidArgument);
        }

        log::debug!("creating a timer service with {cfg:?}");

        Ok(Self {
            port,
            tag: NEXT_SERVICE_TAG.fetch_add(1, Ordering::Relaxed),
            state: CpuLockCell::new(ServiceState {
                timers: Slab::with_capacity(cfg.timer_capacity),
                timer_capacity: cfg.timer_capacity,
                delta_list: DeltaList::new(),
                next_serial: 0,
                tick_count: 0,
                stats: ServiceStats::default(),
            }),
        })
    }

    /// Get a reference to the port.
    #[inline]
    pub fn port(&self) -> &P {
        &self.port
    }

    #[inline]
    pub(crate) fn lock_cpu(&self) -> CpuLockGuard<'_, P, ServiceState> {
        lock_cpu(&self.port, &self.state)
    }

    /// Get a [`TimerRef`] for the specified handle.
    #[inline]
    pub fn timer(&self, id: TimerId) -> TimerRef<'_, P> {
        TimerRef::new(self, id)
    }

    /// Create a timer in the Stopped state.
    ///
    /// See also: [`TimerDefiner`](crate::TimerDefiner)
    pub fn create(&self, desc: TimerDescriptor<'_>) -> Result<TimerId, CreateTimerError> {
        let TimerDescriptor {
            start,
            param,
            kind,
            name,
        } = desc;

        let (Some(entry_point), Some(kind)) = (start, kind) else {
            return Err(CreateTimerError::InvalidArgument);
        };

        let name = match name {
            Some(name) => {
                Some(TimerName::from(name).map_err(|_| CreateTimerError::InvalidArgument)?)
            }
            None => None,
        };

        let attr = TimerAttr {
            kind,
            entry_point,
            entry_param: param,
            name,
        };

        let mut lock = self.lock_cpu();
        let state = &mut *lock;

        if state.timers.len() >= state.timer_capacity {
            // `attr` is dropped after CPU Lock is released
            drop(lock);
            return Err(CreateTimerError::OutOfMemory);
        }

        let serial = state.next_serial;
        state.next_serial = serial.wrapping_add(1);

        let index = state.timers.insert(TimerCb::new(attr, serial));
        let id = TimerId {
            service: self.tag,
            index,
            serial,
        };
        drop(lock);

        log::trace!("created {id:?} ({kind:?}, {name:?})");
        Ok(id)
    }

    /// Arm the timer so that it fires after `ticks` ticks, measured from now.
    ///
    /// If the timer is already Running, the pending arming is cancelled first,
    /// i.e., the timer is *restarted* with the new delay. [`TICKS_FOREVER`]
    /// moves the timer to the Running state without ever firing it.
    ///
    /// A periodic timer uses `ticks` as its period until it's started again.
    pub fn start(&self, timer: TimerId, ticks: Ticks) -> Result<(), StartTimerError> {
        expect_thread_context(&self.port)?;
        if ticks == 0 {
            return Err(StartTimerError::InvalidArgument);
        }

        let mut lock = self.lock_cpu();
        let ServiceState {
            timers, delta_list, ..
        } = &mut *lock;

        timer_cb(timers, self.tag, timer)?;

        // Cancel the pending arming, if any
        delta_list.remove(timers, timer.index);

        let cb = &mut timers[timer.index];
        cb.period = Some(ticks);
        cb.state = TimerState::Running;

        if ticks != TICKS_FOREVER {
            delta_list.insert(timers, timer.index, ticks);
        }
        drop(lock);

        log::trace!("started {timer:?} (ticks = {ticks})");
        Ok(())
    }

    /// Disarm a Running timer.
    ///
    /// A callback that has already been handed over to the dispatcher can't
    /// be retracted and will still run once.
    pub fn stop(&self, timer: TimerId) -> Result<(), StopTimerError> {
        expect_thread_context(&self.port)?;

        let mut lock = self.lock_cpu();
        let ServiceState {
            timers, delta_list, ..
        } = &mut *lock;

        if timer_cb(timers, self.tag, timer)?.state != TimerState::Running {
            return Err(StopTimerError::ResourceUnavailable);
        }

        delta_list.remove(timers, timer.index);
        timers[timer.index].state = TimerState::Stopped;
        drop(lock);

        log::trace!("stopped {timer:?}");
        Ok(())
    }

    /// Delete the timer, releasing its slot. The handle is rejected by all
    /// subsequent operations.
    pub fn delete(&self, timer: TimerId) -> Result<(), DeleteTimerError> {
        expect_thread_context(&self.port)?;

        let mut lock = self.lock_cpu();
        let ServiceState {
            timers, delta_list, ..
        } = &mut *lock;

        timer_cb(timers, self.tag, timer)?;
        delta_list.remove(timers, timer.index);
        let cb = timers.remove(timer.index);

        // Run the callback's destructor outside the critical section
        drop(lock);
        drop(cb);

        log::trace!("deleted {timer:?}");
        Ok(())
    }

    /// Get a flag indicating whether the timer is Running. Returns `false` for
    /// an invalid handle.
    ///
    /// This can be called in any context.
    pub fn is_running(&self, timer: TimerId) -> bool {
        self.state(timer) == TimerState::Running
    }

    /// Get the timer's state. Returns [`TimerState::Inactive`] for a deleted
    /// timer or an invalid handle.
    pub fn state(&self, timer: TimerId) -> TimerState {
        let lock = self.lock_cpu();
        timer_cb(&lock.timers, self.tag, timer).map_or(TimerState::Inactive, |cb| cb.state)
    }

    /// Get the timer's name. Returns `None` if the timer has no name or the
    /// handle is invalid.
    pub fn name(&self, timer: TimerId) -> Option<TimerName> {
        let lock = self.lock_cpu();
        timer_cb(&lock.timers, self.tag, timer).ok()?.attr.name
    }

    /// Get the timer's kind.
    pub fn kind(&self, timer: TimerId) -> Result<TimerKind, QueryTimerError> {
        let lock = self.lock_cpu();
        Ok(timer_cb(&lock.timers, self.tag, timer)?.attr.kind)
    }

    /// Get the delay specified by the last call to [`Self::start`]. Returns
    /// `None` if the timer has never been started.
    pub fn period(&self, timer: TimerId) -> Result<Option<Ticks>, QueryTimerError> {
        let lock = self.lock_cpu();
        Ok(timer_cb(&lock.timers, self.tag, timer)?.period)
    }

    /// Get the number of ticks remaining until the timer fires next time.
    /// Returns `None` if the timer is Stopped or was started with
    /// [`TICKS_FOREVER`].
    pub fn remaining_ticks(&self, timer: TimerId) -> Result<Option<Ticks>, QueryTimerError> {
        let lock = self.lock_cpu();
        timer_cb(&lock.timers, self.tag, timer)?;
        Ok(lock.delta_list.remaining(&lock.timers, timer.index))
    }

    /// Get the number of ticks processed since the service was created.
    pub fn tick_count(&self) -> u64 {
        self.lock_cpu().tick_count
    }

    /// Get the diagnostic counters.
    pub fn stats(&self) -> ServiceStats {
        self.lock_cpu().stats
    }
}

impl<P: Port + fmt::Debug> fmt::Debug for TimerService<P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TimerService")
            .field("port", &self.port)
            .field("tag", &self.tag)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests;
