use r3_swtimer::ServiceCfg;
use std::time::Duration;

/// The configuration of a simulated [`Kernel`](crate::Kernel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelCfg {
    /// The tick period. If `None`, no ticker thread is started, and ticks are
    /// only generated by [`Kernel::tick`](crate::Kernel::tick) and
    /// [`Kernel::advance`](crate::Kernel::advance).
    pub tick_period: Option<Duration>,
    /// The maximum number of timers.
    pub timer_capacity: usize,
    /// The capacity of the dispatch queue. Must not be zero.
    pub dispatch_queue_capacity: usize,
    /// The name of the dispatcher thread.
    pub dispatcher_name: String,
}

impl KernelCfg {
    pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(1);
    pub const DEFAULT_DISPATCH_QUEUE_CAPACITY: usize = 16;

    /// Construct a `KernelCfg` with a ticker thread running at
    /// [`Self::DEFAULT_TICK_PERIOD`].
    pub fn new() -> Self {
        Self {
            tick_period: Some(Self::DEFAULT_TICK_PERIOD),
            timer_capacity: ServiceCfg::DEFAULT_TIMER_CAPACITY,
            dispatch_queue_capacity: Self::DEFAULT_DISPATCH_QUEUE_CAPACITY,
            dispatcher_name: "timer dispatcher".to_owned(),
        }
    }

    /// Construct a `KernelCfg` without a ticker thread. Useful for
    /// deterministic tests.
    pub fn manual() -> Self {
        Self {
            tick_period: None,
            ..Self::new()
        }
    }

    pub fn tick_period(self, tick_period: Option<Duration>) -> Self {
        Self {
            tick_period,
            ..self
        }
    }

    pub fn timer_capacity(self, timer_capacity: usize) -> Self {
        Self {
            timer_capacity,
            ..self
        }
    }

    pub fn dispatch_queue_capacity(self, dispatch_queue_capacity: usize) -> Self {
        Self {
            dispatch_queue_capacity,
            ..self
        }
    }

    pub fn dispatcher_name(self, dispatcher_name: impl Into<String>) -> Self {
        Self {
            dispatcher_name: dispatcher_name.into(),
            ..self
        }
    }

    pub(crate) fn service_cfg(&self) -> ServiceCfg {
        ServiceCfg::new().timer_capacity(self.timer_capacity)
    }
}

impl Default for KernelCfg {
    fn default() -> Self {
        Self::new()
    }
}
