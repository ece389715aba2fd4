//! Configuration of a timer service and its timers
use alloc::sync::Arc;

use crate::{CreateTimerError, Port, TimerFn, TimerId, TimerKind, TimerService};

/// The configuration of a [`TimerService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceCfg {
    /// The maximum number of timers that can exist at the same time.
    pub timer_capacity: usize,
}

impl ServiceCfg {
    pub const DEFAULT_TIMER_CAPACITY: usize = 32;

    pub const fn new() -> Self {
        Self {
            timer_capacity: Self::DEFAULT_TIMER_CAPACITY,
        }
    }

    /// Specify the maximum number of timers. Defaults to
    /// [`Self::DEFAULT_TIMER_CAPACITY`].
    pub const fn timer_capacity(self, timer_capacity: usize) -> Self {
        Self { timer_capacity }
    }
}

impl Default for ServiceCfg {
    fn default() -> Self {
        Self::new()
    }
}

/// The properties of a timer to be created by [`TimerService::create`].
///
/// `start` and `kind` are optional so that a missing callback or an
/// unspecified timer kind can be reported as
/// [`CreateTimerError::InvalidArgument`].
#[derive(Clone, Default)]
pub struct TimerDescriptor<'a> {
    pub start: Option<TimerFn>,
    pub param: usize,
    pub kind: Option<TimerKind>,
    pub name: Option<&'a str>,
}

/// The builder type for timers. Created by [`TimerDefiner::new`].
///
/// # Examples
///
/// ```rust,ignore
/// let timer = TimerDefiner::new()
///     .kind(TimerKind::OneShot)
///     .start(|_| log::info!("supervision timeout"))
///     .name("supervision")
///     .finish(&service)?;
/// ```
#[must_use = "must call `finish()` to complete registration"]
#[derive(Clone, Default)]
pub struct TimerDefiner<'a> {
    desc: TimerDescriptor<'a>,
}

impl<'a> TimerDefiner<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// \[**Required**\] Specify the timer's entry point.
    pub fn start(self, start: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.start_shared(Arc::new(start))
    }

    /// Specify the timer's entry point as an already shared callback.
    pub fn start_shared(self, start: TimerFn) -> Self {
        Self {
            desc: TimerDescriptor {
                start: Some(start),
                ..self.desc
            },
        }
    }

    /// Specify the parameter to `start`. Defaults to `0`.
    pub fn param(self, param: usize) -> Self {
        Self {
            desc: TimerDescriptor { param, ..self.desc },
        }
    }

    /// \[**Required**\] Specify whether the timer is one-shot or periodic.
    pub fn kind(self, kind: TimerKind) -> Self {
        Self {
            desc: TimerDescriptor {
                kind: Some(kind),
                ..self.desc
            },
        }
    }

    /// Specify the timer's name, used for diagnostics. Must not be longer
    /// than [`TIMER_NAME_LEN`] bytes.
    ///
    /// [`TIMER_NAME_LEN`]: crate::TIMER_NAME_LEN
    pub fn name(self, name: &'a str) -> Self {
        Self {
            desc: TimerDescriptor {
                name: Some(name),
                ..self.desc
            },
        }
    }

    /// Complete the definition of a timer, returning its handle.
    pub fn finish<P: Port>(self, service: &TimerService<P>) -> Result<TimerId, CreateTimerError> {
        service.create(self.desc)
    }
}
