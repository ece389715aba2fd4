//! Timers
use alloc::sync::Arc;
use arrayvec::ArrayString;
use core::fmt;

use crate::{
    delta_list::{DeltaNode, Link},
    DeleteTimerError, Port, QueryTimerError, StartTimerError, StopTimerError, Ticks,
    TimerService,
};

/// The callback function of a timer. It receives the parameter specified at
/// creation time.
pub type TimerFn = Arc<dyn Fn(usize) + Send + Sync + 'static>;

/// The maximum length of a timer name in bytes.
pub const TIMER_NAME_LEN: usize = 24;

/// A timer name. Stored inline so that naming a timer doesn't allocate.
pub type TimerName = ArrayString<TIMER_NAME_LEN>;

/// An opaque handle referring to a timer in a [`TimerService`].
///
/// Handles are never reused: once a timer is deleted, its handle is rejected
/// by every operation even if the underlying slot is recycled for another
/// timer. A handle is also rejected by every service other than the one that
/// created it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    /// Identifies the owning [`TimerService`].
    pub(crate) service: u32,
    /// An index into the timer arena.
    pub(crate) index: usize,
    /// Distinguishes successive occupants of the same slot.
    pub(crate) serial: u32,
}

impl fmt::Debug for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TimerId({}:{}#{})", self.service, self.index, self.serial)
    }
}

/// Specifies what a timer does after it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// The timer fires once and then returns to the Stopped state.
    OneShot,
    /// The timer automatically rearms itself for another period after each
    /// firing.
    Periodic,
}

/// The state of a timer.
///
/// <center>
///
#[doc = svgbobdoc::transform!(
/// ```svgbob
///                  create
///                    |
///                    v
///              .-----------.   start    .-----------.
///              |           |----------->|           |--.
///              |  Stopped  |            |  Running  |  | start (restart),
///              |           |<-----------|           |<-'  fire (Periodic)
///              '-----------'   stop,    '-----------'
///                    |      fire (OneShot)    |
///             delete |                        | delete
///                    v                        |
///              .-----------.                  |
///              | Inactive  |<-----------------'
///              '-----------'
/// ```
)]
///
/// </center>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerState {
    /// The timer is not armed.
    Stopped,
    /// The timer is armed. It's linked to the delta list unless it was
    /// started with [`TICKS_FOREVER`].
    ///
    /// [`TICKS_FOREVER`]: crate::TICKS_FOREVER
    Running,
    /// The timer was deleted (or the handle never referred to a timer). This
    /// state is terminal.
    Inactive,
}

/// The static properties of a timer, fixed at creation time.
pub(crate) struct TimerAttr {
    pub(crate) kind: TimerKind,
    /// The entry point of the timer.
    pub(crate) entry_point: TimerFn,
    /// The parameter supplied for `entry_point`.
    pub(crate) entry_param: usize,
    pub(crate) name: Option<TimerName>,
}

impl fmt::Debug for TimerAttr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TimerAttr")
            .field("kind", &self.kind)
            .field("entry_point", &Arc::as_ptr(&self.entry_point))
            .field("entry_param", &self.entry_param)
            .field("name", &self.name)
            .finish()
    }
}

/// *Timer control block* - the state data of a timer.
#[derive(Debug)]
pub(crate) struct TimerCb {
    pub(crate) attr: TimerAttr,

    pub(crate) serial: u32,

    pub(crate) state: TimerState,

    /// The delay specified by the last call to `start`. `None` if the timer
    /// has never been started.
    pub(crate) period: Option<Ticks>,

    /// `Some(_)` iff the timer is linked to the delta list, which implies
    /// `state == Running`.
    pub(crate) link: Option<Link>,
}

impl DeltaNode for TimerCb {
    #[inline]
    fn delta_link(&self) -> &Option<Link> {
        &self.link
    }

    #[inline]
    fn delta_link_mut(&mut self) -> &mut Option<Link> {
        &mut self.link
    }
}

impl TimerCb {
    pub(crate) fn new(attr: TimerAttr, serial: u32) -> Self {
        Self {
            attr,
            serial,
            state: TimerState::Stopped,
            period: None,
            link: None,
        }
    }
}

/// A borrowed timer, bundling a [`TimerService`] and a [`TimerId`].
///
/// This is a convenience wrapper around the methods of [`TimerService`] that
/// take a [`TimerId`].
pub struct TimerRef<'a, P: Port> {
    service: &'a TimerService<P>,
    id: TimerId,
}

impl<P: Port> Clone for TimerRef<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Port> Copy for TimerRef<'_, P> {}

impl<P: Port> fmt::Debug for TimerRef<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("TimerRef").field(&self.id).finish()
    }
}

impl<'a, P: Port> TimerRef<'a, P> {
    #[inline]
    pub fn new(service: &'a TimerService<P>, id: TimerId) -> Self {
        Self { service, id }
    }

    #[inline]
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// See [`TimerService::start`].
    #[inline]
    pub fn start(&self, ticks: Ticks) -> Result<(), StartTimerError> {
        self.service.start(self.id, ticks)
    }

    /// See [`TimerService::stop`].
    #[inline]
    pub fn stop(&self) -> Result<(), StopTimerError> {
        self.service.stop(self.id)
    }

    /// See [`TimerService::is_running`].
    #[inline]
    pub fn is_running(&self) -> bool {
        self.service.is_running(self.id)
    }

    /// See [`TimerService::state`].
    #[inline]
    pub fn state(&self) -> TimerState {
        self.service.state(self.id)
    }

    /// See [`TimerService::name`].
    #[inline]
    pub fn name(&self) -> Option<TimerName> {
        self.service.name(self.id)
    }

    /// See [`TimerService::remaining_ticks`].
    #[inline]
    pub fn remaining_ticks(&self) -> Result<Option<Ticks>, QueryTimerError> {
        self.service.remaining_ticks(self.id)
    }

    /// Delete the timer. See [`TimerService::delete`].
    #[inline]
    pub fn delete(self) -> Result<(), DeleteTimerError> {
        self.service.delete(self.id)
    }
}
