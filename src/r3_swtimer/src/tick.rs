//! The tick handler
use crate::{
    service::ServiceState, AsyncError, Dispatch, Port, TimerId, TimerKind, TimerService,
    TimerState,
};

impl<P: Port> TimerService<P> {
    /// Advance the service by one tick. Hands every timer that expires at this
    /// tick over to the dispatcher and rearms periodic timers.
    ///
    /// The port's tick source must call this once per tick period in an
    /// interrupt context. This never blocks: if the dispatch queue is full,
    /// the affected firing is dropped and reported through
    /// [`PortDiagnostics::report_async_error`].
    ///
    /// [`PortDiagnostics::report_async_error`]: crate::port::PortDiagnostics::report_async_error
    pub fn timer_tick(&self) {
        debug_assert!(self.port.is_interrupt_context());

        let mut lock = self.lock_cpu();
        let ServiceState {
            timers,
            delta_list,
            tick_count,
            stats,
            ..
        } = &mut *lock;

        *tick_count += 1;

        if delta_list.is_empty() {
            return;
        }

        delta_list.decrement_head(timers);

        // Timers expiring at the same tick are processed in list order, i.e.,
        // in the order they were armed
        while let Some(index) = delta_list.pop_expired(timers) {
            let cb = &mut timers[index];
            let id = TimerId {
                service: self.tag,
                index,
                serial: cb.serial,
            };
            stats.fired += 1;

            let msg = Dispatch::new(cb.attr.entry_point.clone(), cb.attr.entry_param, Some(id));
            if self.port.try_send(msg).is_err() {
                stats.dropped += 1;
                self.port
                    .report_async_error(AsyncError::DispatchOverflow { timer: id });
            }

            // A periodic timer is rearmed even if the callback was dropped
            let rearm = match (cb.attr.kind, cb.period) {
                (TimerKind::Periodic, Some(period)) => Some(period),
                _ => {
                    cb.state = TimerState::Stopped;
                    None
                }
            };

            if let Some(period) = rearm {
                delta_list.insert(timers, index, period);
            }
        }
    }
}
