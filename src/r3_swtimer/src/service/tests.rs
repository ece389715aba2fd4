use spin::Mutex as SpinMutex;
use std::{sync::Arc, vec::Vec};

use super::*;
use crate::{test_port::TestPort, AsyncError, PendCallError, ResultCode, TimerDefiner};

/// Drives a `TimerService` tick by tick and records which timer callbacks
/// ran after which tick.
struct Harness {
    service: TimerService<TestPort>,
    /// Parameters passed to callbacks since the last tick
    calls: Arc<SpinMutex<Vec<usize>>>,
    /// `(tick, param)`
    history: Vec<(u64, usize)>,
    now: u64,
}

impl Harness {
    fn new() -> Self {
        Self::with_queue_capacity(16)
    }

    fn with_queue_capacity(queue_capacity: usize) -> Self {
        let _ = env_logger::try_init();

        let service = TimerService::new(
            TestPort::new(queue_capacity),
            &ServiceCfg::new().timer_capacity(4),
        )
        .unwrap();

        Self {
            service,
            calls: Arc::new(SpinMutex::new(Vec::new())),
            history: Vec::new(),
            now: 0,
        }
    }

    fn create(&self, kind: TimerKind, param: usize) -> TimerId {
        let calls = Arc::clone(&self.calls);
        TimerDefiner::new()
            .kind(kind)
            .start(move |param| calls.lock().push(param))
            .param(param)
            .finish(&self.service)
            .unwrap()
    }

    /// Process one tick, then let the dispatcher drain the queue.
    fn tick(&mut self) {
        self.service
            .port()
            .in_interrupt(|| self.service.timer_tick());
        self.now += 1;
        self.service.run_dispatcher();

        let now = self.now;
        self.history
            .extend(self.calls.lock().drain(..).map(|param| (now, param)));
    }

    fn advance_to(&mut self, t: u64) {
        while self.now < t {
            self.tick();
        }
    }

    fn fired_at(&self, param: usize) -> Vec<u64> {
        self.history
            .iter()
            .filter(|&&(_, p)| p == param)
            .map(|&(t, _)| t)
            .collect()
    }
}

#[test]
fn stop_on_stopped_timer_fails() {
    let h = Harness::new();
    let timer = h.create(TimerKind::OneShot, 1);

    assert_eq!(h.service.stop(timer), Err(StopTimerError::ResourceUnavailable));
    assert_eq!(h.service.state(timer), TimerState::Stopped);
    assert_eq!(h.service.period(timer), Ok(None));
}

#[test]
fn start_zero_fails() {
    let h = Harness::new();
    let timer = h.create(TimerKind::Periodic, 1);

    assert_eq!(h.service.start(timer, 0), Err(StartTimerError::InvalidArgument));
    assert!(!h.service.is_running(timer));
    assert_eq!(h.service.state(timer), TimerState::Stopped);
}

#[test]
fn one_shot_fires_once() {
    let mut h = Harness::new();
    let timer = h.create(TimerKind::OneShot, 1);

    h.service.start(timer, 50).unwrap();
    assert!(h.service.is_running(timer));
    assert_eq!(h.service.remaining_ticks(timer), Ok(Some(50)));

    h.advance_to(49);
    assert!(h.fired_at(1).is_empty());

    h.advance_to(51);
    assert_eq!(h.fired_at(1), [50]);
    assert!(!h.service.is_running(timer));
    assert_eq!(h.service.remaining_ticks(timer), Ok(None));
    assert_eq!(h.service.stop(timer), Err(StopTimerError::ResourceUnavailable));

    h.advance_to(200);
    assert_eq!(h.fired_at(1), [50]);
}

#[test]
fn periodic_fires_until_stopped() {
    let mut h = Harness::new();
    let timer = h.create(TimerKind::Periodic, 1);

    h.service.start(timer, 50).unwrap();

    h.advance_to(110);
    assert_eq!(h.fired_at(1), [50, 100]);
    assert_eq!(h.service.remaining_ticks(timer), Ok(Some(40)));

    h.service.stop(timer).unwrap();
    h.advance_to(200);
    assert_eq!(h.fired_at(1), [50, 100]);
    assert_eq!(h.service.stop(timer), Err(StopTimerError::ResourceUnavailable));
}

#[test]
fn restart_resets_deadline() {
    let mut h = Harness::new();
    let timer = h.create(TimerKind::OneShot, 1);

    h.service.start(timer, 50).unwrap();
    h.advance_to(10);
    h.service.start(timer, 50).unwrap();

    h.advance_to(100);
    assert_eq!(h.fired_at(1), [60]);
}

#[test]
fn restart_with_shorter_delay() {
    let mut h = Harness::new();
    let long = h.create(TimerKind::OneShot, 1);
    let other = h.create(TimerKind::OneShot, 2);

    h.service.start(long, 30).unwrap();
    h.service.start(other, 40).unwrap();
    h.advance_to(5);
    h.service.start(long, 3).unwrap();

    h.advance_to(100);
    assert_eq!(h.fired_at(1), [8]);
    // The cancelled arming must not move the other timer's deadline
    assert_eq!(h.fired_at(2), [40]);
}

#[test]
fn forever_never_fires() {
    let mut h = Harness::new();
    let timer = h.create(TimerKind::Periodic, 1);

    h.service.start(timer, TICKS_FOREVER).unwrap();
    assert!(h.service.is_running(timer));
    assert_eq!(h.service.remaining_ticks(timer), Ok(None));

    h.advance_to(500);
    assert!(h.fired_at(1).is_empty());

    assert_eq!(h.service.stop(timer), Ok(()));
    assert!(!h.service.is_running(timer));
}

#[test]
fn interrupt_context_rejects_mutation() {
    let h = Harness::new();
    let stopped = h.create(TimerKind::OneShot, 1);
    let running = h.create(TimerKind::OneShot, 2);
    let deleted = h.create(TimerKind::OneShot, 3);
    h.service.start(running, 10).unwrap();
    h.service.delete(deleted).unwrap();

    h.service.port().in_interrupt(|| {
        for timer in [stopped, running, deleted] {
            assert_eq!(h.service.start(timer, 5), Err(StartTimerError::IllegalContext));
            assert_eq!(h.service.start(timer, 0), Err(StartTimerError::IllegalContext));
            assert_eq!(h.service.stop(timer), Err(StopTimerError::IllegalContext));
            assert_eq!(h.service.delete(timer), Err(DeleteTimerError::IllegalContext));
        }

        // Read-only operations are allowed
        assert!(!h.service.is_running(stopped));
        assert!(h.service.is_running(running));
        assert!(!h.service.is_running(deleted));
    });

    assert_eq!(h.service.state(stopped), TimerState::Stopped);
    assert_eq!(h.service.remaining_ticks(running), Ok(Some(10)));
}

#[test]
fn delete_invalidates_handle() {
    let mut h = Harness::new();
    let timer = h.create(TimerKind::Periodic, 1);
    h.service.start(timer, 5).unwrap();

    h.service.delete(timer).unwrap();
    assert_eq!(h.service.state(timer), TimerState::Inactive);
    assert!(!h.service.is_running(timer));
    assert_eq!(h.service.start(timer, 5), Err(StartTimerError::ResourceUnavailable));
    assert_eq!(h.service.stop(timer), Err(StopTimerError::ResourceUnavailable));
    assert_eq!(h.service.delete(timer), Err(DeleteTimerError::ResourceUnavailable));
    assert_eq!(h.service.kind(timer), Err(QueryTimerError::ResourceUnavailable));
    assert_eq!(h.service.name(timer), None);

    // The slot is recycled, but the old handle still doesn't work
    let new_timer = h.create(TimerKind::OneShot, 2);
    assert_eq!(new_timer.index, timer.index);
    assert_ne!(new_timer, timer);
    assert_eq!(h.service.start(timer, 5), Err(StartTimerError::ResourceUnavailable));

    h.advance_to(20);
    assert!(h.fired_at(1).is_empty());
}

#[test]
fn create_validates_arguments() {
    let h = Harness::new();

    let no_callback = TimerDefiner::new().kind(TimerKind::OneShot);
    assert_eq!(
        no_callback.finish(&h.service),
        Err(CreateTimerError::InvalidArgument)
    );

    let no_kind = TimerDefiner::new().start(|_| {});
    assert_eq!(
        no_kind.finish(&h.service),
        Err(CreateTimerError::InvalidArgument)
    );

    let long_name = TimerDefiner::new()
        .kind(TimerKind::OneShot)
        .start(|_| {})
        .name("a name that is much longer than the limit");
    assert_eq!(
        long_name.finish(&h.service),
        Err(CreateTimerError::InvalidArgument)
    );

    let named = TimerDefiner::new()
        .kind(TimerKind::Periodic)
        .start(|_| {})
        .name("supervision")
        .finish(&h.service)
        .unwrap();
    assert_eq!(h.service.name(named).as_deref(), Some("supervision"));
    assert_eq!(h.service.kind(named), Ok(TimerKind::Periodic));
}

#[test]
fn create_fails_when_slots_are_exhausted() {
    let h = Harness::new();
    let timers: Vec<_> = (0..4).map(|i| h.create(TimerKind::OneShot, i)).collect();

    let result = TimerDefiner::new()
        .kind(TimerKind::OneShot)
        .start(|_| {})
        .finish(&h.service);
    assert_eq!(result, Err(CreateTimerError::OutOfMemory));
    assert_eq!(ResultCode::from(result.unwrap_err()), ResultCode::OutOfMemory);

    h.service.delete(timers[0]).unwrap();
    h.create(TimerKind::OneShot, 4);
}

#[test]
fn same_tick_expirations_are_fifo() {
    let mut h = Harness::new();
    let a = h.create(TimerKind::Periodic, 1);
    let b = h.create(TimerKind::Periodic, 2);
    let c = h.create(TimerKind::OneShot, 3);

    h.service.start(b, 10).unwrap();
    h.service.start(a, 10).unwrap();
    h.service.start(c, 10).unwrap();

    h.advance_to(20);
    assert_eq!(h.history, [(10, 2), (10, 1), (10, 3), (20, 2), (20, 1)]);
}

#[test]
fn queue_overflow_drops_firing_and_rearms() {
    let mut h = Harness::with_queue_capacity(1);
    let a = h.create(TimerKind::Periodic, 1);
    let b = h.create(TimerKind::Periodic, 2);

    h.service.start(a, 5).unwrap();
    h.service.start(b, 5).unwrap();

    h.advance_to(10);

    // `b`'s firings didn't fit in the queue
    assert_eq!(h.fired_at(1), [5, 10]);
    assert!(h.fired_at(2).is_empty());
    assert_eq!(
        h.service.port().async_errors(),
        [
            AsyncError::DispatchOverflow { timer: b },
            AsyncError::DispatchOverflow { timer: b },
        ]
    );
    assert!(h.service.is_running(b));
    assert_eq!(h.service.remaining_ticks(b), Ok(Some(5)));

    let stats = h.service.stats();
    assert_eq!(stats.fired, 4);
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.dispatched, 2);
}

#[test]
fn stop_cannot_retract_enqueued_firing() {
    let mut h = Harness::new();
    let timer = h.create(TimerKind::Periodic, 1);
    h.service.start(timer, 3).unwrap();

    h.advance_to(2);

    // Process the expiring tick without running the dispatcher
    h.service
        .port()
        .in_interrupt(|| h.service.timer_tick());
    h.now += 1;
    assert_eq!(h.service.port().queue_len(), 1);

    h.service.stop(timer).unwrap();

    // The already-enqueued firing runs once; nothing after that
    h.advance_to(20);
    assert_eq!(h.history.len(), 1);
}

#[test]
fn pend_call_from_interrupt() {
    let h = Harness::with_queue_capacity(1);
    let calls = Arc::clone(&h.calls);

    h.service.port().in_interrupt(|| {
        h.service
            .pend_call(move |param| calls.lock().push(param), 7)
            .unwrap();
        assert_eq!(
            h.service.pend_call(|_| {}, 8),
            Err(PendCallError::QueueOverflow)
        );
    });

    h.service.run_dispatcher();
    assert_eq!(*h.calls.lock(), [7]);
}

#[test]
fn timer_ref_methods() {
    let mut h = Harness::new();
    let id = h.create(TimerKind::OneShot, 1);
    let timer = h.service.timer(id);

    assert_eq!(timer.id(), id);
    timer.start(4).unwrap();
    assert_eq!(timer.state(), TimerState::Running);
    assert_eq!(timer.remaining_ticks(), Ok(Some(4)));
    timer.stop().unwrap();
    assert!(!timer.is_running());
    assert_eq!(timer.name(), None);
    timer.delete().unwrap();

    h.advance_to(10);
    assert_eq!(h.service.state(id), TimerState::Inactive);
}

#[test]
fn tick_count_and_period() {
    let mut h = Harness::new();
    let timer = h.create(TimerKind::Periodic, 1);

    h.advance_to(3);
    assert_eq!(h.service.tick_count(), 3);

    h.service.start(timer, 7).unwrap();
    assert_eq!(h.service.period(timer), Ok(Some(7)));
    h.service.start(timer, 2).unwrap();
    assert_eq!(h.service.period(timer), Ok(Some(2)));

    h.advance_to(9);
    assert_eq!(h.fired_at(1), [5, 7, 9]);
}

#[test]
fn zero_capacity_is_rejected() {
    let result = TimerService::new(TestPort::new(1), &ServiceCfg::new().timer_capacity(0));
    assert!(matches!(result, Err(BootError::InvalidArgument)));
}

#[test]
fn handles_are_bound_to_their_service() {
    let h1 = Harness::new();
    let h2 = Harness::new();
    let t1 = h1.create(TimerKind::OneShot, 1);
    let t2 = h2.create(TimerKind::OneShot, 2);

    // Same slot and serial number in each service
    assert_eq!((t1.index, t1.serial), (t2.index, t2.serial));
    assert_ne!(t1, t2);

    assert_eq!(
        h2.service.start(t1, 5),
        Err(StartTimerError::ResourceUnavailable)
    );
    assert_eq!(h2.service.state(t1), TimerState::Inactive);
    assert_eq!(h2.service.state(t2), TimerState::Stopped);
}
