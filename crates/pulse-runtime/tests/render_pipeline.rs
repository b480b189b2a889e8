//! End-to-end checks: manager, coalescing and tick scheduling driven together
//! by a virtual scheduler.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use pulse_core::{
    CoalesceConfig, Deferred, PotentialObservable, Scheduler, Stream, StreamError, Subject,
    VirtualScheduler, coalesce_with, sources,
};
use pulse_runtime::{
    AnimationFrameTickScheduler, HostCapabilities, RenderEvent, RenderEventHandlers,
    RenderEventKind, RenderEventManager, RuntimeConfig, SelectionPhase, TickScheduler,
    tick_scheduler_for,
};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Handlers that log every event and request a flush for asynchronous ones.
fn view(
    log: &Rc<RefCell<Vec<RenderEvent<i32>>>>,
    tick: &Rc<dyn TickScheduler>,
) -> RenderEventHandlers<i32> {
    let record = {
        let log = Rc::clone(log);
        let tick = Rc::clone(tick);
        move |event: &RenderEvent<i32>| {
            log.borrow_mut().push(event.clone());
            if !event.synchronous() {
                tick.schedule();
            }
        }
    };
    let record = Rc::new(record);
    let (a, b, c, d) = (
        Rc::clone(&record),
        Rc::clone(&record),
        Rc::clone(&record),
        Rc::clone(&record),
    );
    RenderEventHandlers::new()
        .on_suspense(move |e| a(e))
        .on_next(move |e| b(e))
        .on_error(move |e| c(e))
        .on_complete(move |e| d(e))
}

struct Harness {
    frames: VirtualScheduler,
    flushes: Rc<Cell<u32>>,
    log: Rc<RefCell<Vec<RenderEvent<i32>>>>,
    manager: RenderEventManager<i32>,
}

fn harness(host: HostCapabilities) -> Harness {
    let frames = VirtualScheduler::new();
    let flushes = Rc::new(Cell::new(0));
    let counter = Rc::clone(&flushes);
    let tick = tick_scheduler_for(
        host,
        frames.shared(),
        Rc::new(move || counter.set(counter.get() + 1)),
    );
    let log = Rc::new(RefCell::new(Vec::new()));
    let manager = RenderEventManager::new(view(&log, &tick));
    Harness {
        frames,
        flushes,
        log,
        manager,
    }
}

fn kinds(log: &Rc<RefCell<Vec<RenderEvent<i32>>>>) -> Vec<RenderEventKind> {
    log.borrow().iter().map(RenderEvent::kind).collect()
}

#[test]
fn synchronous_selection_needs_no_flush() {
    let h = harness(HostCapabilities::default());
    let _active = h.manager.handle_potential_observable_changes().subscribe(|_| {});
    h.manager.next_potential_observable(PotentialObservable::value(1));
    h.frames.run_until_idle();
    assert_eq!(kinds(&h.log), vec![RenderEventKind::Next, RenderEventKind::Complete]);
    assert_eq!(h.flushes.get(), 0);
}

#[test]
fn asynchronous_events_flush_once_per_frame() {
    let h = harness(HostCapabilities::default());
    let _active = h.manager.handle_potential_observable_changes().subscribe(|_| {});
    let source = Subject::<i32>::new();
    h.manager.next_potential_observable(source.as_stream());

    source.next(1);
    source.next(2);
    source.next(3);
    h.frames.run_frame();
    assert_eq!(h.flushes.get(), 1);

    source.next(4);
    h.frames.run_frame();
    assert_eq!(h.flushes.get(), 2);
}

#[test]
fn external_scheduling_host_never_flushes() {
    let h = harness(HostCapabilities {
        external_scheduling: true,
    });
    let _active = h.manager.handle_potential_observable_changes().subscribe(|_| {});
    let source = Subject::<i32>::new();
    h.manager.next_potential_observable(source.as_stream());
    source.next(1);
    h.frames.run_until_idle();
    assert_eq!(h.flushes.get(), 0);
    assert_eq!(kinds(&h.log), vec![RenderEventKind::Suspense, RenderEventKind::Next]);
}

#[test]
fn superseded_deferred_never_reaches_handlers() {
    let h = harness(HostCapabilities::default());
    let _active = h.manager.handle_potential_observable_changes().subscribe(|_| {});
    let (slow, resolve_slow) = Deferred::<i32>::new(h.frames.shared());
    h.manager.next_potential_observable(slow);
    h.manager.next_potential_observable(PotentialObservable::value(2));
    assert!(resolve_slow.resolve(1));
    h.frames.run_until_idle();

    let values: Vec<i32> = h.log.borrow().iter().filter_map(|e| e.value().copied()).collect();
    assert_eq!(values, vec![2]);
    assert_eq!(h.manager.phase(), SelectionPhase::Completed);
}

#[test]
fn in_flight_timer_of_old_selection_is_cancelled() {
    let h = harness(HostCapabilities::default());
    let _active = h.manager.handle_potential_observable_changes().subscribe(|_| {});
    let shared = h.frames.shared();
    let delayed = sources::timer(&shared, std::time::Duration::from_millis(20)).map(|()| 9);
    h.manager.next_potential_observable(delayed);
    h.frames.advance_by(std::time::Duration::from_millis(10));

    let replacement = Subject::<i32>::new();
    h.manager.next_potential_observable(replacement.as_stream());
    h.frames.advance_by(std::time::Duration::from_millis(20));
    assert!(h.log.borrow().iter().all(|e| e.value().is_none()));
    assert_eq!(h.manager.stats().selections_canceled, 1);
}

#[test]
fn coalesced_source_renders_latest_value_once() {
    let h = harness(HostCapabilities::default());
    let _active = h.manager.handle_potential_observable_changes().subscribe(|_| {});
    let input = Subject::<i32>::new();
    let coalesced = input
        .as_stream()
        .pipe(coalesce_with(h.frames.shared(), CoalesceConfig::default()));
    h.manager.next_potential_observable(coalesced);

    for v in 1..=4 {
        input.next(v);
    }
    h.frames.run_microtasks();
    let values: Vec<i32> = h.log.borrow().iter().filter_map(|e| e.value().copied()).collect();
    assert_eq!(values, vec![4]);
}

#[test]
fn error_then_recovery() {
    let h = harness(HostCapabilities::default());
    let _active = h.manager.handle_potential_observable_changes().subscribe(|_| {});
    let source = Subject::<i32>::new();
    h.manager.next_potential_observable(source.as_stream());
    let err = StreamError::msg("offline");
    source.error(err.clone());
    h.manager.next_potential_observable(Stream::of(5_i32));

    assert_eq!(
        kinds(&h.log),
        vec![
            RenderEventKind::Suspense,
            RenderEventKind::Error,
            RenderEventKind::Next,
            RenderEventKind::Complete
        ]
    );
    assert!(h.log.borrow()[1].error().is_some_and(|e| e.ptr_eq(&err)));
    assert!(h.log.borrow()[2].reset());
}

#[test]
fn env_config_selects_tick_variant() {
    let config = RuntimeConfig::from_env();
    let frames = VirtualScheduler::new();
    let tick = tick_scheduler_for(config.host, frames.shared(), Rc::new(|| {}));
    tick.schedule();
    let expected = usize::from(!config.host.external_scheduling);
    assert_eq!(frames.pending_frames(), expected);
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct TargetCounter(Arc<Mutex<HashMap<String, usize>>>);

impl TargetCounter {
    fn count(&self, target: &str) -> usize {
        self.0
            .lock()
            .map(|counts| counts.get(target).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl<S: tracing::Subscriber> Layer<S> for TargetCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if let Ok(mut counts) = self.0.lock() {
            *counts.entry(event.metadata().target().to_owned()).or_default() += 1;
        }
    }
}

#[test]
fn pipeline_emits_structured_events_per_target() {
    let counter = TargetCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());

    tracing::subscriber::with_default(subscriber, || {
        let h = harness(HostCapabilities::default());
        let _active = h.manager.handle_potential_observable_changes().subscribe(|_| {});
        let input = Subject::<i32>::new();
        h.manager.next_potential_observable(
            input
                .as_stream()
                .pipe(coalesce_with(h.frames.shared(), CoalesceConfig::default())),
        );
        input.next(1);
        h.frames.run_microtasks();
        h.frames.run_frame();
    });

    assert!(counter.count("pulse::manager") >= 3);
    assert!(counter.count("pulse::coalesce") >= 2);
    assert_eq!(counter.count("pulse::tick"), 1);
}

// ---------------------------------------------------------------------------
// Tick coalescing property
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum TickOp {
    Schedule,
    ScheduleFromMicrotask,
    RunMicrotasks,
    RunFrame,
}

fn tick_op() -> impl Strategy<Value = TickOp> {
    prop_oneof![
        Just(TickOp::Schedule),
        Just(TickOp::ScheduleFromMicrotask),
        Just(TickOp::RunMicrotasks),
        Just(TickOp::RunFrame),
    ]
}

proptest! {
    #[test]
    fn one_flush_per_frame_with_pending_requests(ops in prop::collection::vec(tick_op(), 0..64)) {
        let frames = VirtualScheduler::new();
        let flushes = Rc::new(Cell::new(0u64));
        let counter = Rc::clone(&flushes);
        let tick = Rc::new(AnimationFrameTickScheduler::new(
            frames.shared(),
            Rc::new(move || counter.set(counter.get() + 1)),
        ));

        // Model: whether a request is pending, and how many are still queued.
        let mut requested = false;
        let mut queued = 0usize;
        let mut expected = 0u64;
        for op in ops {
            match op {
                TickOp::Schedule => {
                    tick.schedule();
                    requested = true;
                }
                TickOp::ScheduleFromMicrotask => {
                    let t = Rc::clone(&tick);
                    frames.schedule_microtask(Box::new(move || t.schedule()));
                    queued += 1;
                }
                TickOp::RunMicrotasks => {
                    frames.run_microtasks();
                    if queued > 0 {
                        requested = true;
                        queued = 0;
                    }
                }
                TickOp::RunFrame => {
                    frames.run_microtasks();
                    if queued > 0 {
                        requested = true;
                        queued = 0;
                    }
                    frames.run_frame();
                    if requested {
                        expected += 1;
                    }
                    requested = false;
                }
            }
            prop_assert_eq!(flushes.get(), expected);
            prop_assert_eq!(tick.flush_count(), expected);
        }
    }
}
