#![forbid(unsafe_code)]

//! The render-event manager.
//!
//! A [`RenderEventManager`] turns a changing *selection* (a
//! [`PotentialObservable`]) into render events and dispatches them to its
//! [`RenderEventHandlers`]. The pipeline behind
//! [`handle_potential_observable_changes`](RenderEventManager::handle_potential_observable_changes)
//! is:
//!
//! ```text
//! selections (replay 1)
//!   → distinct by same_selection
//!   → map(to_render_event_stream)
//!   → switch_all
//!   → distinct by RenderEvent::is_duplicate_of
//!   → dispatch
//! ```
//!
//! # Selection lifecycle
//!
//! ```text
//!          ┌──────────── Canceled (superseded / pipeline stopped) ─────┐
//!          │                                                           │
//! Fresh ──┬── Suspended ────┐                                          │
//!         └── FirstEvent ───┴── SubsequentEvents ── Completed | Errored
//! ```
//!
//! # Invariants
//!
//! 1. At most one selection is subscribed at any time; the previous one is
//!    cancelled before the next one subscribes.
//! 2. Recording a selection supersedes the current one at once. A selection
//!    still emitting synchronously when a handler records its successor
//!    delivers nothing further.
//! 3. The first event of a selection carries `reset = true`. A selection that
//!    emits nothing during subscribe gets a synchronous `Suspense` instead.
//! 4. Events produced during subscribe carry `synchronous = true`; all later
//!    events carry `synchronous = false`.
//! 5. Source errors and completion become render events; they end the
//!    selection, never the pipeline.
//! 6. Consecutive duplicate events are suppressed (see
//!    [`RenderEvent::is_duplicate_of`]). The check spans selections, so a
//!    pending selection replacing another pending selection dispatches no
//!    second `Suspense`.
//!
//! # Failure Modes
//!
//! - Handler panic: propagates to whoever pushed the notification.
//! - A selection that never emits stays suspended until superseded.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use pulse_core::{Notification, PotentialObservable, Stream, Subject, Subscriber, normalize};

use crate::render_event::{RenderEvent, RenderEventHandlers, RenderEventKind};

/// Where the current selection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectionPhase {
    /// No selection has been subscribed yet.
    #[default]
    Idle,
    /// Subscribing; nothing produced yet.
    Fresh,
    /// Nothing produced during subscribe; waiting for the source.
    Suspended,
    /// The first value has been produced.
    FirstEvent,
    /// At least one value after the first.
    SubsequentEvents,
    /// The source completed.
    Completed,
    /// The source failed.
    Errored,
    /// Superseded or stopped before terminating.
    Canceled,
}

impl SelectionPhase {
    /// Whether the selection ended by itself.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }

    fn after(self, event: RenderEventKind) -> Self {
        match event {
            RenderEventKind::Suspense => Self::Suspended,
            RenderEventKind::Next => match self {
                Self::Fresh => Self::FirstEvent,
                _ => Self::SubsequentEvents,
            },
            RenderEventKind::Error => Self::Errored,
            RenderEventKind::Complete => Self::Completed,
        }
    }
}

/// Counters describing what the manager has done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ManagerStats {
    /// Selections that reached the pipeline, including ones superseded
    /// before they could subscribe.
    pub selections_accepted: u64,
    /// Selections dropped as identical to the current one.
    pub selections_ignored: u64,
    /// Selections cancelled before they terminated.
    pub selections_canceled: u64,
    /// Events handed to the handler table.
    pub events_dispatched: u64,
    /// Events dropped as consecutive duplicates.
    pub events_suppressed: u64,
}

#[derive(Default)]
struct Tracker {
    phase: Cell<SelectionPhase>,
    stats: Cell<ManagerStats>,
    epoch: Cell<u64>,
}

impl Tracker {
    fn bump(&self, f: impl FnOnce(&mut ManagerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn observe(&self, kind: RenderEventKind) {
        self.phase.set(self.phase.get().after(kind));
    }

    /// Advance the epoch; selections stamped earlier are stale from now on.
    fn supersede(&self) -> u64 {
        let epoch = self.epoch.get() + 1;
        self.epoch.set(epoch);
        epoch
    }

    fn is_stale(&self, epoch: Option<u64>) -> bool {
        epoch.is_some_and(|epoch| epoch != self.epoch.get())
    }

    fn cancel(&self) {
        let phase = self.phase.get();
        if phase.is_terminal() || phase == SelectionPhase::Canceled {
            return;
        }
        self.phase.set(SelectionPhase::Canceled);
        self.bump(|s| s.selections_canceled += 1);
        tracing::debug!(target: "pulse::manager", from = ?phase, "selection canceled");
    }
}

// ---------------------------------------------------------------------------
// Per-selection event stream
// ---------------------------------------------------------------------------

struct Flags {
    reset: Cell<bool>,
    synchronous: Cell<bool>,
}

/// Turn one selection into render events.
///
/// Subscribing subscribes the normalized source with `reset` and
/// `synchronous` both set. Each source notification becomes a render event
/// carrying the current flags, after which `reset` is cleared. If nothing was
/// produced by the time the source's subscribe returns, a [`Suspense`] event
/// is emitted. From then on `synchronous` is cleared.
///
/// Source errors and completion are emitted as `Error` / `Complete` events,
/// after which the returned stream completes. Consecutive equal values are
/// collapsed before they become events.
///
/// [`Suspense`]: RenderEvent::Suspense
pub fn to_render_event_stream<T>(potential: &PotentialObservable<T>) -> Stream<RenderEvent<T>>
where
    T: Clone + PartialEq + 'static,
{
    let source = normalize(potential).distinct_until_changed();
    Stream::new(move |out: Subscriber<RenderEvent<T>>| {
        let flags = Rc::new(Flags {
            reset: Cell::new(true),
            synchronous: Cell::new(true),
        });

        let sink = out.clone();
        let state = Rc::clone(&flags);
        let upstream = Subscriber::new(move |n: Notification<T>| {
            let reset = state.reset.replace(false);
            let synchronous = state.synchronous.get();
            match n {
                Notification::Next(value) => sink.next(RenderEvent::Next {
                    value,
                    reset,
                    synchronous,
                }),
                Notification::Error(error) => {
                    sink.next(RenderEvent::Error {
                        error,
                        reset,
                        synchronous,
                    });
                    sink.complete();
                }
                Notification::Complete => {
                    sink.next(RenderEvent::Complete { reset, synchronous });
                    sink.complete();
                }
            }
        });
        out.add_subscription(upstream.subscription());
        source.subscribe_with(upstream);

        if flags.reset.get() && out.is_active() {
            flags.reset.set(false);
            out.next(RenderEvent::suspense());
        }
        flags.synchronous.set(false);
    })
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// A selection plus the epoch it was recorded in. Selections arriving from
/// outside the manager carry no epoch and are only superseded by switching.
struct Recorded<T> {
    epoch: Option<u64>,
    selection: PotentialObservable<T>,
}

impl<T: Clone> Clone for Recorded<T> {
    fn clone(&self) -> Self {
        Self {
            epoch: self.epoch,
            selection: self.selection.clone(),
        }
    }
}

/// Owns the current selection and the handler table.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use pulse_core::PotentialObservable;
/// use pulse_runtime::{RenderEventHandlers, RenderEventManager};
///
/// let rendered = Rc::new(RefCell::new(Vec::new()));
/// let sink = Rc::clone(&rendered);
/// let manager = RenderEventManager::new(
///     RenderEventHandlers::<i32>::new().on_next(move |e| sink.borrow_mut().extend(e.value().copied())),
/// );
///
/// let _active = manager.handle_potential_observable_changes().subscribe(|_| {});
/// manager.next_potential_observable(PotentialObservable::value(1));
/// manager.next_potential_observable(PotentialObservable::value(2));
/// assert_eq!(*rendered.borrow(), vec![1, 2]);
/// ```
pub struct RenderEventManager<T> {
    selections: Subject<Recorded<T>>,
    handlers: Rc<RenderEventHandlers<T>>,
    tracker: Rc<Tracker>,
}

impl<T> fmt::Debug for RenderEventManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEventManager")
            .field("phase", &self.tracker.phase.get())
            .field("stats", &self.tracker.stats.get())
            .field("handlers", &self.handlers)
            .finish()
    }
}

/// Create a manager dispatching into `handlers`.
pub fn create_render_event_manager<T>(handlers: RenderEventHandlers<T>) -> RenderEventManager<T>
where
    T: Clone + PartialEq + 'static,
{
    RenderEventManager::new(handlers)
}

impl<T: Clone + PartialEq + 'static> RenderEventManager<T> {
    /// Create a manager dispatching into `handlers`.
    #[must_use]
    pub fn new(handlers: RenderEventHandlers<T>) -> Self {
        Self {
            selections: Subject::replay(1),
            handlers: Rc::new(handlers),
            tracker: Rc::new(Tracker::default()),
        }
    }

    /// Record a new selection.
    ///
    /// Passing the selection that is already current is a no-op. Otherwise
    /// the current selection is superseded immediately, even when this is
    /// called from a handler while that selection is still emitting.
    pub fn next_potential_observable(&self, selection: impl Into<PotentialObservable<T>>) {
        let selection = selection.into();
        let current = self.selections.latest();
        if current.is_some_and(|current| current.selection.same_selection(&selection)) {
            self.tracker.bump(|s| s.selections_ignored += 1);
            tracing::debug!(target: "pulse::manager", kind = selection.kind(), "selection unchanged");
            return;
        }
        let epoch = self.tracker.supersede();
        tracing::debug!(target: "pulse::manager", kind = selection.kind(), epoch, "selection recorded");
        self.selections.next(Recorded {
            epoch: Some(epoch),
            selection,
        });
    }

    /// Start processing selections.
    ///
    /// Nothing happens until the returned stream is subscribed. Each
    /// subscription is an independent activation that starts from the latest
    /// selection; cancelling it cancels the current selection.
    #[must_use]
    pub fn handle_potential_observable_changes(&self) -> Stream<RenderEvent<T>> {
        self.pipeline(self.selections.as_stream())
    }

    /// The manager's pipeline applied to an arbitrary selection stream.
    #[must_use]
    pub fn render_events(&self, selections: Stream<PotentialObservable<T>>) -> Stream<RenderEvent<T>> {
        self.pipeline(selections.map(|selection| Recorded {
            epoch: None,
            selection,
        }))
    }

    fn pipeline(&self, selections: Stream<Recorded<T>>) -> Stream<RenderEvent<T>> {
        let ignore = Rc::clone(&self.tracker);
        let accept = Rc::clone(&self.tracker);
        let suppress = Rc::clone(&self.tracker);
        let dispatch = Rc::clone(&self.tracker);
        let handlers = Rc::clone(&self.handlers);

        selections
            .distinct_until_changed_by(move |current, next| {
                let same = current.selection.same_selection(&next.selection);
                if same {
                    ignore.bump(|s| s.selections_ignored += 1);
                }
                same
            })
            .map(move |recorded: Recorded<T>| {
                accept.bump(|s| s.selections_accepted += 1);
                tracing::debug!(
                    target: "pulse::manager",
                    kind = recorded.selection.kind(),
                    epoch = ?recorded.epoch,
                    "selection accepted"
                );
                tracked(&accept, recorded.epoch, to_render_event_stream(&recorded.selection))
            })
            .switch_all()
            .distinct_until_changed_by(move |previous, event| {
                let duplicate = event.is_duplicate_of(previous);
                if duplicate {
                    suppress.bump(|s| s.events_suppressed += 1);
                    tracing::trace!(target: "pulse::manager", kind = %event.kind(), "duplicate event suppressed");
                }
                duplicate
            })
            .tap(move |event| {
                dispatch.bump(|s| s.events_dispatched += 1);
                tracing::trace!(
                    target: "pulse::manager",
                    kind = %event.kind(),
                    reset = event.reset(),
                    synchronous = event.synchronous(),
                    "dispatch"
                );
                handlers.dispatch(event);
            })
    }

    /// Lifecycle phase of the current selection.
    #[must_use]
    pub fn phase(&self) -> SelectionPhase {
        self.tracker.phase.get()
    }

    /// Counters since construction.
    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        self.tracker.stats.get()
    }

    /// The selection new activations start from.
    #[must_use]
    pub fn current_selection(&self) -> Option<PotentialObservable<T>> {
        self.selections.latest().map(|recorded| recorded.selection)
    }
}

/// Wrap one selection's events so the tracker follows its lifecycle.
///
/// Once the tracker's epoch moves past `epoch`, the selection is closed and
/// its remaining events are dropped.
fn tracked<T: Clone + 'static>(
    tracker: &Rc<Tracker>,
    epoch: Option<u64>,
    events: Stream<RenderEvent<T>>,
) -> Stream<RenderEvent<T>> {
    let tracker = Rc::clone(tracker);
    Stream::new(move |subscriber: Subscriber<RenderEvent<T>>| {
        tracker.phase.set(SelectionPhase::Fresh);
        let on_close = Rc::clone(&tracker);
        subscriber.add_teardown(move || on_close.cancel());
        if tracker.is_stale(epoch) {
            subscriber.unsubscribe();
            return;
        }

        let out = subscriber.clone();
        let observer = Rc::clone(&tracker);
        let upstream = Subscriber::new(move |n: Notification<RenderEvent<T>>| {
            if observer.is_stale(epoch) {
                tracing::debug!(target: "pulse::manager", ?epoch, "superseded selection closed");
                out.unsubscribe();
                return;
            }
            if let Notification::Next(event) = &n {
                observer.observe(event.kind());
            }
            out.emit(n);
        });
        subscriber.add_subscription(upstream.subscription());
        events.subscribe_with(upstream);
    })
}
