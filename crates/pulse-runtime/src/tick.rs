#![forbid(unsafe_code)]

//! Frame-coalescing flush scheduling.
//!
//! UI glue calls [`TickScheduler::schedule`] whenever a render event arrives
//! asynchronously. The scheduler turns any number of such requests into one
//! flush per frame.
//!
//! Two variants exist, picked once from the host's [`HostCapabilities`] by
//! [`tick_scheduler_for`]:
//!
//! | Variant | When | `schedule()` |
//! |---------|------|--------------|
//! | [`NoopTickScheduler`] | host already flushes after every task | nothing |
//! | [`AnimationFrameTickScheduler`] | otherwise | one frame callback per batch |
//!
//! # Invariants
//!
//! 1. While a flush is pending, further `schedule()` calls do not request
//!    another frame.
//! 2. The frame callback runs exactly one flush, then clears the pending
//!    flag. Requests made during the flush are absorbed by it.
//! 3. Dropping an [`AnimationFrameTickScheduler`] cancels its pending flush.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use pulse_core::SharedScheduler;
use web_time::Instant;

use crate::config::HostCapabilities;

/// The flush contract: a zero-argument callback invoked once per flush.
pub type RenderCallback = Rc<dyn Fn()>;

/// Something that accepts "please flush" requests.
pub trait TickScheduler {
    /// Request a flush.
    fn schedule(&self);
}

impl<S: TickScheduler + ?Sized> TickScheduler for Rc<S> {
    fn schedule(&self) {
        (**self).schedule();
    }
}

// ---------------------------------------------------------------------------
// Noop
// ---------------------------------------------------------------------------

/// Ignores every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTickScheduler;

impl TickScheduler for NoopTickScheduler {
    fn schedule(&self) {}
}

// ---------------------------------------------------------------------------
// Animation frame
// ---------------------------------------------------------------------------

struct FrameState {
    scheduler: SharedScheduler,
    flush: RenderCallback,
    pending: Cell<bool>,
    requests: Cell<u64>,
    flush_count: Cell<u64>,
    last_flush: Cell<Option<Instant>>,
}

impl FrameState {
    fn run(&self) {
        let coalesced = self.requests.replace(0);
        (self.flush)();
        self.flush_count.set(self.flush_count.get() + 1);
        self.last_flush.set(Some(Instant::now()));
        self.pending.set(false);
        tracing::debug!(
            target: "pulse::tick",
            flush = self.flush_count.get(),
            coalesced,
            "flush"
        );
    }
}

/// Batches requests into one flush on the next frame of a [`Scheduler`].
///
/// [`Scheduler`]: pulse_core::Scheduler
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use pulse_core::VirtualScheduler;
/// use pulse_runtime::{AnimationFrameTickScheduler, TickScheduler};
///
/// let frames = VirtualScheduler::new();
/// let flushes = Rc::new(Cell::new(0));
/// let counter = Rc::clone(&flushes);
/// let tick = AnimationFrameTickScheduler::new(
///     frames.shared(),
///     Rc::new(move || counter.set(counter.get() + 1)),
/// );
///
/// tick.schedule();
/// tick.schedule();
/// frames.run_frame();
/// assert_eq!(flushes.get(), 1);
/// ```
pub struct AnimationFrameTickScheduler {
    state: Rc<FrameState>,
}

impl fmt::Debug for AnimationFrameTickScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationFrameTickScheduler")
            .field("pending", &self.state.pending.get())
            .field("flush_count", &self.state.flush_count.get())
            .finish()
    }
}

impl AnimationFrameTickScheduler {
    /// Flush with `flush` on frames requested from `scheduler`.
    #[must_use]
    pub fn new(scheduler: SharedScheduler, flush: RenderCallback) -> Self {
        Self {
            state: Rc::new(FrameState {
                scheduler,
                flush,
                pending: Cell::new(false),
                requests: Cell::new(0),
                flush_count: Cell::new(0),
                last_flush: Cell::new(None),
            }),
        }
    }

    /// Flushes run so far.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.state.flush_count.get()
    }

    /// Whether a frame has been requested and not yet run.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.pending.get()
    }

    /// When the last flush ran.
    #[must_use]
    pub fn last_flush(&self) -> Option<Instant> {
        self.state.last_flush.get()
    }
}

impl TickScheduler for AnimationFrameTickScheduler {
    fn schedule(&self) {
        let state = &self.state;
        state.requests.set(state.requests.get() + 1);
        if state.pending.replace(true) {
            tracing::trace!(target: "pulse::tick", "flush already pending");
            return;
        }
        let weak: Weak<FrameState> = Rc::downgrade(state);
        state.scheduler.request_frame(Box::new(move || {
            if let Some(state) = weak.upgrade() {
                state.run();
            }
        }));
    }
}

/// Pick the tick scheduler for `host`.
///
/// Hosts with external scheduling get a [`NoopTickScheduler`]; all others an
/// [`AnimationFrameTickScheduler`] driving `flush` from `scheduler`'s frames.
#[must_use]
pub fn tick_scheduler_for(
    host: HostCapabilities,
    scheduler: SharedScheduler,
    flush: RenderCallback,
) -> Rc<dyn TickScheduler> {
    if host.external_scheduling {
        tracing::debug!(target: "pulse::tick", "external scheduling: flush requests ignored");
        Rc::new(NoopTickScheduler)
    } else {
        Rc::new(AnimationFrameTickScheduler::new(scheduler, flush))
    }
}
