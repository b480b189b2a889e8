#![forbid(unsafe_code)]

//! The injected timing capability.
//!
//! Nothing in Pulse looks up ambient timing APIs. Anything that needs to run
//! "later" receives a [`Scheduler`] and asks it for a microtask, a frame
//! callback, or a timer. Hosts implement the trait on top of their event loop;
//! [`VirtualScheduler`] is a deterministic implementation driven explicitly by
//! the caller, used by tests and by hosts that pump work themselves.
//!
//! # Ordering
//!
//! [`VirtualScheduler`] follows the usual browser-style ordering:
//!
//! 1. Microtasks run in FIFO order until the queue is empty, including
//!    microtasks queued by microtasks.
//! 2. A frame runs every callback requested before the frame started.
//!    Callbacks requested during the frame wait for the next one. Microtasks
//!    are drained after each callback.
//! 3. Timers fire in deadline order (ties in scheduling order), each followed
//!    by a microtask drain.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Shared handle to a scheduler.
pub type SharedScheduler = Rc<dyn Scheduler>;

/// Timing capability passed explicitly to anything that defers work.
pub trait Scheduler {
    /// Run `task` after the current task, before the next frame or timer.
    fn schedule_microtask(&self, task: Task);

    /// Run `task` at the start of the next frame.
    fn request_frame(&self, task: Task);

    /// Run `task` once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, task: Task);

    /// Elapsed time on this scheduler's clock.
    fn now(&self) -> Duration;
}

/// Upper bound on rounds performed by [`VirtualScheduler::run_until_idle`].
pub const MAX_IDLE_ROUNDS: usize = 100_000;

#[derive(Default)]
struct VirtualState {
    now: Duration,
    microtasks: VecDeque<Task>,
    frames: Vec<Task>,
    timers: BTreeMap<(Duration, u64), Task>,
    next_timer_seq: u64,
    frames_run: u64,
}

/// Deterministic, host-driven scheduler.
///
/// Clones share the same queues and clock.
#[derive(Clone, Default)]
pub struct VirtualScheduler {
    state: Rc<RefCell<VirtualState>>,
}

impl fmt::Debug for VirtualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("VirtualScheduler")
            .field("now", &state.now)
            .field("microtasks", &state.microtasks.len())
            .field("frames", &state.frames.len())
            .field("timers", &state.timers.len())
            .field("frames_run", &state.frames_run)
            .finish()
    }
}

impl VirtualScheduler {
    /// Create an idle scheduler at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A type-erased handle sharing this scheduler's queues.
    #[must_use]
    pub fn shared(&self) -> SharedScheduler {
        Rc::new(self.clone())
    }

    /// Drain the microtask queue. Returns the number of tasks run.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.state.borrow_mut().microtasks.pop_front();
            let Some(task) = task else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    /// Run one frame. Returns the number of frame callbacks run.
    pub fn run_frame(&self) -> usize {
        self.run_microtasks();
        let callbacks = {
            let mut state = self.state.borrow_mut();
            state.frames_run += 1;
            std::mem::take(&mut state.frames)
        };
        let ran = callbacks.len();
        for callback in callbacks {
            callback();
            self.run_microtasks();
        }
        ran
    }

    /// Advance the clock by `delta`, firing due timers in order.
    /// Returns the number of timers fired.
    pub fn advance_by(&self, delta: Duration) -> usize {
        self.run_microtasks();
        let target = self.state.borrow().now + delta;
        let mut fired = 0;
        loop {
            let due = {
                let mut state = self.state.borrow_mut();
                match state.timers.first_key_value() {
                    Some((&(deadline, _), _)) if deadline <= target => {
                        state.now = deadline;
                        state.timers.pop_first().map(|(_, task)| task)
                    }
                    _ => None,
                }
            };
            let Some(task) = due else {
                break;
            };
            task();
            self.run_microtasks();
            fired += 1;
        }
        self.state.borrow_mut().now = target;
        fired
    }

    /// Run microtasks, frames and timers until nothing is queued.
    ///
    /// Work that keeps rescheduling itself never idles; this stops after
    /// [`MAX_IDLE_ROUNDS`] rounds. Returns the number of rounds performed.
    pub fn run_until_idle(&self) -> usize {
        let mut rounds = 0;
        while rounds < MAX_IDLE_ROUNDS {
            self.run_microtasks();
            let (has_frames, next_deadline) = {
                let state = self.state.borrow();
                (
                    !state.frames.is_empty(),
                    state.timers.keys().next().map(|&(deadline, _)| deadline),
                )
            };
            if has_frames {
                self.run_frame();
            } else if let Some(deadline) = next_deadline {
                let now = self.now();
                self.advance_by(deadline.saturating_sub(now));
            } else {
                break;
            }
            rounds += 1;
        }
        rounds
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of queued microtasks.
    #[must_use]
    pub fn pending_microtasks(&self) -> usize {
        self.state.borrow().microtasks.len()
    }

    /// Number of frame callbacks waiting for the next frame.
    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.state.borrow().frames.len()
    }

    /// Number of armed timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Number of frames run so far.
    #[must_use]
    pub fn frames_run(&self) -> u64 {
        self.state.borrow().frames_run
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule_microtask(&self, task: Task) {
        self.state.borrow_mut().microtasks.push_back(task);
    }

    fn request_frame(&self, task: Task) {
        self.state.borrow_mut().frames.push(task);
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        let mut state = self.state.borrow_mut();
        let deadline = state.now + delay;
        let seq = state.next_timer_seq;
        state.next_timer_seq += 1;
        state.timers.insert((deadline, seq), task);
    }

    fn now(&self) -> Duration {
        self.state.borrow().now
    }
}
