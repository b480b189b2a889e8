#![forbid(unsafe_code)]

//! Settle-once deferred values.
//!
//! A [`Deferred<T>`] is resolved or rejected at most once through its
//! [`Resolver<T>`]. Continuations registered with [`Deferred::then`] always run
//! on a later microtask of the deferred's [`Scheduler`], even when the value is
//! already available. That is what makes a deferred source observably
//! asynchronous to the render-event pipeline.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::StreamError;
use crate::scheduler::SharedScheduler;
use crate::stream::{Stream, Subscriber};

type Continuation<T> = Box<dyn FnOnce(Result<T, StreamError>)>;

enum State<T> {
    Pending(Vec<(u64, Continuation<T>)>),
    Settled(Result<T, StreamError>),
}

struct Inner<T> {
    state: RefCell<State<T>>,
    scheduler: SharedScheduler,
    next_key: Cell<u64>,
}

impl<T> Inner<T> {
    /// Drop a waiting continuation. No-op once settled.
    fn forget(&self, key: u64) {
        if let State::Pending(waiting) = &mut *self.state.borrow_mut() {
            waiting.retain(|(k, _)| *k != key);
        }
    }
}

impl<T: Clone + 'static> Inner<T> {
    fn settle(&self, outcome: Result<T, StreamError>) -> bool {
        let waiting = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Settled(_) => return false,
                State::Pending(waiting) => {
                    let waiting = std::mem::take(waiting);
                    *state = State::Settled(outcome.clone());
                    waiting
                }
            }
        };
        for (_, continuation) in waiting {
            let outcome = outcome.clone();
            self.scheduler
                .schedule_microtask(Box::new(move || continuation(outcome)));
        }
        true
    }
}

/// A single value available later.
pub struct Deferred<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settled = matches!(*self.inner.state.borrow(), State::Settled(_));
        f.debug_struct("Deferred")
            .field("settled", &settled)
            .finish()
    }
}

impl<T> Deferred<T> {
    /// Whether both handles refer to the same deferred value.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Create a pending deferred and the handle that settles it.
    #[must_use]
    pub fn new(scheduler: SharedScheduler) -> (Self, Resolver<T>) {
        let inner = Rc::new(Inner {
            state: RefCell::new(State::Pending(Vec::new())),
            scheduler,
            next_key: Cell::new(0),
        });
        (
            Self {
                inner: Rc::clone(&inner),
            },
            Resolver { inner },
        )
    }

    /// An already-resolved deferred.
    #[must_use]
    pub fn resolved(scheduler: SharedScheduler, value: T) -> Self {
        let (deferred, resolver) = Self::new(scheduler);
        resolver.resolve(value);
        deferred
    }

    /// An already-rejected deferred.
    #[must_use]
    pub fn rejected(scheduler: SharedScheduler, error: StreamError) -> Self {
        let (deferred, resolver) = Self::new(scheduler);
        resolver.reject(error);
        deferred
    }

    /// Whether the value (or rejection) is available.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(*self.inner.state.borrow(), State::Settled(_))
    }

    /// The outcome, if settled.
    #[must_use]
    pub fn peek(&self) -> Option<Result<T, StreamError>> {
        match &*self.inner.state.borrow() {
            State::Settled(outcome) => Some(outcome.clone()),
            State::Pending(_) => None,
        }
    }

    /// Run `continuation` with the outcome on a later microtask.
    pub fn then(&self, continuation: impl FnOnce(Result<T, StreamError>) + 'static) {
        self.register(Box::new(continuation));
    }

    /// Continuations waiting for the outcome.
    #[must_use]
    pub fn waiting(&self) -> usize {
        match &*self.inner.state.borrow() {
            State::Pending(waiting) => waiting.len(),
            State::Settled(_) => 0,
        }
    }

    /// Queue `continuation`, returning its key while the deferred is pending.
    fn register(&self, continuation: Continuation<T>) -> Option<u64> {
        let settled = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                State::Pending(waiting) => {
                    let key = self.inner.next_key.get();
                    self.inner.next_key.set(key + 1);
                    waiting.push((key, continuation));
                    return Some(key);
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };
        self.inner
            .scheduler
            .schedule_microtask(Box::new(move || continuation(settled)));
        None
    }

    /// A single-element stream of the outcome.
    ///
    /// Emits the value then completes, or errors with the rejection. Nothing
    /// is delivered synchronously, and nothing at all once unsubscribed.
    /// Unsubscribing before settlement releases the waiting continuation.
    #[must_use]
    pub fn to_stream(&self) -> Stream<T> {
        let deferred = self.clone();
        Stream::new(move |subscriber: Subscriber<T>| {
            let sink = subscriber.clone();
            let key = deferred.register(Box::new(move |outcome| match outcome {
                Ok(value) => {
                    sink.next(value);
                    sink.complete();
                }
                Err(error) => sink.error(error),
            }));
            if let Some(key) = key {
                let inner = Rc::downgrade(&deferred.inner);
                subscriber.add_teardown(move || {
                    if let Some(inner) = inner.upgrade() {
                        inner.forget(key);
                    }
                });
            }
        })
    }
}

/// Settles a [`Deferred`].
pub struct Resolver<T> {
    inner: Rc<Inner<T>>,
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl<T: Clone + 'static> Resolver<T> {
    /// Resolve with `value`. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.inner.settle(Ok(value))
    }

    /// Reject with `error`. Returns `false` if already settled.
    pub fn reject(&self, error: StreamError) -> bool {
        self.inner.settle(Err(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::VirtualScheduler;
    use crate::stream::Notification;
    use std::cell::Cell;

    #[test]
    fn continuation_never_runs_inline() {
        let sched = VirtualScheduler::new();
        let deferred = Deferred::resolved(sched.shared(), 5);
        let got = Rc::new(Cell::new(None));
        let g = Rc::clone(&got);
        deferred.then(move |r| g.set(r.ok()));
        assert_eq!(got.get(), None);
        sched.run_microtasks();
        assert_eq!(got.get(), Some(5));
    }

    #[test]
    fn settles_once() {
        let sched = VirtualScheduler::new();
        let (deferred, resolver) = Deferred::new(sched.shared());
        assert!(!deferred.is_settled());
        assert!(resolver.resolve(1));
        assert!(!resolver.resolve(2));
        assert!(!resolver.reject(StreamError::msg("late")));
        assert_eq!(deferred.peek().map(Result::ok), Some(Some(1)));
    }

    #[test]
    fn stream_emits_value_then_completes_asynchronously() {
        let sched = VirtualScheduler::new();
        let (deferred, resolver) = Deferred::new(sched.shared());
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let _sub = deferred.to_stream().subscribe(move |n| l.borrow_mut().push(n));

        resolver.resolve("ready");
        assert!(log.borrow().is_empty());
        sched.run_microtasks();
        assert_eq!(
            *log.borrow(),
            vec![Notification::Next("ready"), Notification::Complete]
        );
    }

    #[test]
    fn rejection_becomes_stream_error() {
        let sched = VirtualScheduler::new();
        let err = StreamError::msg("nope");
        let deferred: Deferred<u8> = Deferred::rejected(sched.shared(), err.clone());
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let _sub = deferred.to_stream().subscribe(move |n| l.borrow_mut().push(n));
        sched.run_microtasks();
        assert_eq!(*log.borrow(), vec![Notification::Error(err)]);
    }

    #[test]
    fn unsubscribing_pending_stream_releases_continuation() {
        let sched = VirtualScheduler::new();
        let (deferred, resolver) = Deferred::<u32>::new(sched.shared());
        for _ in 0..100 {
            let sub = deferred.to_stream().subscribe(|_| {});
            assert_eq!(deferred.waiting(), 1);
            sub.unsubscribe();
        }
        assert_eq!(deferred.waiting(), 0);

        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let _sub = deferred.to_stream().subscribe(move |n| l.borrow_mut().push(n));
        resolver.resolve(9);
        assert_eq!(deferred.waiting(), 0);
        sched.run_microtasks();
        assert_eq!(*log.borrow(), vec![Notification::Next(9), Notification::Complete]);
    }

    #[test]
    fn unsubscribed_stream_receives_nothing() {
        let sched = VirtualScheduler::new();
        let deferred = Deferred::resolved(sched.shared(), 3);
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let sub = deferred.to_stream().subscribe(move |n| l.borrow_mut().push(n));
        sub.unsubscribe();
        sched.run_microtasks();
        assert!(log.borrow().is_empty());
    }
}
