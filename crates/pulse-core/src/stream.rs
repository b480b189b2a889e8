#![forbid(unsafe_code)]

//! Cold push streams, their producer-side [`Subscriber`] and the consumer-side
//! [`Subscription`] guard.
//!
//! # Usage
//!
//! ```
//! use pulse_core::{Notification, Stream};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let log = Rc::clone(&seen);
//! let numbers: Stream<i32> = [1, 2, 3].into_iter().collect();
//! let _sub = numbers.subscribe(move |n| log.borrow_mut().push(n));
//!
//! assert_eq!(
//!     *seen.borrow(),
//!     vec![
//!         Notification::Next(1),
//!         Notification::Next(2),
//!         Notification::Next(3),
//!         Notification::Complete,
//!     ]
//! );
//! ```
//!
//! # Invariants
//!
//! 1. After `Error` or `Complete` the subscriber is stopped; further emissions
//!    are ignored.
//! 2. A notification emitted while the observer is still handling a previous
//!    one is queued, never delivered re-entrantly.
//! 3. Closing (terminal delivery or unsubscribe) runs teardowns once, in
//!    registration order. Teardowns added after close run immediately.
//! 4. Dropping a [`Subscription`] cancels it; [`Subscription::detach`] opts out.
//!
//! # Failure Modes
//!
//! - Observer panic: propagates to whoever emitted.
//! - Producer never emits: the subscription stays open until cancelled.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::error::StreamError;

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// One signal delivered by a [`Stream`].
#[derive(Clone, Debug, PartialEq)]
pub enum Notification<T> {
    /// A value.
    Next(T),
    /// Terminal failure.
    Error(StreamError),
    /// Terminal success.
    Complete,
}

impl<T> Notification<T> {
    /// Whether this notification ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }

    /// Transform the carried value, keeping terminal signals as they are.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Notification<U> {
        match self {
            Self::Next(value) => Notification::Next(f(value)),
            Self::Error(error) => Notification::Error(error),
            Self::Complete => Notification::Complete,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

type Sink<T> = Box<dyn FnMut(Notification<T>)>;
type Teardown = Box<dyn FnOnce()>;

struct SubscriberInner<T> {
    sink: RefCell<Option<Sink<T>>>,
    queue: RefCell<VecDeque<Notification<T>>>,
    teardowns: RefCell<Vec<Teardown>>,
    draining: Cell<bool>,
    stopped: Cell<bool>,
    closed: Cell<bool>,
}

impl<T> SubscriberInner<T> {
    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.queue.borrow_mut().clear();
        // The sink may be mid-call when a subscription is cancelled from
        // inside its own observer; the drain loop drops it afterwards.
        if let Ok(mut sink) = self.sink.try_borrow_mut() {
            sink.take();
        }
        let teardowns = std::mem::take(&mut *self.teardowns.borrow_mut());
        for teardown in teardowns {
            teardown();
        }
    }
}

/// Producer-side handle of one subscription.
///
/// Clones share state; a producer can hand clones to scheduled tasks or
/// subjects and emit from any of them.
pub struct Subscriber<T> {
    inner: Rc<SubscriberInner<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("stopped", &self.inner.stopped.get())
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}

impl<T: 'static> Subscriber<T> {
    /// Create a subscriber that forwards notifications to `sink`.
    pub fn new(sink: impl FnMut(Notification<T>) + 'static) -> Self {
        Self {
            inner: Rc::new(SubscriberInner {
                sink: RefCell::new(Some(Box::new(sink))),
                queue: RefCell::new(VecDeque::new()),
                teardowns: RefCell::new(Vec::new()),
                draining: Cell::new(false),
                stopped: Cell::new(false),
                closed: Cell::new(false),
            }),
        }
    }

    /// Emit a value.
    pub fn next(&self, value: T) {
        self.emit(Notification::Next(value));
    }

    /// Terminate with an error.
    pub fn error(&self, error: StreamError) {
        self.emit(Notification::Error(error));
    }

    /// Terminate successfully.
    pub fn complete(&self) {
        self.emit(Notification::Complete);
    }

    /// Deliver a notification, queueing it if the observer is busy.
    pub fn emit(&self, notification: Notification<T>) {
        let inner = &self.inner;
        if inner.closed.get() || inner.stopped.get() {
            return;
        }
        if notification.is_terminal() {
            inner.stopped.set(true);
        }
        inner.queue.borrow_mut().push_back(notification);
        if inner.draining.replace(true) {
            return;
        }

        loop {
            if inner.closed.get() {
                break;
            }
            let Some(next) = inner.queue.borrow_mut().pop_front() else {
                break;
            };
            if let Some(sink) = inner.sink.borrow_mut().as_mut() {
                sink(next);
            }
        }
        inner.draining.set(false);

        if inner.closed.get() {
            inner.sink.borrow_mut().take();
            inner.queue.borrow_mut().clear();
        } else if inner.stopped.get() && inner.queue.borrow().is_empty() {
            inner.close();
        }
    }

    /// Register cleanup to run when this subscription closes.
    ///
    /// Runs immediately if the subscription is already closed.
    pub fn add_teardown(&self, teardown: impl FnOnce() + 'static) {
        if self.inner.closed.get() {
            teardown();
            return;
        }
        self.inner.teardowns.borrow_mut().push(Box::new(teardown));
    }

    /// Tie another subscription's lifetime to this one.
    pub fn add_subscription(&self, subscription: Subscription) {
        self.add_teardown(move || subscription.unsubscribe());
    }

    /// Whether the subscriber has been closed (terminated or cancelled).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Whether the subscriber accepts further emissions.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.inner.closed.get() && !self.inner.stopped.get()
    }

    /// Close this subscriber without delivering anything further.
    pub fn unsubscribe(&self) {
        self.inner.close();
    }

    /// A consumer-side guard for this subscriber.
    #[must_use]
    pub fn subscription(&self) -> Subscription {
        Subscription {
            handle: Some(Rc::clone(&self.inner) as Rc<dyn Cancel>),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

trait Cancel {
    fn cancel(&self);
    fn is_closed(&self) -> bool;
}

impl<T> Cancel for SubscriberInner<T> {
    fn cancel(&self) {
        self.close();
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

/// RAII cancellation token for one subscription.
///
/// Dropping the guard cancels the subscription. Use [`detach`](Self::detach)
/// to let the subscription run until its source terminates.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    handle: Option<Rc<dyn Cancel>>,
}

impl Subscription {
    /// A subscription that is already closed.
    pub fn empty() -> Self {
        Self { handle: None }
    }

    /// Cancel now.
    pub fn unsubscribe(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }

    /// Whether the underlying subscriber is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_closed())
    }

    /// Release the guard without cancelling.
    pub fn detach(mut self) {
        self.handle = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// A cold push stream.
///
/// Clones share the producer and compare equal under [`ptr_eq`](Self::ptr_eq).
pub struct Stream<T> {
    producer: Rc<dyn Fn(Subscriber<T>)>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Rc::clone(&self.producer),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("producer", &Rc::as_ptr(&self.producer).cast::<()>())
            .finish()
    }
}

impl<T> Stream<T> {
    /// Whether both handles share the same producer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.producer), Rc::as_ptr(&other.producer))
    }
}

impl<T: 'static> Stream<T> {
    /// Create a stream from a producer run once per subscription.
    pub fn new(producer: impl Fn(Subscriber<T>) + 'static) -> Self {
        Self {
            producer: Rc::new(producer),
        }
    }

    /// Subscribe with an observer receiving every notification.
    pub fn subscribe(&self, observer: impl FnMut(Notification<T>) + 'static) -> Subscription {
        let subscriber = Subscriber::new(observer);
        self.subscribe_with(subscriber.clone());
        subscriber.subscription()
    }

    /// Run the producer against an existing subscriber.
    pub fn subscribe_with(&self, subscriber: Subscriber<T>) {
        if subscriber.is_closed() {
            return;
        }
        (self.producer)(subscriber);
    }

    /// Subscribe to values only; terminal notifications are ignored.
    pub fn for_each(&self, mut on_next: impl FnMut(T) + 'static) -> Subscription {
        self.subscribe(move |n| {
            if let Notification::Next(value) = n {
                on_next(value);
            }
        })
    }

    /// Apply an operator.
    pub fn pipe<U>(self, operator: impl FnOnce(Self) -> Stream<U>) -> Stream<U> {
        operator(self)
    }

    /// Build a derived stream whose per-subscription step function receives
    /// every upstream notification and a handle to the downstream subscriber.
    ///
    /// `init` is called once per subscription so operators can keep private
    /// state. The upstream subscription is cancelled with the downstream one,
    /// including while the upstream is still emitting synchronously.
    pub fn operate<U: 'static, F>(&self, init: impl Fn() -> F + 'static) -> Stream<U>
    where
        F: FnMut(&Subscriber<U>, Notification<T>) + 'static,
    {
        let source = self.clone();
        Stream::new(move |downstream: Subscriber<U>| {
            let mut step = init();
            let out = downstream.clone();
            let upstream = Subscriber::new(move |n| step(&out, n));
            downstream.add_subscription(upstream.subscription());
            source.subscribe_with(upstream);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder<T: 'static>() -> (
        Rc<RefCell<Vec<Notification<T>>>>,
        impl FnMut(Notification<T>) + 'static,
    ) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        (log, move |n| sink.borrow_mut().push(n))
    }

    #[test]
    fn synchronous_producer_delivers_in_order() {
        let stream = Stream::new(|s: Subscriber<i32>| {
            s.next(1);
            s.next(2);
            s.complete();
        });
        let (log, sink) = recorder();
        let sub = stream.subscribe(sink);
        assert!(sub.is_closed());
        assert_eq!(
            *log.borrow(),
            vec![
                Notification::Next(1),
                Notification::Next(2),
                Notification::Complete
            ]
        );
    }

    #[test]
    fn nothing_after_terminal() {
        let stream = Stream::new(|s: Subscriber<i32>| {
            s.error(StreamError::msg("bad"));
            s.next(1);
            s.complete();
        });
        let (log, sink) = recorder();
        let _sub = stream.subscribe(sink);
        assert_eq!(log.borrow().len(), 1);
        assert!(matches!(log.borrow()[0], Notification::Error(_)));
    }

    #[test]
    fn unsubscribe_stops_later_emissions() {
        let handle: Rc<RefCell<Option<Subscriber<i32>>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&handle);
        let stream = Stream::new(move |s| *slot.borrow_mut() = Some(s));
        let (log, sink) = recorder();
        let sub = stream.subscribe(sink);

        let producer = handle.borrow().clone().expect("producer ran");
        producer.next(1);
        sub.unsubscribe();
        producer.next(2);

        assert_eq!(*log.borrow(), vec![Notification::Next(1)]);
        assert!(producer.is_closed());
    }

    #[test]
    fn dropping_subscription_cancels() {
        let handle: Rc<RefCell<Option<Subscriber<i32>>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&handle);
        let stream = Stream::new(move |s| *slot.borrow_mut() = Some(s));
        let (log, sink) = recorder();
        drop(stream.subscribe(sink));

        let producer = handle.borrow().clone().expect("producer ran");
        producer.next(1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn detach_keeps_subscription_alive() {
        let handle: Rc<RefCell<Option<Subscriber<i32>>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&handle);
        let stream = Stream::new(move |s| *slot.borrow_mut() = Some(s));
        let (log, sink) = recorder();
        stream.subscribe(sink).detach();

        let producer = handle.borrow().clone().expect("producer ran");
        producer.next(7);
        assert_eq!(*log.borrow(), vec![Notification::Next(7)]);
    }

    #[test]
    fn teardowns_run_once_on_complete() {
        let runs = Rc::new(Cell::new(0));
        let r = Rc::clone(&runs);
        let stream = Stream::new(move |s: Subscriber<()>| {
            let r = Rc::clone(&r);
            s.add_teardown(move || r.set(r.get() + 1));
            s.complete();
        });
        let sub = stream.subscribe(|_| {});
        sub.unsubscribe();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn teardown_added_after_close_runs_immediately() {
        let s: Subscriber<i32> = Subscriber::new(|_| {});
        s.complete();
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        s.add_teardown(move || r.set(true));
        assert!(ran.get());
    }

    #[test]
    fn reentrant_emission_is_queued() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let handle: Rc<RefCell<Option<Subscriber<i32>>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&handle);
        let stream = Stream::new(move |s| *slot.borrow_mut() = Some(s));

        let log = Rc::clone(&order);
        let again = Rc::clone(&handle);
        let _sub = stream.subscribe(move |n| {
            if let Notification::Next(v) = n {
                log.borrow_mut().push(format!("start {v}"));
                if v == 1 {
                    let producer = again.borrow().clone().expect("producer");
                    producer.next(2);
                }
                log.borrow_mut().push(format!("end {v}"));
            }
        });

        let producer = handle.borrow().clone().expect("producer");
        producer.next(1);
        assert_eq!(
            *order.borrow(),
            vec!["start 1", "end 1", "start 2", "end 2"]
        );
    }

    #[test]
    fn cancelling_operator_mid_burst_stops_producer() {
        let produced = Rc::new(Cell::new(0));
        let p = Rc::clone(&produced);
        let stream = Stream::new(move |s: Subscriber<i32>| {
            for v in 1..=5 {
                if !s.is_active() {
                    break;
                }
                p.set(v);
                s.next(v);
            }
        });

        let slot: Rc<RefCell<Option<Subscriber<i32>>>> = Rc::new(RefCell::new(None));
        let cancel = Rc::clone(&slot);
        let downstream = Subscriber::new(move |n| {
            if n == Notification::Next(2) {
                if let Some(s) = cancel.borrow().as_ref() {
                    s.unsubscribe();
                }
            }
        });
        *slot.borrow_mut() = Some(downstream.clone());

        stream
            .operate(|| |out: &Subscriber<i32>, n: Notification<i32>| out.emit(n))
            .subscribe_with(downstream);
        assert_eq!(produced.get(), 2);
        slot.borrow_mut().take();
    }

    #[test]
    fn unsubscribe_from_inside_observer() {
        let handle: Rc<RefCell<Option<Subscriber<i32>>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&handle);
        let stream = Stream::new(move |s| *slot.borrow_mut() = Some(s));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let cancel = Rc::clone(&handle);
        let _sub = stream.subscribe(move |n| {
            if let Notification::Next(v) = n {
                log.borrow_mut().push(v);
                cancel.borrow().as_ref().expect("producer").unsubscribe();
            }
        });

        let producer = handle.borrow().clone().expect("producer");
        producer.next(1);
        producer.next(2);
        assert_eq!(*seen.borrow(), vec![1]);
        assert!(producer.is_closed());
    }

    #[test]
    fn clones_share_identity() {
        let a: Stream<i32> = Stream::new(|s| s.complete());
        let b = a.clone();
        let c: Stream<i32> = Stream::new(|s| s.complete());
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }

    #[test]
    fn empty_subscription_is_closed() {
        assert!(Subscription::empty().is_closed());
    }

    #[test]
    fn notification_map_keeps_terminals() {
        assert_eq!(Notification::Next(2).map(|v| v * 10), Notification::Next(20));
        assert_eq!(
            Notification::<i32>::Complete.map(|v| v * 10),
            Notification::Complete
        );
        assert!(Notification::<i32>::Complete.is_terminal());
        assert!(!Notification::Next(0).is_terminal());
    }
}
