#![forbid(unsafe_code)]

//! Hot multicast sources.
//!
//! A [`Subject<T>`] pushes every value to all current subscribers. With a
//! replay capacity it also hands the most recent values to late subscribers,
//! which is how the render-event manager remembers its current selection
//! across restarts.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in subscription order.
//! 2. After `complete`/`error`, later subscribers receive the replay buffer
//!    followed by the terminal notification.
//! 3. Cancelled subscribers are pruned before the next push.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::error::StreamError;
use crate::stream::{Notification, Stream, Subscriber};

struct Inner<T> {
    observers: RefCell<Vec<Subscriber<T>>>,
    buffer: RefCell<VecDeque<T>>,
    capacity: usize,
    terminal: RefCell<Option<Notification<T>>>,
}

impl<T: Clone + 'static> Inner<T> {
    fn live_observers(&self) -> Vec<Subscriber<T>> {
        let mut observers = self.observers.borrow_mut();
        observers.retain(Subscriber::is_active);
        observers.clone()
    }

    fn push(&self, notification: Notification<T>) {
        if self.terminal.borrow().is_some() {
            return;
        }
        match &notification {
            Notification::Next(value) if self.capacity > 0 => {
                let mut buffer = self.buffer.borrow_mut();
                if buffer.len() == self.capacity {
                    buffer.pop_front();
                }
                buffer.push_back(value.clone());
            }
            Notification::Next(_) => {}
            terminal => *self.terminal.borrow_mut() = Some(terminal.clone()),
        }
        let observers = self.live_observers();
        if notification.is_terminal() {
            self.observers.borrow_mut().clear();
        }
        for observer in observers {
            observer.emit(notification.clone());
        }
    }

    fn attach(&self, subscriber: Subscriber<T>) {
        let replay: Vec<T> = self.buffer.borrow().iter().cloned().collect();
        let terminal = self.terminal.borrow().clone();
        // Registered before replay so a push made from inside the replayed
        // observer still reaches it, queued after the replayed value.
        if terminal.is_none() {
            self.observers.borrow_mut().push(subscriber.clone());
        }
        for value in replay {
            subscriber.next(value);
        }
        if let Some(terminal) = terminal {
            subscriber.emit(terminal);
        }
    }
}

/// Multicast source with optional replay.
pub struct Subject<T> {
    inner: Rc<Inner<T>>,
    stream: Stream<T>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            stream: self.stream.clone(),
        }
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("observers", &self.inner.observers.borrow().len())
            .field("buffered", &self.inner.buffer.borrow().len())
            .field("capacity", &self.inner.capacity)
            .field("terminated", &self.inner.terminal.borrow().is_some())
            .finish()
    }
}

impl<T: Clone + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Subject<T> {
    /// A subject without replay.
    #[must_use]
    pub fn new() -> Self {
        Self::replay(0)
    }

    /// A subject replaying the last `capacity` values to new subscribers.
    #[must_use]
    pub fn replay(capacity: usize) -> Self {
        let inner = Rc::new(Inner {
            observers: RefCell::new(Vec::new()),
            buffer: RefCell::new(VecDeque::with_capacity(capacity)),
            capacity,
            terminal: RefCell::new(None),
        });
        let source = Rc::clone(&inner);
        let stream = Stream::new(move |subscriber| source.attach(subscriber));
        Self { inner, stream }
    }

    /// Push a value to every subscriber.
    pub fn next(&self, value: T) {
        self.inner.push(Notification::Next(value));
    }

    /// Terminate every subscriber with `error`.
    pub fn error(&self, error: StreamError) {
        self.inner.push(Notification::Error(error));
    }

    /// Complete every subscriber.
    pub fn complete(&self) {
        self.inner.push(Notification::Complete);
    }

    /// The stream view. Always the same identity for a given subject.
    #[must_use]
    pub fn as_stream(&self) -> Stream<T> {
        self.stream.clone()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .borrow()
            .iter()
            .filter(|s| s.is_active())
            .count()
    }

    /// Most recent buffered value, if replaying.
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        self.inner.buffer.borrow().back().cloned()
    }

    /// Whether `complete` or `error` has been called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.terminal.borrow().is_some()
    }
}
