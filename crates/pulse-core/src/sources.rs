#![forbid(unsafe_code)]

//! Stream constructors.
//!
//! Synchronous sources (`of`, `empty`, `throw`, collected iterators) emit
//! everything during `subscribe`. Scheduled sources (`microtask`,
//! `animation_frame`, `timer`) emit a single `()` later and are the usual
//! windows for [`coalesce`](crate::operators::coalesce).

use std::rc::Rc;
use std::time::Duration;

use crate::error::StreamError;
use crate::scheduler::SharedScheduler;
use crate::stream::{Stream, Subscriber};

impl<T: Clone + 'static> Stream<T> {
    /// Emit `value` synchronously, then complete.
    ///
    /// Every subscription gets its own copy; resubscribing replays it.
    pub fn of(value: T) -> Self {
        Stream::new(move |subscriber| {
            subscriber.next(value.clone());
            subscriber.complete();
        })
    }
}

impl<T: 'static> Stream<T> {
    /// Complete immediately without emitting.
    pub fn empty() -> Self {
        Stream::new(|subscriber: Subscriber<T>| subscriber.complete())
    }

    /// Never emit and never terminate.
    pub fn never() -> Self {
        Stream::new(|_subscriber: Subscriber<T>| {})
    }

    /// Fail immediately with `error`.
    pub fn throw(error: StreamError) -> Self {
        Stream::new(move |subscriber: Subscriber<T>| subscriber.error(error.clone()))
    }
}

impl<T: Clone + 'static> FromIterator<T> for Stream<T> {
    /// Emit the collected items synchronously, then complete.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: Rc<[T]> = iter.into_iter().collect();
        Stream::new(move |subscriber| {
            for item in items.iter() {
                if !subscriber.is_active() {
                    return;
                }
                subscriber.next(item.clone());
            }
            subscriber.complete();
        })
    }
}

/// Emit `()` on the next microtask, then complete.
pub fn microtask(scheduler: &SharedScheduler) -> Stream<()> {
    let scheduler = Rc::clone(scheduler);
    Stream::new(move |subscriber: Subscriber<()>| {
        scheduler.schedule_microtask(Box::new(move || {
            subscriber.next(());
            subscriber.complete();
        }));
    })
}

/// Emit `()` at the next frame, then complete.
pub fn animation_frame(scheduler: &SharedScheduler) -> Stream<()> {
    let scheduler = Rc::clone(scheduler);
    Stream::new(move |subscriber: Subscriber<()>| {
        scheduler.request_frame(Box::new(move || {
            subscriber.next(());
            subscriber.complete();
        }));
    })
}

/// Emit `()` after `delay`, then complete.
pub fn timer(scheduler: &SharedScheduler, delay: Duration) -> Stream<()> {
    let scheduler = Rc::clone(scheduler);
    Stream::new(move |subscriber: Subscriber<()>| {
        scheduler.schedule_after(
            delay,
            Box::new(move || {
                subscriber.next(());
                subscriber.complete();
            }),
        );
    })
}
