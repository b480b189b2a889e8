#![forbid(unsafe_code)]

//! Leading/trailing rate limiting driven by a window-closing signal.
//!
//! [`coalesce`] collapses bursts of values into at most one leading and one
//! trailing emission per *window*. A window opens on the first value that
//! arrives while none is open; its length is decided by the duration selector,
//! which returns a stream whose first emission (or completion) closes it.
//!
//! ```text
//! source:   a  b  c ------- d -----
//! window:   [=======)       [====)
//! leading:  a               d
//! trailing:         c            d
//! ```
//!
//! # Invariants
//!
//! 1. While a window is open, incoming values only replace the pending value.
//! 2. With `leading`, the value that opened the window is emitted
//!    immediately.
//! 3. With `trailing`, the latest value is emitted when the window closes.
//!    With both edges enabled, a window holding a single value emits it twice.
//! 4. Source completion does not flush an open window; the window is
//!    cancelled and completion is forwarded.
//! 5. Unsubscribing cancels both the source and the open window.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Selector returns `Err` | Error forwarded, result terminates |
//! | Window stream errors | Error forwarded, result terminates |
//! | Source errors | Window cancelled, error forwarded |

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::StreamError;
use crate::scheduler::SharedScheduler;
use crate::sources;
use crate::stream::{Notification, Stream, Subscriber, Subscription};

/// Which edges of a window emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CoalesceConfig {
    /// Emit the value that opens a window.
    pub leading: bool,
    /// Emit the latest value when a window closes.
    pub trailing: bool,
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        Self {
            leading: false,
            trailing: true,
        }
    }
}

impl CoalesceConfig {
    /// Only the first value of each window.
    #[must_use]
    pub const fn leading() -> Self {
        Self {
            leading: true,
            trailing: false,
        }
    }

    /// Only the last value of each window.
    #[must_use]
    pub const fn trailing() -> Self {
        Self {
            leading: false,
            trailing: true,
        }
    }
}

struct Window<T> {
    last: Option<T>,
    open: bool,
    id: u64,
    subscription: Option<Subscription>,
}

impl<T> Default for Window<T> {
    fn default() -> Self {
        Self {
            last: None,
            open: false,
            id: 0,
            subscription: None,
        }
    }
}

impl<T: Clone> Window<T> {
    /// Close window `id`, returning the trailing value to emit (if any) and
    /// the window subscription to drop once the borrow is released.
    fn close(&mut self, id: u64, trailing: bool) -> Option<(Option<T>, Option<Subscription>)> {
        if !self.open || self.id != id {
            return None;
        }
        self.open = false;
        let subscription = self.subscription.take();
        let value = if trailing { self.last.clone() } else { None };
        Some((value, subscription))
    }

    fn cancel(&mut self) -> Option<Subscription> {
        self.open = false;
        self.subscription.take()
    }
}

/// Build a coalescing operator.
///
/// `duration_selector` receives the value that opens a window and returns the
/// window signal. Returning `Err` fails the stream. Use with
/// [`Stream::pipe`].
pub fn coalesce<T, W, F>(
    duration_selector: F,
    config: CoalesceConfig,
) -> impl FnOnce(Stream<T>) -> Stream<T>
where
    T: Clone + 'static,
    W: 'static,
    F: Fn(&T) -> Result<Stream<W>, StreamError> + 'static,
{
    let selector = Rc::new(duration_selector);
    move |source: Stream<T>| {
        Stream::new(move |downstream: Subscriber<T>| {
            let window: Rc<RefCell<Window<T>>> = Rc::new(RefCell::new(Window::default()));

            let out = downstream.clone();
            let state = Rc::clone(&window);
            let selector = Rc::clone(&selector);
            let upstream = source.subscribe(move |n| match n {
                Notification::Next(value) => {
                    on_value(&state, &out, &*selector, config, value);
                }
                Notification::Error(error) => {
                    let cancelled = state.borrow_mut().cancel();
                    drop(cancelled);
                    out.error(error);
                }
                Notification::Complete => {
                    let cancelled = state.borrow_mut().cancel();
                    drop(cancelled);
                    out.complete();
                }
            });

            let teardown_state = Rc::clone(&window);
            downstream.add_teardown(move || {
                let cancelled = teardown_state.borrow_mut().cancel();
                drop(cancelled);
            });
            downstream.add_subscription(upstream);
        })
    }
}

fn on_value<T, W>(
    state: &Rc<RefCell<Window<T>>>,
    out: &Subscriber<T>,
    selector: &dyn Fn(&T) -> Result<Stream<W>, StreamError>,
    config: CoalesceConfig,
    value: T,
) where
    T: Clone + 'static,
    W: 'static,
{
    let id = {
        let mut window = state.borrow_mut();
        window.last = Some(value.clone());
        if window.open {
            return;
        }
        window.open = true;
        window.id += 1;
        window.id
    };

    let signal = match selector(&value) {
        Ok(signal) => signal,
        Err(error) => {
            state.borrow_mut().open = false;
            out.error(error);
            return;
        }
    };
    tracing::trace!(target: "pulse::coalesce", window = id, "window opened");

    if config.leading {
        out.next(value);
        if !out.is_active() {
            return;
        }
    }

    let close_state = Rc::clone(state);
    let close_out = out.clone();
    let trailing = config.trailing;
    let subscription = signal.subscribe(move |n| match n {
        Notification::Next(_) | Notification::Complete => {
            let closed = close_state.borrow_mut().close(id, trailing);
            let Some((value, window_subscription)) = closed else {
                return;
            };
            drop(window_subscription);
            tracing::trace!(target: "pulse::coalesce", window = id, flushed = value.is_some(), "window closed");
            if let Some(value) = value {
                close_out.next(value);
            }
        }
        Notification::Error(error) => close_out.error(error),
    });

    let mut window = state.borrow_mut();
    if window.open && window.id == id {
        window.subscription = Some(subscription);
    } else {
        drop(window);
        drop(subscription);
    }
}

/// [`coalesce`] with a one-microtask window on `scheduler`.
///
/// Values pushed within the same task collapse into one emission.
pub fn coalesce_with<T: Clone + 'static>(
    scheduler: SharedScheduler,
    config: CoalesceConfig,
) -> impl FnOnce(Stream<T>) -> Stream<T> {
    coalesce(
        move |_: &T| Ok(sources::microtask(&scheduler)),
        config,
    )
}
