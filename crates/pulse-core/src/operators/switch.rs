#![forbid(unsafe_code)]

//! Flattening with cancellation: `switch_all` and `switch_map`.
//!
//! # Invariants
//!
//! 1. At most one inner subscription is live.
//! 2. The previous inner subscription is cancelled before the next inner
//!    stream is subscribed, so their notifications never interleave.
//! 3. The result completes once the outer stream has completed and the
//!    current inner stream (if any) has completed too.
//! 4. An error from either level terminates the result.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::stream::{Notification, Stream, Subscriber, Subscription};

#[derive(Default)]
struct SwitchState {
    inner: RefCell<Option<Subscription>>,
    generation: Cell<u64>,
    inner_active: Cell<bool>,
    outer_done: Cell<bool>,
}

impl SwitchState {
    fn cancel_inner(&self) {
        let previous = self.inner.borrow_mut().take();
        drop(previous);
    }
}

impl<T: 'static> Stream<Stream<T>> {
    /// Subscribe to each inner stream as it arrives, cancelling the previous.
    pub fn switch_all(&self) -> Stream<T> {
        let source = self.clone();
        Stream::new(move |downstream: Subscriber<T>| {
            let state = Rc::new(SwitchState::default());

            let out = downstream.clone();
            let st = Rc::clone(&state);
            let outer = source.subscribe(move |n| match n {
                Notification::Next(inner_stream) => {
                    st.cancel_inner();
                    let generation = st.generation.get() + 1;
                    st.generation.set(generation);
                    st.inner_active.set(true);

                    let inner_out = out.clone();
                    let inner_st = Rc::clone(&st);
                    let subscription = inner_stream.subscribe(move |n| match n {
                        Notification::Next(value) => inner_out.next(value),
                        Notification::Error(error) => inner_out.error(error),
                        Notification::Complete => {
                            if inner_st.generation.get() != generation {
                                return;
                            }
                            inner_st.inner_active.set(false);
                            if inner_st.outer_done.get() {
                                inner_out.complete();
                            }
                        }
                    });
                    if subscription.is_closed() {
                        return;
                    }
                    *st.inner.borrow_mut() = Some(subscription);
                }
                Notification::Error(error) => out.error(error),
                Notification::Complete => {
                    st.outer_done.set(true);
                    if !st.inner_active.get() {
                        out.complete();
                    }
                }
            });

            let teardown_state = Rc::clone(&state);
            downstream.add_teardown(move || teardown_state.cancel_inner());
            downstream.add_subscription(outer);
        })
    }
}

impl<T: 'static> Stream<T> {
    /// Map each value to a stream and follow only the latest one.
    pub fn switch_map<U: 'static>(&self, f: impl Fn(T) -> Stream<U> + 'static) -> Stream<U> {
        self.map(f).switch_all()
    }
}
