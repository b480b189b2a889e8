#![forbid(unsafe_code)]

//! Single-threaded push streams for Pulse.
//!
//! This crate provides the stream layer the render-event pipeline is built on:
//!
//! - [`Stream`]: a cold push stream. Subscribing runs its producer with a
//!   [`Subscriber`], which may emit synchronously or from scheduled work.
//! - [`Subscription`]: RAII guard that cancels on drop.
//! - [`Subject`]: a hot multicast source with optional replay.
//! - [`Scheduler`]: the injected timing capability (microtasks, frames,
//!   timers). [`VirtualScheduler`] is the deterministic host-driven
//!   implementation.
//! - [`Deferred`]: a settle-once value whose continuations always run on a
//!   later microtask.
//! - [`PotentialObservable`]: stream, deferred value, or plain value, plus the
//!   adapter that normalizes all three into a [`Stream`].
//! - Operators: `map`, `filter`, `tap`, `take`, `distinct_until_changed`,
//!   `switch_all`, and [`coalesce`](operators::coalesce).
//!
//! # Architecture
//!
//! Everything is `Rc`/`RefCell` based and `!Send`. There is no executor: time
//! only advances when the host drives the [`Scheduler`].
//!
//! # Invariants
//!
//! 1. A subscriber delivers nothing after a terminal notification.
//! 2. Cancelling a [`Subscription`] is synchronous: no notification reaches
//!    the observer afterwards, even if the producer already scheduled work.
//! 3. Notifications emitted re-entrantly are queued and delivered in order.
//! 4. Teardowns run exactly once.

pub mod deferred;
pub mod error;
pub mod operators;
pub mod potential;
pub mod scheduler;
pub mod sources;
pub mod stream;
pub mod subject;

pub use deferred::{Deferred, Resolver};
pub use error::{AdaptError, StreamError};
pub use operators::coalesce::{CoalesceConfig, coalesce, coalesce_with};
pub use potential::{PotentialObservable, normalize};
pub use scheduler::{Scheduler, SharedScheduler, Task, VirtualScheduler};
pub use stream::{Notification, Stream, Subscriber, Subscription};
pub use subject::Subject;
