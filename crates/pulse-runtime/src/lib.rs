#![forbid(unsafe_code)]

//! Render-event pipeline and flush scheduling for Pulse.
//!
//! - [`RenderEventManager`]: accepts a changing selection (stream, deferred
//!   value, or plain value), keeps exactly one of them subscribed, and
//!   dispatches typed [`RenderEvent`]s to [`RenderEventHandlers`].
//! - [`TickScheduler`]: collapses "please flush" requests into one
//!   [`RenderCallback`] call per frame.
//! - [`RuntimeConfig`]: host capabilities and coalescing defaults.
//!
//! # Usage
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use pulse_core::{Subject, VirtualScheduler};
//! use pulse_runtime::{
//!     HostCapabilities, RenderEventHandlers, RenderEventManager, TickScheduler, tick_scheduler_for,
//! };
//!
//! let frames = VirtualScheduler::new();
//! let flushes = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&flushes);
//! let tick = tick_scheduler_for(
//!     HostCapabilities::default(),
//!     frames.shared(),
//!     Rc::new(move || counter.set(counter.get() + 1)),
//! );
//!
//! let manager = RenderEventManager::new(RenderEventHandlers::<u32>::new().on_next(
//!     move |event| {
//!         if !event.synchronous() {
//!             tick.schedule();
//!         }
//!     },
//! ));
//! let _active = manager.handle_potential_observable_changes().subscribe(|_| {});
//!
//! let source = Subject::<u32>::new();
//! manager.next_potential_observable(source.as_stream());
//! source.next(1);
//! source.next(2);
//! frames.run_frame();
//! assert_eq!(flushes.get(), 1);
//! ```
//!
//! # Logging
//!
//! `tracing` events under the targets `pulse::manager`, `pulse::tick`,
//! `pulse::coalesce` and `pulse::config`. No subscriber is installed.

pub mod config;
pub mod manager;
pub mod render_event;
pub mod tick;

pub use config::{ConfigError, EXTERNAL_SCHEDULING_ENV, HostCapabilities, RuntimeConfig};
pub use manager::{
    ManagerStats, RenderEventManager, SelectionPhase, create_render_event_manager,
    to_render_event_stream,
};
pub use render_event::{RenderEvent, RenderEventHandlers, RenderEventKind};
pub use tick::{
    AnimationFrameTickScheduler, NoopTickScheduler, RenderCallback, TickScheduler,
    tick_scheduler_for,
};
