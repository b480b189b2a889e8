#![forbid(unsafe_code)]

//! Pulse: render events from changing streams, deferred values and plain
//! values.
//!
//! This crate re-exports the stream layer ([`core`]) and, with the default
//! `runtime` feature, the render-event manager and tick schedulers
//! ([`runtime`]). Most code only needs the [`prelude`].
//!
//! ```
//! use pulse::prelude::*;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let frames = VirtualScheduler::new();
//! let rendered = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&rendered);
//! let manager = RenderEventManager::new(
//!     RenderEventHandlers::<&str>::new()
//!         .on_suspense(|_| {})
//!         .on_next(move |event| sink.borrow_mut().extend(event.value().copied())),
//! );
//! let _active = manager.handle_potential_observable_changes().subscribe(|_| {});
//!
//! manager.next_potential_observable(Deferred::resolved(frames.shared(), "ready"));
//! assert!(rendered.borrow().is_empty());
//! frames.run_microtasks();
//! assert_eq!(*rendered.borrow(), vec!["ready"]);
//! ```

pub use pulse_core as core;
#[cfg(feature = "runtime")]
pub use pulse_runtime as runtime;

pub use pulse_core::{
    AdaptError, CoalesceConfig, Deferred, Notification, PotentialObservable, Resolver, Scheduler,
    SharedScheduler, Stream, StreamError, Subject, Subscriber, Subscription, VirtualScheduler,
    coalesce, coalesce_with, normalize,
};

#[cfg(feature = "runtime")]
pub use pulse_runtime::{
    AnimationFrameTickScheduler, ConfigError, HostCapabilities, ManagerStats, NoopTickScheduler,
    RenderCallback, RenderEvent, RenderEventHandlers, RenderEventKind, RenderEventManager,
    RuntimeConfig, SelectionPhase, TickScheduler, create_render_event_manager, tick_scheduler_for,
    to_render_event_stream,
};

/// The types most programs use.
pub mod prelude {
    pub use pulse_core::sources::{animation_frame, microtask, timer};
    pub use pulse_core::{
        CoalesceConfig, Deferred, Notification, PotentialObservable, Scheduler, Stream,
        StreamError, Subject, Subscription, VirtualScheduler, coalesce, coalesce_with,
    };

    #[cfg(feature = "runtime")]
    pub use pulse_runtime::{
        HostCapabilities, RenderEvent, RenderEventHandlers, RenderEventManager, RuntimeConfig,
        TickScheduler, tick_scheduler_for,
    };
}
