#![forbid(unsafe_code)]

//! Render events and the handler table they are dispatched into.
//!
//! Every notification a selection produces is wrapped in a [`RenderEvent`]
//! carrying two flags:
//!
//! - `reset`: this is the first event of a new selection; the view should
//!   discard whatever the previous selection rendered.
//! - `synchronous`: the event was produced while the selection was being
//!   subscribed, so the caller is already inside its own update pass and does
//!   not need to request a flush.
//!
//! `Suspense` is only ever produced with both flags set.

use std::fmt;
use std::rc::Rc;

use pulse_core::StreamError;

/// The four render-event variants, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderEventKind {
    Suspense,
    Next,
    Error,
    Complete,
}

impl RenderEventKind {
    /// Lowercase name, for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Suspense => "suspense",
            Self::Next => "next",
            Self::Error => "error",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for RenderEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed notification for the view layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent<T> {
    /// The selection has not produced anything yet.
    Suspense { reset: bool, synchronous: bool },
    /// The selection produced a value.
    Next {
        value: T,
        reset: bool,
        synchronous: bool,
    },
    /// The selection failed.
    Error {
        error: StreamError,
        reset: bool,
        synchronous: bool,
    },
    /// The selection finished.
    Complete { reset: bool, synchronous: bool },
}

impl<T> RenderEvent<T> {
    /// The suspense event: always `reset` and `synchronous`.
    #[must_use]
    pub const fn suspense() -> Self {
        Self::Suspense {
            reset: true,
            synchronous: true,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> RenderEventKind {
        match self {
            Self::Suspense { .. } => RenderEventKind::Suspense,
            Self::Next { .. } => RenderEventKind::Next,
            Self::Error { .. } => RenderEventKind::Error,
            Self::Complete { .. } => RenderEventKind::Complete,
        }
    }

    #[must_use]
    pub const fn reset(&self) -> bool {
        match self {
            Self::Suspense { reset, .. }
            | Self::Next { reset, .. }
            | Self::Error { reset, .. }
            | Self::Complete { reset, .. } => *reset,
        }
    }

    #[must_use]
    pub const fn synchronous(&self) -> bool {
        match self {
            Self::Suspense { synchronous, .. }
            | Self::Next { synchronous, .. }
            | Self::Error { synchronous, .. }
            | Self::Complete { synchronous, .. } => *synchronous,
        }
    }

    /// The value of a `Next` event.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Next { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The error of an `Error` event.
    #[must_use]
    pub const fn error(&self) -> Option<&StreamError> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl<T: PartialEq> RenderEvent<T> {
    /// Whether `other` would render the same as `self`.
    ///
    /// Kind and `reset` must match, and so must the value (by equality) or the
    /// error (by identity). `synchronous` is ignored.
    #[must_use]
    pub fn is_duplicate_of(&self, other: &Self) -> bool {
        if self.kind() != other.kind() || self.reset() != other.reset() {
            return false;
        }
        match (self, other) {
            (Self::Next { value: a, .. }, Self::Next { value: b, .. }) => a == b,
            (Self::Error { error: a, .. }, Self::Error { error: b, .. }) => a.ptr_eq(b),
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

type Handler<T> = Rc<dyn Fn(&RenderEvent<T>)>;

/// Optional callbacks, one per render-event variant.
///
/// A missing handler makes its variant a no-op.
///
/// ```
/// use pulse_runtime::RenderEventHandlers;
///
/// let handlers = RenderEventHandlers::<u32>::new()
///     .on_next(|event| println!("render {:?}", event.value()))
///     .on_error(|event| eprintln!("failed: {:?}", event.error()));
/// assert!(handlers.handles(pulse_runtime::RenderEventKind::Next));
/// assert!(!handlers.handles(pulse_runtime::RenderEventKind::Suspense));
/// ```
pub struct RenderEventHandlers<T> {
    suspense: Option<Handler<T>>,
    next: Option<Handler<T>>,
    error: Option<Handler<T>>,
    complete: Option<Handler<T>>,
}

impl<T> Default for RenderEventHandlers<T> {
    fn default() -> Self {
        Self {
            suspense: None,
            next: None,
            error: None,
            complete: None,
        }
    }
}

impl<T> Clone for RenderEventHandlers<T> {
    fn clone(&self) -> Self {
        Self {
            suspense: self.suspense.clone(),
            next: self.next.clone(),
            error: self.error.clone(),
            complete: self.complete.clone(),
        }
    }
}

impl<T> fmt::Debug for RenderEventHandlers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEventHandlers")
            .field("suspense", &self.suspense.is_some())
            .field("next", &self.next.is_some())
            .field("error", &self.error.is_some())
            .field("complete", &self.complete.is_some())
            .finish()
    }
}

impl<T> RenderEventHandlers<T> {
    /// No handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_suspense(mut self, handler: impl Fn(&RenderEvent<T>) + 'static) -> Self {
        self.suspense = Some(Rc::new(handler));
        self
    }

    #[must_use]
    pub fn on_next(mut self, handler: impl Fn(&RenderEvent<T>) + 'static) -> Self {
        self.next = Some(Rc::new(handler));
        self
    }

    #[must_use]
    pub fn on_error(mut self, handler: impl Fn(&RenderEvent<T>) + 'static) -> Self {
        self.error = Some(Rc::new(handler));
        self
    }

    #[must_use]
    pub fn on_complete(mut self, handler: impl Fn(&RenderEvent<T>) + 'static) -> Self {
        self.complete = Some(Rc::new(handler));
        self
    }

    /// Whether a handler is registered for `kind`.
    #[must_use]
    pub fn handles(&self, kind: RenderEventKind) -> bool {
        self.slot(kind).is_some()
    }

    fn slot(&self, kind: RenderEventKind) -> Option<&Handler<T>> {
        match kind {
            RenderEventKind::Suspense => self.suspense.as_ref(),
            RenderEventKind::Next => self.next.as_ref(),
            RenderEventKind::Error => self.error.as_ref(),
            RenderEventKind::Complete => self.complete.as_ref(),
        }
    }

    /// Invoke the handler for `event`'s variant, if any.
    pub fn dispatch(&self, event: &RenderEvent<T>) {
        if let Some(handler) = self.slot(event.kind()) {
            handler(event);
        }
    }
}
