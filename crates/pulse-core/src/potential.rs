#![forbid(unsafe_code)]

//! Potential observables and their normalization into streams.
//!
//! A [`PotentialObservable<T>`] is whatever a caller may bind to a view: a
//! [`Stream`], a [`Deferred`] value, or a plain value. [`normalize`] turns any
//! of them into a `Stream<T>`:
//!
//! | Input | Output |
//! |-------|--------|
//! | `Stream(s)` | `s` itself (same identity) |
//! | `Deferred(d)` | one value (or the rejection) on a later microtask |
//! | `Value(v)` | `v` synchronously, then complete |
//!
//! Nullish inputs are plain values: pick `T = Option<U>` and pass `None`.
//!
//! Normalization is total. The only failure lives at the dynamic boundary,
//! [`PotentialObservable::adapt`], which rejects values of unrelated types.

use std::any::{Any, type_name};
use std::fmt;

use crate::deferred::Deferred;
use crate::error::AdaptError;
use crate::stream::Stream;

/// A stream, a deferred single value, or a plain value.
pub enum PotentialObservable<T> {
    /// A push stream, used as is.
    Stream(Stream<T>),
    /// A value available later.
    Deferred(Deferred<T>),
    /// A value available now.
    Value(T),
}

impl<T: Clone> Clone for PotentialObservable<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Stream(s) => Self::Stream(s.clone()),
            Self::Deferred(d) => Self::Deferred(d.clone()),
            Self::Value(v) => Self::Value(v.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PotentialObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(s) => f.debug_tuple("Stream").field(s).finish(),
            Self::Deferred(d) => f.debug_tuple("Deferred").field(d).finish(),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

impl<T> From<Stream<T>> for PotentialObservable<T> {
    fn from(stream: Stream<T>) -> Self {
        Self::Stream(stream)
    }
}

impl<T> From<Deferred<T>> for PotentialObservable<T> {
    fn from(deferred: Deferred<T>) -> Self {
        Self::Deferred(deferred)
    }
}

impl<T> PotentialObservable<T> {
    /// Wrap a plain value.
    pub fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// Short variant name, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stream(_) => "stream",
            Self::Deferred(_) => "deferred",
            Self::Value(_) => "value",
        }
    }
}

impl<T: PartialEq> PotentialObservable<T> {
    /// Whether `other` is the same selection.
    ///
    /// Streams and deferred values compare by identity, plain values by
    /// equality.
    #[must_use]
    pub fn same_selection(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Stream(a), Self::Stream(b)) => a.ptr_eq(b),
            (Self::Deferred(a), Self::Deferred(b)) => a.ptr_eq(b),
            (Self::Value(a), Self::Value(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: Clone + 'static> PotentialObservable<T> {
    /// Normalize into a stream. See [`normalize`].
    #[must_use]
    pub fn to_stream(&self) -> Stream<T> {
        match self {
            Self::Stream(stream) => stream.clone(),
            Self::Deferred(deferred) => deferred.to_stream(),
            Self::Value(value) => Stream::of(value.clone()),
        }
    }

    /// Accept an arbitrary value at a dynamic boundary.
    ///
    /// `value` may be a `PotentialObservable<T>`, a `Stream<T>`, a
    /// `Deferred<T>`, or a `T`.
    ///
    /// # Errors
    ///
    /// [`AdaptError::NotAdaptable`] for any other type.
    pub fn adapt<V: Any>(value: V) -> Result<Self, AdaptError> {
        let any: Box<dyn Any> = Box::new(value);
        let any = match any.downcast::<Self>() {
            Ok(potential) => return Ok(*potential),
            Err(any) => any,
        };
        let any = match any.downcast::<Stream<T>>() {
            Ok(stream) => return Ok(Self::Stream(*stream)),
            Err(any) => any,
        };
        let any = match any.downcast::<Deferred<T>>() {
            Ok(deferred) => return Ok(Self::Deferred(*deferred)),
            Err(any) => any,
        };
        match any.downcast::<T>() {
            Ok(value) => Ok(Self::Value(*value)),
            Err(_) => Err(AdaptError::NotAdaptable {
                type_name: type_name::<V>(),
            }),
        }
    }
}

/// Normalize a potential observable into a stream.
///
/// Streams pass through untouched, deferred values become a single
/// asynchronous emission, and plain values a single synchronous one.
pub fn normalize<T: Clone + 'static>(potential: &PotentialObservable<T>) -> Stream<T> {
    potential.to_stream()
}
