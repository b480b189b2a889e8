#![forbid(unsafe_code)]

//! Error types shared by streams and adapters.

use std::error::Error;
use std::fmt;
use std::rc::Rc;

/// An error carried through a [`Stream`](crate::Stream).
///
/// Cloning is cheap and keeps identity: two `StreamError`s compare equal only
/// when they are clones of the same original error. This is what duplicate
/// suppression relies on, so re-raising an identical error object is treated
/// as a repeat while two separately constructed errors with the same message
/// are not.
#[derive(Clone)]
pub struct StreamError(Rc<dyn Error + 'static>);

impl StreamError {
    /// Wrap any error value.
    pub fn new(error: impl Error + 'static) -> Self {
        Self(Rc::new(error))
    }

    /// Build an ad-hoc error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Whether both handles refer to the same underlying error.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Borrow the wrapped error.
    #[must_use]
    pub fn get_ref(&self) -> &(dyn Error + 'static) {
        &*self.0
    }

    /// Attempt to view the wrapped error as a concrete type.
    #[must_use]
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

impl PartialEq for StreamError {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for StreamError {}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamError").field(&self.0.to_string()).finish()
    }
}

impl Error for StreamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for Message {}

/// Raised at the dynamic boundary when a value cannot be treated as a
/// potential observable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdaptError {
    /// The value is neither a stream, a deferred value, nor the expected
    /// plain value type.
    NotAdaptable {
        /// Type name of the rejected argument.
        type_name: &'static str,
    },
}

impl fmt::Display for AdaptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAdaptable { type_name } => {
                write!(f, "argument not adaptable: {type_name}")
            }
        }
    }
}

impl Error for AdaptError {}
