use core::fmt;
use std::error::Error as StdError;

use thiserror::Error;

/// A control operation was invoked after the bridge closed.
///
/// This is never fatal: the operation had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the bridge is already closed")]
pub struct AlreadyClosed;

/// The reason [`ControlHandle::push`][crate::ControlHandle::push] did not
/// deliver an element. The element is handed back in either case.
#[derive(Clone, PartialEq, Eq, Error)]
pub enum PushError<T> {
    /// The bridge closed; the element was dropped.
    #[error("the bridge is already closed")]
    AlreadyClosed(T),
    /// The bridge has a bounded channel and it is full.
    #[error("the bridge's channel is full")]
    WouldBlock(T),
}

impl<T> PushError<T> {
    /// Returns the element that could not be pushed.
    pub fn into_inner(self) -> T {
        match self {
            Self::AlreadyClosed(item) | Self::WouldBlock(item) => item,
        }
    }

    /// Returns `true` if the push failed because the bridge closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::AlreadyClosed(_))
    }

    /// Returns `true` if the push failed because the channel is full.
    pub fn is_full(&self) -> bool {
        matches!(self, Self::WouldBlock(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyClosed(_) => f.write_str("AlreadyClosed(..)"),
            Self::WouldBlock(_) => f.write_str("WouldBlock(..)"),
        }
    }
}

/// [`ControlHandle::send`][crate::ControlHandle::send] found the bridge
/// closed. Carries the element that was not sent.
#[derive(Clone, PartialEq, Eq, Error)]
#[error("the bridge is already closed")]
pub struct SendError<T>(pub T);

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendError(..)")
    }
}

/// Identifies one of the sources of a bridge by its position in the list the
/// bridge was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub(crate) usize);

impl SourceId {
    /// The position of the source.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source #{}", self.0)
    }
}

/// A single source failed.
///
/// The failing source is retired; every other source keeps forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError<E> {
    pub(crate) source_id: SourceId,
    pub(crate) error: E,
}

impl<E> SourceError<E> {
    pub(crate) fn new(source_id: SourceId, error: E) -> Self {
        Self { source_id, error }
    }

    /// The source that failed.
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// The error the source produced.
    pub fn error(&self) -> &E {
        &self.error
    }

    /// Consumes `self`, returning the error the source produced.
    pub fn into_error(self) -> E {
        self.error
    }
}

impl<E: fmt::Display> fmt::Display for SourceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.source_id, self.error)
    }
}

impl<E: StdError + 'static> StdError for SourceError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}
