//! Sources to feed a bridge with.
//!
//! Any [`Stream`] is a source. This module adds the two kinds of *hot*
//! source, whose values exist independently of who is listening:
//!
//! - [`ConflatingSource`]: keeps only the latest value and hands it to every
//!   new subscriber straight away.
//! - [`ReplayingSource`]: keeps a bounded history and replays it to every new
//!   subscriber before going live.

use core::convert::Infallible;
use core::pin::Pin;
use core::task::{Context, Poll};

use futures_core::Stream;
use pin_project::pin_project;

mod conflate;
mod replay;

pub use conflate::{Conflated, ConflatingSource};
pub use replay::{Replayed, ReplayingSource};

/// Adapts an infallible source to the fallible shape the bridge forwards.
///
/// This `struct` is created by [`MergeSource::new`][crate::MergeSource::new].
#[pin_project]
#[derive(Debug, Clone)]
pub struct NeverFails<S> {
    #[pin]
    stream: S,
}

impl<S> NeverFails<S> {
    pub(crate) fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S: Stream> Stream for NeverFails<S> {
    type Item = Result<S::Item, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().stream.poll_next(cx).map(|item| item.map(Ok))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.stream.size_hint()
    }
}
