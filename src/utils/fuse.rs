use core::pin::Pin;
use core::task::{Context, Poll};

use futures_core::{Stream, TryStream};
use pin_project::pin_project;

/// A source that stops for good after it ends or after its first error.
#[pin_project]
#[derive(Debug)]
pub(crate) struct Fuse<S> {
    #[pin]
    stream: S,
    done: bool,
}

impl<S> Fuse<S> {
    pub(crate) fn new(stream: S) -> Self {
        Self {
            stream,
            done: false,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }
}

impl<S: TryStream> Stream for Fuse<S> {
    type Item = Result<S::Ok, S::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        let next = futures_core::ready!(this.stream.try_poll_next(cx));
        if !matches!(next, Some(Ok(_))) {
            *this.done = true;
        }
        Poll::Ready(next)
    }
}
