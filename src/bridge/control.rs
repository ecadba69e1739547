use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::Arc;

use super::channel::{BridgeState, CloseReason, Offer, Shared};
use super::error::{AlreadyClosed, PushError, SendError};

/// The externally held capabilities of a running bridge: push an element,
/// or close the output channel.
///
/// A handle is only live between activation (the consumer's first poll, once
/// the initial burst is enqueued) and closure. Before activation `push` and
/// `close` succeed without doing anything. After closure both report
/// [`AlreadyClosed`]; an element pushed after closure is dropped and handed
/// back inside the error.
///
/// Handles are cheap to clone and can be moved to other threads.
///
/// # Examples
///
/// ```
/// use merge_bridge::{MergeSource, PushError};
/// use futures_lite::future::block_on;
/// use futures_lite::stream::{self, StreamExt};
///
/// block_on(async {
///     let (mut stream, handle) = MergeSource::new(vec![stream::pending::<u32>()])
///         .burst([1, 2])
///         .start();
///
///     assert_eq!(stream.next().await, Some(1));
///     handle.push(6).unwrap();
///     handle.close().unwrap();
///     assert_eq!(handle.push(7), Err(PushError::AlreadyClosed(7)));
///
///     let rest: Vec<_> = stream.collect().await;
///     assert_eq!(rest, vec![2, 6]);
/// })
/// ```
pub struct ControlHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> ControlHandle<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Push one element into the output channel without waiting.
    ///
    /// Fails with [`PushError::WouldBlock`] if the channel is bounded and
    /// full, and with [`PushError::AlreadyClosed`] once the bridge has
    /// closed.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        match self.shared.state() {
            BridgeState::Created | BridgeState::Activating => {
                tracing::trace!("push before activation ignored");
                Ok(())
            }
            BridgeState::Live => match self.shared.offer(item) {
                Offer::Accepted => Ok(()),
                Offer::Full(item) => Err(PushError::WouldBlock(item)),
                Offer::Closed(item) => Err(PushError::AlreadyClosed(item)),
            },
            BridgeState::Closing | BridgeState::Closed => Err(PushError::AlreadyClosed(item)),
        }
    }

    /// Send one element, waiting for room if the channel is bounded and full.
    ///
    /// Resolves to an error carrying the element if the bridge closes before
    /// the element could be enqueued.
    pub fn send(&self, item: T) -> SendFuture<'_, T> {
        SendFuture {
            shared: &self.shared,
            item: Some(item),
            key: None,
        }
    }

    /// Close the output channel.
    ///
    /// Elements already enqueued are still delivered to the consumer, then
    /// the stream ends. Nothing is pulled from the sources after this. A
    /// second call returns `Err(AlreadyClosed)`.
    pub fn close(&self) -> Result<(), AlreadyClosed> {
        match self.shared.state() {
            BridgeState::Created | BridgeState::Activating => {
                tracing::trace!("close before activation ignored");
                Ok(())
            }
            BridgeState::Live if self.shared.close(CloseReason::Requested) => Ok(()),
            _ => Err(AlreadyClosed),
        }
    }

    /// The current lifecycle state of the bridge.
    pub fn state(&self) -> BridgeState {
        self.shared.state()
    }

    /// Returns `true` once the channel no longer accepts elements.
    pub fn is_closed(&self) -> bool {
        self.shared.state().is_closed()
    }
}

impl<T> Clone for ControlHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for ControlHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlHandle")
            .field("state", &self.shared.state())
            .finish()
    }
}

/// Future for [`ControlHandle::send`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct SendFuture<'a, T> {
    shared: &'a Shared<T>,
    item: Option<T>,
    key: Option<usize>,
}

// The element is only ever moved out by value, never pinned.
impl<T> Unpin for SendFuture<'_, T> {}

impl<T> Future for SendFuture<'_, T> {
    type Output = Result<(), SendError<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let Some(item) = this.item.take() else {
            panic!("Futures must not be polled after completing");
        };

        match this.shared.state() {
            BridgeState::Created | BridgeState::Activating => {
                tracing::trace!("send before activation ignored");
                Poll::Ready(Ok(()))
            }
            BridgeState::Live => match this.shared.offer_or_park(item, &mut this.key, cx.waker()) {
                Offer::Accepted => Poll::Ready(Ok(())),
                Offer::Closed(item) => Poll::Ready(Err(SendError(item))),
                Offer::Full(item) => {
                    this.item = Some(item);
                    Poll::Pending
                }
            },
            BridgeState::Closing | BridgeState::Closed => Poll::Ready(Err(SendError(item))),
        }
    }
}

impl<T> Drop for SendFuture<'_, T> {
    fn drop(&mut self) {
        self.shared.unpark(&mut self.key);
    }
}

impl<T> fmt::Debug for SendFuture<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendFuture")
            .field("pending", &self.item.is_some())
            .finish()
    }
}
