use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::{Arc, Mutex};

use futures_core::Stream;

use crate::bridge::AlreadyClosed;
use crate::utils::WakerSet;

struct State<T> {
    value: Option<T>,
    version: u64,
    closed: bool,
    wakers: WakerSet,
}

/// Closes the source once the last publishing handle is gone.
struct Publisher<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Publisher<T> {
    fn close(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return false;
        }
        state.closed = true;
        state.wakers.wake_all();
        true
    }
}

impl<T> Drop for Publisher<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A hot source that only remembers its most recent value.
///
/// A new subscriber receives the current value immediately, if there is one.
/// A subscriber that falls behind skips straight to the latest value.
///
/// Cloning the source gives another publishing handle. Once every handle is
/// dropped, or [`close`](ConflatingSource::close) is called, subscribers end
/// after receiving the final value.
///
/// # Examples
///
/// ```
/// use merge_bridge::ConflatingSource;
/// use futures_lite::future::block_on;
/// use futures_lite::stream::StreamExt;
///
/// block_on(async {
///     let source = ConflatingSource::new();
///     source.publish(1).unwrap();
///     source.publish(2).unwrap();
///
///     let mut sub = source.subscribe();
///     assert_eq!(sub.next().await, Some(2));
///
///     source.publish(3).unwrap();
///     source.close();
///     assert_eq!(sub.next().await, Some(3));
///     assert_eq!(sub.next().await, None);
/// })
/// ```
pub struct ConflatingSource<T> {
    publisher: Arc<Publisher<T>>,
}

impl<T> ConflatingSource<T> {
    /// A source without a value yet.
    pub fn new() -> Self {
        Self::from_state(None, 0)
    }

    /// A source that starts out holding `value`.
    pub fn with_value(value: T) -> Self {
        Self::from_state(Some(value), 1)
    }

    fn from_state(value: Option<T>, version: u64) -> Self {
        let state = State {
            value,
            version,
            closed: false,
            wakers: WakerSet::new(),
        };
        Self {
            publisher: Arc::new(Publisher {
                state: Arc::new(Mutex::new(state)),
            }),
        }
    }

    /// Replace the current value and notify every subscriber.
    pub fn publish(&self, value: T) -> Result<(), AlreadyClosed> {
        let mut state = self.publisher.state.lock().unwrap();
        if state.closed {
            return Err(AlreadyClosed);
        }
        state.value = Some(value);
        state.version += 1;
        state.wakers.wake_all();
        Ok(())
    }

    /// Subscribe to the source, starting from its current value.
    pub fn subscribe(&self) -> Conflated<T> {
        Conflated {
            state: Arc::clone(&self.publisher.state),
            seen: 0,
            key: None,
        }
    }

    /// Stop publishing. Returns `false` if the source was already closed.
    pub fn close(&self) -> bool {
        self.publisher.close()
    }

    /// Returns `true` once the source has been closed.
    pub fn is_closed(&self) -> bool {
        self.publisher.state.lock().unwrap().closed
    }
}

impl<T: Clone> ConflatingSource<T> {
    /// The current value, if any.
    pub fn latest(&self) -> Option<T> {
        self.publisher.state.lock().unwrap().value.clone()
    }
}

impl<T> Default for ConflatingSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ConflatingSource<T> {
    fn clone(&self) -> Self {
        Self {
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<T> fmt::Debug for ConflatingSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.publisher.state.lock().unwrap();
        f.debug_struct("ConflatingSource")
            .field("version", &state.version)
            .field("closed", &state.closed)
            .field("subscribers", &state.wakers.len())
            .finish()
    }
}

/// A subscription to a [`ConflatingSource`].
pub struct Conflated<T> {
    state: Arc<Mutex<State<T>>>,
    seen: u64,
    key: Option<usize>,
}

impl<T: Clone> Stream for Conflated<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut state = this.state.lock().unwrap();

        if state.version > this.seen {
            if let Some(value) = state.value.clone() {
                this.seen = state.version;
                return Poll::Ready(Some(value));
            }
        }
        if state.closed {
            state.wakers.remove(&mut this.key);
            return Poll::Ready(None);
        }
        state.wakers.register(&mut this.key, cx.waker());
        Poll::Pending
    }
}

impl<T> Drop for Conflated<T> {
    fn drop(&mut self) {
        if self.key.is_some() {
            self.state.lock().unwrap().wakers.remove(&mut self.key);
        }
    }
}

impl<T> fmt::Debug for Conflated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conflated")
            .field("seen", &self.seen)
            .finish()
    }
}
