use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_core::Stream;

use crate::bridge::AlreadyClosed;
use crate::utils::WakerSet;

struct State<T> {
    history: VecDeque<T>,
    limit: usize,
    /// Sequence number the next published value will get.
    next_seq: u64,
    closed: bool,
    wakers: WakerSet,
}

impl<T> State<T> {
    /// Sequence number of the oldest value still held.
    fn first_seq(&self) -> u64 {
        self.next_seq - self.history.len() as u64
    }
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

/// A hot source that keeps a bounded history of its values.
///
/// A new subscriber first receives the retained history, oldest first, then
/// every value published after it subscribed. The history limit also bounds
/// how far a subscriber may fall behind: one that lags further skips ahead to
/// the oldest value still retained.
///
/// Cloning the source gives another publishing handle. Once every handle is
/// dropped, or [`close`](ReplayingSource::close) is called, subscribers end
/// after draining what they have not seen yet.
///
/// # Examples
///
/// ```
/// use merge_bridge::ReplayingSource;
/// use futures_lite::future::block_on;
/// use futures_lite::stream::StreamExt;
///
/// block_on(async {
///     let source = ReplayingSource::with_history(2);
///     for n in 1..=3 {
///         source.publish(n).unwrap();
///     }
///     let sub = source.subscribe();
///     source.close();
///
///     let seen: Vec<_> = sub.collect().await;
///     assert_eq!(seen, vec![2, 3]);
/// })
/// ```
pub struct ReplayingSource<T> {
    publisher: Arc<Publisher<T>>,
}

impl<T> ReplayingSource<T> {
    /// A source that retains up to `limit` values. A limit of zero is
    /// treated as one.
    pub fn with_history(limit: usize) -> Self {
        let limit = limit.max(1);
        let state = State {
            history: VecDeque::with_capacity(limit),
            limit,
            next_seq: 0,
            closed: false,
            wakers: WakerSet::new(),
        };
        Self {
            publisher: Arc::new(Publisher {
                state: Arc::new(Mutex::new(state)),
            }),
        }
    }

    /// Append a value, evicting the oldest one if the history is full.
    pub fn publish(&self, value: T) -> Result<(), AlreadyClosed> {
        let mut state = self.publisher.state.lock().unwrap();
        if state.closed {
            return Err(AlreadyClosed);
        }
        if state.history.len() == state.limit {
            state.history.pop_front();
        }
        state.history.push_back(value);
        state.next_seq += 1;
        state.wakers.wake_all();
        Ok(())
    }

    /// Subscribe to the source, starting from the oldest retained value.
    pub fn subscribe(&self) -> Replayed<T> {
        let cursor = self.publisher.state.lock().unwrap().first_seq();
        Replayed {
            state: Arc::clone(&self.publisher.state),
            cursor,
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

    /// How many values are currently retained.
    pub fn len(&self) -> usize {
        self.publisher.state.lock().unwrap().history.len()
    }

    /// Returns `true` if nothing has been retained yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> ReplayingSource<T> {
    /// A copy of the retained history, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        let state = self.publisher.state.lock().unwrap();
        state.history.iter().cloned().collect()
    }
}

impl<T> Clone for ReplayingSource<T> {
    fn clone(&self) -> Self {
        Self {
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<T> fmt::Debug for ReplayingSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.publisher.state.lock().unwrap();
        f.debug_struct("ReplayingSource")
            .field("retained", &state.history.len())
            .field("limit", &state.limit)
            .field("closed", &state.closed)
            .finish()
    }
}

/// A subscription to a [`ReplayingSource`].
pub struct Replayed<T> {
    state: Arc<Mutex<State<T>>>,
    /// Sequence number of the next value to hand out.
    cursor: u64,
    key: Option<usize>,
}

impl<T: Clone> Stream for Replayed<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut state = this.state.lock().unwrap();

        let first = state.first_seq();
        if this.cursor < first {
            tracing::trace!(skipped = first - this.cursor, "replay subscriber lagged");
            this.cursor = first;
        }
        if this.cursor < state.next_seq {
            let value = state.history[(this.cursor - first) as usize].clone();
            this.cursor += 1;
            return Poll::Ready(Some(value));
        }
        if state.closed {
            state.wakers.remove(&mut this.key);
            return Poll::Ready(None);
        }
        state.wakers.register(&mut this.key, cx.waker());
        Poll::Pending
    }
}

impl<T> Drop for Replayed<T> {
    fn drop(&mut self) {
        if self.key.is_some() {
            self.state.lock().unwrap().wakers.remove(&mut self.key);
        }
    }
}

impl<T> fmt::Debug for Replayed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replayed")
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::{block_on, poll_once};
    use futures_lite::stream::StreamExt;

    #[test]
    fn replays_history_then_goes_live() {
        block_on(async {
            let source = ReplayingSource::with_history(3);
            source.publish(1).unwrap();
            source.publish(2).unwrap();

            let mut sub = source.subscribe();
            assert_eq!(sub.next().await, Some(1));
            assert_eq!(sub.next().await, Some(2));
            assert_eq!(poll_once(sub.next()).await, None);

            source.publish(3).unwrap();
            assert_eq!(sub.next().await, Some(3));
        })
    }

    #[test]
    fn history_is_bounded() {
        let source = ReplayingSource::with_history(2);
        for n in 0..5 {
            source.publish(n).unwrap();
        }
        assert_eq!(source.len(), 2);
        assert_eq!(source.snapshot(), vec![3, 4]);
    }

    #[test]
    fn lagging_subscriber_skips_to_oldest_retained() {
        block_on(async {
            let source = ReplayingSource::with_history(2);
            let sub = source.subscribe();
            for n in 0..6 {
                source.publish(n).unwrap();
            }
            drop(source);
            let seen: Vec<_> = sub.collect().await;
            assert_eq!(seen, vec![4, 5]);
        })
    }

    #[test]
    fn zero_limit_keeps_one() {
        let source = ReplayingSource::with_history(0);
        assert!(source.is_empty());
        source.publish('a').unwrap();
        source.publish('b').unwrap();
        assert_eq!(source.snapshot(), vec!['b']);
    }

    #[test]
    fn publish_after_close_is_refused() {
        let source = ReplayingSource::with_history(1);
        assert!(source.close());
        assert!(source.is_closed());
        assert_eq!(source.publish(1), Err(AlreadyClosed));
        assert!(!source.close());
    }
}
