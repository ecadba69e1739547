//! The output channel shared by a [`MergeStream`][super::MergeStream] and its
//! [`ControlHandle`][super::ControlHandle]s.

use core::fmt;
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicU8, Ordering};
use core::task::Waker;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::utils::WakerSet;

/// How many elements the output channel holds before pushes are refused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Capacity {
    /// Pushes always succeed while the bridge is live.
    #[default]
    Unbounded,
    /// Pushes fail with [`PushError::WouldBlock`][crate::PushError::WouldBlock]
    /// once this many elements are waiting for the consumer.
    ///
    /// Sources are only polled when the consumer finds the channel empty, but
    /// a push from another thread can land in between. The element pulled from
    /// the source is then still enqueued, so the channel may briefly hold one
    /// element more than this.
    Bounded(NonZeroUsize),
}

impl Capacity {
    /// A bounded capacity, or `None` if `n` is zero.
    pub fn bounded(n: usize) -> Option<Self> {
        NonZeroUsize::new(n).map(Self::Bounded)
    }

    fn admits(&self, len: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded(max) => len < max.get(),
        }
    }
}

/// The lifecycle of a bridge.
///
/// ```text
/// Created -> Activating -> Live -> Closing -> Closed
/// ```
///
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgeState {
    /// Built, but the consumer has not polled it yet.
    Created = 0,
    /// The initial burst is being forwarded.
    Activating = 1,
    /// Control handles forward to the channel.
    Live = 2,
    /// The channel is closed and teardown is running.
    Closing = 3,
    /// Teardown has finished.
    Closed = 4,
}

impl BridgeState {
    fn from_u8(n: u8) -> Self {
        match n {
            0 => Self::Created,
            1 => Self::Activating,
            2 => Self::Live,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Returns `true` once the channel no longer accepts elements.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

/// What closed the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// A control handle asked for it.
    Requested,
    /// Every source finished.
    Exhausted,
    /// The consumer dropped the stream.
    Cancelled,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requested => "requested",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        })
    }
}

pub(crate) type Teardown = Box<dyn FnOnce() + Send + 'static>;

/// Result of trying to place an element into the channel.
#[derive(Debug)]
pub(crate) enum Offer<T> {
    Accepted,
    Full(T),
    Closed(T),
}

/// Result of trying to take an element out of the channel.
#[derive(Debug)]
pub(crate) enum Recv<T> {
    Item(T),
    Empty,
    Closed,
}

struct Channel<T> {
    queue: VecDeque<T>,
    capacity: Capacity,
    closed: bool,
    receiver: Option<Waker>,
    senders: WakerSet,
    teardown: Option<Teardown>,
}

impl<T> Channel<T> {
    fn wake_receiver(&mut self) {
        if let Some(waker) = self.receiver.take() {
            waker.wake();
        }
    }
}

/// State shared between the consuming stream and every control handle.
///
/// The mutex guards the buffered elements and nothing else; the lifecycle is
/// a lone atomic moved with compare-and-set.
pub(crate) struct Shared<T> {
    state: AtomicU8,
    channel: Mutex<Channel<T>>,
}

impl<T> Shared<T> {
    pub(crate) fn new(capacity: Capacity, teardown: Option<Teardown>) -> Self {
        Self {
            state: AtomicU8::new(BridgeState::Created as u8),
            channel: Mutex::new(Channel {
                queue: VecDeque::new(),
                capacity,
                closed: false,
                receiver: None,
                senders: WakerSet::new(),
                teardown,
            }),
        }
    }

    pub(crate) fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`. Returns `false` if another transition won.
    pub(crate) fn transition(&self, from: BridgeState, to: BridgeState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enqueue an element if there is room for it.
    pub(crate) fn offer(&self, item: T) -> Offer<T> {
        let mut channel = self.channel.lock().unwrap();
        if channel.closed {
            return Offer::Closed(item);
        }
        if !channel.capacity.admits(channel.queue.len()) {
            return Offer::Full(item);
        }
        channel.queue.push_back(item);
        channel.wake_receiver();
        Offer::Accepted
    }

    /// Like [`Shared::offer`], but parks `waker` under `key` when the channel
    /// is full so the caller is woken once the consumer makes room.
    pub(crate) fn offer_or_park(
        &self,
        item: T,
        key: &mut Option<usize>,
        waker: &Waker,
    ) -> Offer<T> {
        let mut channel = self.channel.lock().unwrap();
        if channel.closed {
            channel.senders.remove(key);
            return Offer::Closed(item);
        }
        if !channel.capacity.admits(channel.queue.len()) {
            channel.senders.register(key, waker);
            return Offer::Full(item);
        }
        channel.senders.remove(key);
        channel.queue.push_back(item);
        channel.wake_receiver();
        Offer::Accepted
    }

    /// Forget a parked sender.
    pub(crate) fn unpark(&self, key: &mut Option<usize>) {
        if key.is_some() {
            self.channel.lock().unwrap().senders.remove(key);
        }
    }

    /// Enqueue an element pulled from a source.
    ///
    /// The element has already left its source, so the capacity is not
    /// consulted: a handle push racing the consumer can leave one element
    /// over the bound. Returns `false` if the bridge is closing and the
    /// element was dropped.
    pub(crate) fn forward(&self, item: T) -> bool {
        let mut channel = self.channel.lock().unwrap();
        if channel.closed || self.state().is_closed() {
            return false;
        }
        channel.queue.push_back(item);
        true
    }

    /// Take the oldest element, or register `waker` to hear about the next one.
    pub(crate) fn recv(&self, waker: &Waker) -> Recv<T> {
        let mut channel = self.channel.lock().unwrap();
        match channel.queue.pop_front() {
            Some(item) => {
                channel.senders.wake_all();
                Recv::Item(item)
            }
            None if channel.closed => Recv::Closed,
            None => {
                match &mut channel.receiver {
                    Some(prev) => prev.clone_from(waker),
                    None => channel.receiver = Some(waker.clone()),
                }
                Recv::Empty
            }
        }
    }

    /// Close the channel and run teardown.
    ///
    /// Any state but `Closing`/`Closed` may be closed. Returns `false` if the
    /// channel was already closing, in which case nothing happens.
    pub(crate) fn close(&self, reason: CloseReason) -> bool {
        let mut current = self.state();
        loop {
            if current.is_closed() {
                return false;
            }
            if self.transition(current, BridgeState::Closing) {
                break;
            }
            current = self.state();
        }
        tracing::debug!(%reason, from = ?current, "closing bridge");

        // Teardown must finish before the consumer can observe the end.
        let teardown = self.channel.lock().unwrap().teardown.take();
        if let Some(teardown) = teardown {
            teardown();
        }
        {
            let mut channel = self.channel.lock().unwrap();
            channel.closed = true;
            channel.senders.wake_all();
            channel.wake_receiver();
        }

        self.state.store(BridgeState::Closed as u8, Ordering::Release);
        tracing::debug!(%reason, "bridge closed");
        true
    }

    #[cfg(test)]
    pub(crate) fn buffered(&self) -> usize {
        self.channel.lock().unwrap().queue.len()
    }
}

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
