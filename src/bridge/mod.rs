//! A merge stream that can be steered from outside.
//!
//! [`MergeSource`] fans any number of sources into one output channel. The
//! consumer reads the channel through a [`MergeStream`]; everybody else gets a
//! [`ControlHandle`] to push extra elements into it or to close it early.
//!
//! Elements from a single source keep their order. Across sources the order
//! is whatever the sources' readiness makes it.
//!
//! The channel closes exactly once: when the last source finishes, when a
//! handle calls [`ControlHandle::close`], or when the stream is dropped.
//! Whichever comes first runs the teardown callback, and from then on every
//! handle reports [`AlreadyClosed`].

use core::fmt;
use core::pin::Pin;
use std::collections::VecDeque;
use std::sync::Arc;

use futures_core::{Stream, TryStream};

mod channel;
mod control;
mod error;
mod stream;

pub use channel::{BridgeState, Capacity};
pub use control::{ControlHandle, SendFuture};
pub use error::{AlreadyClosed, PushError, SendError, SourceError, SourceId};
pub use stream::MergeStream;

use crate::source::NeverFails;
use channel::{Shared, Teardown};
use stream::{ElementHook, ErrorHook};

/// A boxed source, for merging sources of different concrete types.
pub type BoxSource<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Builder for a bridge.
///
/// Nothing runs until the stream returned by [`MergeSource::start`] is first
/// polled. On that first poll the initial [`burst`](MergeSource::burst) is
/// enqueued, the control handles go live, and the sources start forwarding.
///
/// # Examples
///
/// ```
/// use merge_bridge::MergeSource;
/// use futures_lite::future::block_on;
/// use futures_lite::stream::{self, StreamExt};
///
/// block_on(async {
///     let a = stream::iter(vec![1, 2, 3]);
///     let b = stream::iter(vec![4, 5]);
///     let (stream, _handle) = MergeSource::new(vec![a, b]).start();
///
///     let mut out: Vec<_> = stream.collect().await;
///     out.sort_unstable();
///     assert_eq!(out, vec![1, 2, 3, 4, 5]);
/// })
/// ```
pub struct MergeSource<S>
where
    S: TryStream,
{
    sources: Vec<S>,
    burst: VecDeque<S::Ok>,
    capacity: Capacity,
    close_on_exhaustion: bool,
    on_element: Option<ElementHook<S::Ok>>,
    on_source_error: Option<ErrorHook<S::Error>>,
    on_teardown: Option<Teardown>,
}

impl<S> MergeSource<NeverFails<S>>
where
    S: Stream,
{
    /// Merge sources that cannot fail.
    pub fn new<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
    {
        MergeSource::try_new(sources.into_iter().map(NeverFails::new))
    }
}

impl<S> MergeSource<S>
where
    S: TryStream,
{
    /// Merge sources that yield `Result`s.
    ///
    /// A source that yields an `Err` is retired and the error is recorded as
    /// a [`SourceError`]; the other sources carry on.
    pub fn try_new<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
    {
        Self {
            sources: sources.into_iter().collect(),
            burst: VecDeque::new(),
            capacity: Capacity::default(),
            close_on_exhaustion: true,
            on_element: None,
            on_source_error: None,
            on_teardown: None,
        }
    }

    /// Elements to enqueue during activation, before any handle goes live.
    pub fn burst<I>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S::Ok>,
    {
        self.burst.extend(items);
        self
    }

    /// Capacity of the output channel. Defaults to [`Capacity::Unbounded`].
    pub fn capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Whether the channel closes once every source has finished.
    ///
    /// Defaults to `true`. With `false` the bridge stays open after its
    /// sources are done, until a handle closes it or the stream is dropped.
    pub fn close_on_exhaustion(mut self, close: bool) -> Self {
        self.close_on_exhaustion = close;
        self
    }

    /// Observe every element as it is delivered to the consumer.
    pub fn on_element<F>(mut self, f: F) -> Self
    where
        F: FnMut(&S::Ok) + Send + 'static,
    {
        self.on_element = Some(Box::new(f));
        self
    }

    /// Observe every source failure as it happens.
    pub fn on_source_error<F>(mut self, f: F) -> Self
    where
        F: FnMut(&SourceError<S::Error>) + Send + 'static,
    {
        self.on_source_error = Some(Box::new(f));
        self
    }

    /// Run `f` exactly once, when the channel closes.
    ///
    /// `f` runs on whichever side closes the channel: the consumer's task on
    /// exhaustion or drop, or the caller of [`ControlHandle::close`].
    pub fn on_teardown<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_teardown = Some(Box::new(f));
        self
    }

    /// Build the bridge, returning the consuming stream and a control handle.
    pub fn start(self) -> (MergeStream<S>, ControlHandle<S::Ok>) {
        let shared = Arc::new(Shared::new(self.capacity, self.on_teardown));
        let handle = ControlHandle::new(Arc::clone(&shared));
        let stream = MergeStream::new(
            self.sources,
            self.burst,
            self.close_on_exhaustion,
            shared,
            self.on_element,
            self.on_source_error,
        );
        (stream, handle)
    }
}

impl<S> fmt::Debug for MergeSource<S>
where
    S: TryStream + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeSource")
            .field("sources", &self.sources)
            .field("burst", &self.burst.len())
            .field("capacity", &self.capacity)
            .field("close_on_exhaustion", &self.close_on_exhaustion)
            .finish_non_exhaustive()
    }
}

/// Start building a bridge straight from a collection of sources.
///
/// # Examples
///
/// ```
/// use merge_bridge::prelude::*;
/// use futures_lite::future::block_on;
/// use futures_lite::stream::{self, StreamExt};
///
/// block_on(async {
///     let (stream, _handle) = [stream::once(1), stream::once(2)].bridge().start();
///     assert_eq!(stream.fold(0, |acc, n| acc + n).await, 3);
/// })
/// ```
pub trait IntoBridge {
    /// The source type the bridge forwards from.
    type Source: TryStream;

    /// Wrap the sources in a [`MergeSource`] builder.
    fn bridge(self) -> MergeSource<Self::Source>;
}

impl<S> IntoBridge for Vec<S>
where
    S: Stream,
{
    type Source = NeverFails<S>;

    fn bridge(self) -> MergeSource<Self::Source> {
        MergeSource::new(self)
    }
}

impl<S, const N: usize> IntoBridge for [S; N]
where
    S: Stream,
{
    type Source = NeverFails<S>;

    fn bridge(self) -> MergeSource<Self::Source> {
        MergeSource::new(self)
    }
}
