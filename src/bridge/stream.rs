use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::collections::VecDeque;
use std::sync::Arc;

use futures_core::stream::{FusedStream, Stream, TryStream};
use pin_project::{pin_project, pinned_drop};

use super::channel::{BridgeState, CloseReason, Offer, Recv, Shared};
use super::control::ControlHandle;
use super::error::{SourceError, SourceId};
use crate::utils::{self, Fuse, WakerVec};

pub(crate) type ElementHook<T> = Box<dyn FnMut(&T) + Send + 'static>;
pub(crate) type ErrorHook<E> = Box<dyn FnMut(&SourceError<E>) + Send + 'static>;

/// The consuming end of a bridge: yields every element forwarded from the
/// sources, the initial burst, and the control handles, then ends once the
/// output channel closes.
///
/// Dropping the stream cancels every source and closes the channel, running
/// teardown if it has not run yet.
///
/// This `struct` is created by [`MergeSource::start`][super::MergeSource::start].
#[pin_project(PinnedDrop)]
pub struct MergeStream<S>
where
    S: TryStream,
{
    #[pin]
    sources: Vec<Fuse<S>>,
    wakers: WakerVec,
    complete: usize,
    burst: VecDeque<S::Ok>,
    close_on_exhaustion: bool,
    shared: Arc<Shared<S::Ok>>,
    on_element: Option<ElementHook<S::Ok>>,
    on_source_error: Option<ErrorHook<S::Error>>,
    errors: Vec<SourceError<S::Error>>,
    done: bool,
}

/// Outcome of one pass over the sources.
enum Pass {
    /// A source produced an element and it was enqueued.
    Forwarded,
    /// A source ended or failed; re-check for exhaustion.
    Retired,
    /// No source can make progress right now.
    Pending,
}

impl<S> MergeStream<S>
where
    S: TryStream,
{
    pub(crate) fn new(
        sources: Vec<S>,
        burst: VecDeque<S::Ok>,
        close_on_exhaustion: bool,
        shared: Arc<Shared<S::Ok>>,
        on_element: Option<ElementHook<S::Ok>>,
        on_source_error: Option<ErrorHook<S::Error>>,
    ) -> Self {
        Self {
            wakers: WakerVec::new(sources.len()),
            sources: sources.into_iter().map(Fuse::new).collect(),
            complete: 0,
            burst,
            close_on_exhaustion,
            shared,
            on_element,
            on_source_error,
            errors: Vec::new(),
            done: false,
        }
    }

    /// Another handle to control this bridge.
    pub fn handle(&self) -> ControlHandle<S::Ok> {
        ControlHandle::new(Arc::clone(&self.shared))
    }

    /// The current lifecycle state of the bridge.
    pub fn state(&self) -> BridgeState {
        self.shared.state()
    }

    /// Every source failure recorded so far, in the order they happened.
    pub fn errors(&self) -> &[SourceError<S::Error>] {
        &self.errors
    }

    /// Takes the recorded source failures, leaving the list empty.
    pub fn take_errors(&mut self) -> Vec<SourceError<S::Error>> {
        std::mem::take(&mut self.errors)
    }
}

impl<S> fmt::Debug for MergeStream<S>
where
    S: TryStream + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeStream")
            .field("sources", &self.sources)
            .field("state", &self.shared.state())
            .field("complete", &self.complete)
            .field("buffered_burst", &self.burst.len())
            .finish_non_exhaustive()
    }
}

/// Move as much of the initial burst into the channel as fits. The bridge
/// goes live once all of it is in.
fn flush_burst<T>(shared: &Shared<T>, burst: &mut VecDeque<T>) {
    while let Some(item) = burst.pop_front() {
        match shared.offer(item) {
            Offer::Accepted => {}
            Offer::Full(item) => {
                burst.push_front(item);
                return;
            }
            Offer::Closed(_) => {
                burst.clear();
                return;
            }
        }
    }
    if shared.transition(BridgeState::Activating, BridgeState::Live) {
        tracing::debug!("bridge live");
    }
}

impl<S> Stream for MergeStream<S>
where
    S: TryStream,
{
    type Item = S::Ok;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        if this
            .shared
            .transition(BridgeState::Created, BridgeState::Activating)
        {
            tracing::debug!(
                sources = this.sources.len(),
                burst = this.burst.len(),
                "activating bridge"
            );
        }

        loop {
            if this.shared.state() == BridgeState::Activating {
                flush_burst(this.shared, this.burst);
            }

            match this.shared.recv(cx.waker()) {
                Recv::Item(item) => {
                    if let Some(hook) = this.on_element.as_mut() {
                        hook(&item);
                    }
                    return Poll::Ready(Some(item));
                }
                Recv::Closed => {
                    *this.done = true;
                    return Poll::Ready(None);
                }
                Recv::Empty => {}
            }

            if *this.complete == this.sources.len() {
                if *this.close_on_exhaustion && this.burst.is_empty() {
                    this.shared.close(CloseReason::Exhausted);
                    continue;
                }
                // Held open: only a control handle or a drop can end us now.
                return Poll::Pending;
            }

            // Pull from the sources. Any element lands in the channel and is
            // picked up on the next turn of the loop.
            let len = this.sources.len();
            let mut index = utils::random(len as u32) as usize;
            let pass = {
                let mut readiness = this.wakers.readiness().lock().unwrap();
                readiness.set_waker(cx.waker());

                loop {
                    if !readiness.any_ready() {
                        break Pass::Pending;
                    }

                    index = (index + 1).wrapping_rem(len);
                    if !readiness.clear_ready(index) {
                        continue;
                    }

                    // unlock readiness so we don't deadlock when polling
                    drop(readiness);

                    let source = utils::get_pin_mut_from_vec(this.sources.as_mut(), index);
                    let mut source = match source {
                        Some(source) if !source.is_done() => source,
                        _ => {
                            readiness = this.wakers.readiness().lock().unwrap();
                            continue;
                        }
                    };

                    let waker = this.wakers.get(index).unwrap();
                    let mut cx = Context::from_waker(waker);

                    match source.as_mut().poll_next(&mut cx) {
                        Poll::Ready(Some(Ok(item))) => {
                            // Mark ourselves as ready again because we need to poll for the next item.
                            this.wakers.readiness().lock().unwrap().set_ready(index);
                            if this.shared.forward(item) {
                                tracing::trace!(source = index, "forwarded element");
                            }
                            break Pass::Forwarded;
                        }
                        Poll::Ready(Some(Err(error))) => {
                            *this.complete += 1;
                            tracing::warn!(source = index, "source failed");
                            let error = SourceError::new(SourceId(index), error);
                            if let Some(hook) = this.on_source_error.as_mut() {
                                hook(&error);
                            }
                            this.errors.push(error);
                            break Pass::Retired;
                        }
                        Poll::Ready(None) => {
                            *this.complete += 1;
                            tracing::trace!(source = index, "source finished");
                            break Pass::Retired;
                        }
                        Poll::Pending => {}
                    }

                    // Lock readiness so we can use it again
                    readiness = this.wakers.readiness().lock().unwrap();
                }
            };

            if let Pass::Pending = pass {
                return Poll::Pending;
            }
        }
    }
}

impl<S> FusedStream for MergeStream<S>
where
    S: TryStream,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}

#[pinned_drop]
impl<S> PinnedDrop for MergeStream<S>
where
    S: TryStream,
{
    fn drop(self: Pin<&mut Self>) {
        self.shared.close(CloseReason::Cancelled);
    }
}
