//! A merge stream with an escape hatch: fan any number of sources into one
//! output stream, and hand the code *outside* that stream a
//! [`ControlHandle`] to push late elements into it or to shut it down.
//!
//! ```text
//!   source 0 ──┐
//!   source 1 ──┼──▶ output channel ──▶ MergeStream ──▶ consumer
//!   source N ──┤          ▲
//!   burst ─────┘          │ push / close
//!                   ControlHandle (any thread)
//! ```
//!
//! The control capabilities outlive the code that built the stream, so their
//! validity is enforced at runtime: a handle only forwards between
//! activation and closure, and the teardown callback runs exactly once, no
//! matter whether the channel was closed by a handle, by the sources running
//! dry, or by the consumer dropping the stream.
//!
//! # Examples
//!
//! ```rust
//! use merge_bridge::prelude::*;
//! use futures_lite::future::block_on;
//! use futures_lite::stream::{self, StreamExt};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! block_on(async {
//!     let torn_down = Arc::new(AtomicUsize::new(0));
//!     let counter = torn_down.clone();
//!
//!     let (mut stream, handle) = vec![stream::pending::<u8>()]
//!         .bridge()
//!         .burst(1..=5)
//!         .on_teardown(move || {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!         })
//!         .start();
//!
//!     // The first poll activates the bridge.
//!     assert_eq!(stream.next().await, Some(1));
//!
//!     handle.push(6).unwrap();
//!     handle.close().unwrap();
//!     assert!(handle.push(7).is_err());
//!
//!     let rest: Vec<_> = stream.collect().await;
//!     assert_eq!(rest, vec![2, 3, 4, 5, 6]);
//!     assert_eq!(torn_down.load(Ordering::SeqCst), 1);
//! })
//! ```
//!
//! # Hot sources
//!
//! Plain streams are cold: they start producing when the bridge first polls
//! them. For values that exist whether or not anyone listens, see
//! [`ConflatingSource`] and [`ReplayingSource`] in the [`source`] module.

#![deny(missing_debug_implementations, nonstandard_style)]
#![warn(missing_docs, unreachable_pub)]

mod bridge;
mod utils;

pub mod source;

/// The merge-bridge prelude.
pub mod prelude {
    pub use super::IntoBridge as _;
    pub use super::{ControlHandle, MergeSource, MergeStream};
}

pub use bridge::{
    AlreadyClosed, BoxSource, BridgeState, Capacity, ControlHandle, IntoBridge, MergeSource,
    MergeStream, PushError, SendError, SendFuture, SourceError, SourceId,
};
pub use source::{ConflatingSource, ReplayingSource};
