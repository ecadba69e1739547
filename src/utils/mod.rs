//! Utilities shared by the bridge and the hot sources.

mod fuse;
mod pin;
mod rng;
mod wakers;

pub(crate) use fuse::Fuse;
pub(crate) use pin::get_pin_mut_from_vec;
pub(crate) use rng::random;
pub(crate) use wakers::{WakerSet, WakerVec};

#[cfg(test)]
pub(crate) use wakers::DummyWaker;

#[cfg(test)]
pub(crate) mod channel;
