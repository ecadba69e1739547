mod vec;
mod waker_set;

#[cfg(test)]
mod dummy;

#[cfg(test)]
pub(crate) use dummy::DummyWaker;

pub(crate) use vec::WakerVec;
pub(crate) use waker_set::WakerSet;
