use core::task::Waker;
use slab::Slab;

/// A registry of parked tasks, keyed by the slot each one was handed.
///
/// Entries are only ever removed by their owner, so a key stays valid for as
/// long as the owner holds it, even across [`WakerSet::wake_all`].
#[derive(Debug, Default)]
pub(crate) struct WakerSet {
    wakers: Slab<Waker>,
}

impl WakerSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register or refresh the waker stored under `key`.
    pub(crate) fn register(&mut self, key: &mut Option<usize>, waker: &Waker) {
        match key {
            Some(key) => match self.wakers.get_mut(*key) {
                Some(prev) => prev.clone_from(waker),
                None => *key = self.wakers.insert(waker.clone()),
            },
            None => *key = Some(self.wakers.insert(waker.clone())),
        }
    }

    /// Forget the waker stored under `key`, if any.
    pub(crate) fn remove(&mut self, key: &mut Option<usize>) {
        if let Some(key) = key.take() {
            self.wakers.try_remove(key);
        }
    }

    pub(crate) fn wake_all(&self) {
        for (_, waker) in self.wakers.iter() {
            waker.wake_by_ref();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.wakers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::DummyWaker;
    use std::sync::Arc;

    #[test]
    fn register_refresh_remove() {
        let waker: Waker = Arc::new(DummyWaker()).into();
        let mut set = WakerSet::new();
        let mut a = None;
        let mut b = None;

        set.register(&mut a, &waker);
        set.register(&mut b, &waker);
        let first = a;
        set.register(&mut a, &waker);
        assert_eq!(a, first);
        assert_eq!(set.len(), 2);

        set.wake_all();
        assert_eq!(set.len(), 2);

        set.remove(&mut a);
        assert_eq!(a, None);
        assert_eq!(set.len(), 1);
        set.remove(&mut a);
        assert_eq!(set.len(), 1);
    }
}
