use core::task::Waker;
use fixedbitset::FixedBitSet;

/// Tracks which sources have been woken and should be polled again.
#[derive(Debug)]
pub(crate) struct ReadinessVec {
    ready_count: usize,
    readiness_list: FixedBitSet,
    parent_waker: Option<Waker>,
}

impl ReadinessVec {
    /// Create a new instance with every index marked ready.
    pub(crate) fn new(len: usize) -> Self {
        let mut readiness_list = FixedBitSet::with_capacity(len);
        readiness_list.insert_range(..);
        Self {
            ready_count: len,
            readiness_list,
            parent_waker: None,
        }
    }

    /// Set the ready state to `true` for the given index
    ///
    /// Returns the old ready state for this id
    pub(crate) fn set_ready(&mut self, index: usize) -> bool {
        if !self.readiness_list[index] {
            self.ready_count += 1;
            self.readiness_list.set(index, true);
            false
        } else {
            true
        }
    }

    /// Set the ready state to `false` for the given index
    ///
    /// Returns whether the index was previously ready
    pub(crate) fn clear_ready(&mut self, index: usize) -> bool {
        if self.readiness_list[index] {
            self.ready_count -= 1;
            self.readiness_list.set(index, false);
            true
        } else {
            false
        }
    }

    /// Returns `true` if any of the wakers are ready.
    pub(crate) fn any_ready(&self) -> bool {
        self.ready_count > 0
    }

    #[inline]
    pub(crate) fn parent_waker(&self) -> Option<&Waker> {
        self.parent_waker.as_ref()
    }

    /// Set the parent `Waker`. This needs to be called at the start of every
    /// pass over the sources.
    pub(crate) fn set_waker(&mut self, parent_waker: &Waker) {
        match &mut self.parent_waker {
            Some(prev) => prev.clone_from(parent_waker),
            None => self.parent_waker = Some(parent_waker.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_all_ready() {
        let mut readiness = ReadinessVec::new(3);
        assert!(readiness.any_ready());
        assert!(readiness.clear_ready(0));
        assert!(readiness.clear_ready(1));
        assert!(readiness.clear_ready(2));
        assert!(!readiness.any_ready());
        assert!(!readiness.clear_ready(2));
        assert!(!readiness.set_ready(1));
        assert!(readiness.set_ready(1));
        assert!(readiness.any_ready());
    }

    #[test]
    fn empty() {
        let readiness = ReadinessVec::new(0);
        assert!(!readiness.any_ready());
    }
}
