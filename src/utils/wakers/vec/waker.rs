use std::sync::{Arc, Mutex};
use std::task::Wake;

use super::ReadinessVec;

/// A waker which marks its source ready before waking the consumer.
#[derive(Debug, Clone)]
pub(crate) struct InlineWakerVec {
    pub(crate) id: usize,
    pub(crate) readiness: Arc<Mutex<ReadinessVec>>,
}

impl InlineWakerVec {
    pub(crate) fn new(id: usize, readiness: Arc<Mutex<ReadinessVec>>) -> Self {
        Self { id, readiness }
    }
}

impl Wake for InlineWakerVec {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref()
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let mut readiness = self.readiness.lock().unwrap();
        if !readiness.set_ready(self.id) {
            if let Some(parent) = readiness.parent_waker() {
                parent.wake_by_ref();
            }
        }
    }
}
