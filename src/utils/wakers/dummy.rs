use std::sync::Arc;
use std::task::Wake;

/// A waker that does nothing, for driving polls by hand in tests.
#[derive(Debug, Clone)]
pub(crate) struct DummyWaker();

impl Wake for DummyWaker {
    fn wake(self: Arc<Self>) {}
}
