//! Deferred callbacks queued to run after the next RCU grace period.
//!
//! Since there is no liburcu linked-list-of-heads to splice into, a deferred
//! callback is simply a boxed closure sent down the cleanup thread's channel
//! (see [`crate::rcu::cleanup`]).

/// A callback to be invoked on the cleanup thread after the next grace
/// period ends.
pub struct DeferredCallback {
    func: Box<dyn FnOnce() + Send + 'static>,
}

impl DeferredCallback {
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            func: Box::new(func),
        }
    }

    pub(crate) fn run(self) {
        (self.func)()
    }
}
