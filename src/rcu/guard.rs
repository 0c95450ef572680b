use std::marker::PhantomData;

use crate::rcu::context::Context;
use crate::rcu::runtime;
use crate::utility::{PhantomUnsend, PhantomUnsync};

/// A guard for an RCU critical section.
///
/// Unlocks on drop. Neither [`Send`] nor [`Sync`]: a read-section must stay
/// on the thread that opened it.
#[allow(dead_code)]
pub struct ReadGuard<'a>(PhantomUnsend<&'a ()>, PhantomUnsync<&'a ()>);

impl<'a> ReadGuard<'a> {
    pub(crate) fn new(context: &'a Context) -> Self {
        let _ = context;

        runtime::read_lock();

        Self(PhantomData, PhantomData)
    }
}

impl<'a> Drop for ReadGuard<'a> {
    fn drop(&mut self) {
        runtime::read_unlock();
    }
}

mod asserts {
    use static_assertions::assert_not_impl_all;

    use super::ReadGuard;

    assert_not_impl_all!(ReadGuard<'static>: Send);
    assert_not_impl_all!(ReadGuard<'static>: Sync);
}
