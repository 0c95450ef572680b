use std::cell::Cell;
use std::marker::PhantomData;

use crate::rcu::callback::DeferredCallback;
use crate::rcu::cleanup::cleanup_send;
use crate::rcu::guard::ReadGuard;
use crate::rcu::runtime;
use crate::utility::{PhantomUnsend, PhantomUnsync};

/// This trait defines the per-thread RCU context.
///
/// #### Design
///
/// This trait exploits the borrowing rule of Rust.
///
/// > At any given time, you can have either one mutable reference (`&mut T`) or
/// > any number of immutable references (`&T`).
///
/// By exploiting this rule, a thread can never execute a RCU synchronization
/// barrier at the same time as it holds a RCU read lock. [`Context::rcu_read_lock`]
/// requires `&self`, so read locks nest freely; [`Context::rcu_synchronize`]
/// requires `&mut self`, so it can never be called while a [`ReadGuard`] borrows
/// `&self`.
///
/// #### Safety
///
/// There can only be one [`Context`] instance per thread.
pub unsafe trait RcuContext {
    /// Registers the current thread.
    ///
    /// Only the first call on a given thread returns a context.
    fn rcu_register() -> Option<Self>
    where
        Self: Sized;

    /// Waits until the RCU grace period is over.
    ///
    /// Cannot be called from within a read-section (enforced by `&mut self`).
    fn rcu_synchronize(&mut self);

    /// Starts a (possibly nested) RCU critical section.
    fn rcu_read_lock(&self) -> ReadGuard<'_>;

    /// Schedules a callback to run on the dedicated cleanup thread once the
    /// current grace period ends. The callback must be [`Send`].
    fn rcu_call<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static;
}

/// Defines the RCU context for the current thread.
///
/// There can only be one instance per thread. The thread is registered upon
/// creation and unregistered (after a drain barrier) when the context drops.
pub struct Context(PhantomUnsend, PhantomUnsync);

impl Context {
    /// Creates the context for the current thread.
    ///
    /// Only the first call on a given thread returns a context.
    pub fn new() -> Option<Self> {
        thread_local! {static INITIALIZED: Cell<bool> = Cell::new(false)};

        INITIALIZED.with(|initialized| {
            if initialized.replace(true) {
                return None;
            }

            log::info!(
                "registering thread '{}' with the RCU runtime",
                std::thread::current().name().unwrap_or("<unnamed>"),
            );

            runtime::register_thread();
            crate::safety::mark_registered();

            Some(Self(PhantomData, PhantomData))
        })
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        log::info!(
            "unregistering thread '{}' from the RCU runtime",
            std::thread::current().name().unwrap_or("<unnamed>"),
        );

        crate::rcu::cleanup::barrier();
        runtime::unregister_thread();
        crate::safety::mark_unregistered();
    }
}

/// #### Safety
///
/// There can only be one instance per thread.
unsafe impl RcuContext for Context {
    fn rcu_register() -> Option<Self> {
        Self::new()
    }

    fn rcu_synchronize(&mut self) {
        // SAFETY: `&mut self` proves no `ReadGuard` borrowing `&self` is alive.
        runtime::synchronize();
    }

    fn rcu_read_lock(&self) -> ReadGuard<'_> {
        ReadGuard::new(self)
    }

    fn rcu_call<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        cleanup_send(DeferredCallback::new(callback));
    }
}

mod asserts {
    use static_assertions::assert_not_impl_all;

    use super::Context;

    assert_not_impl_all!(Context: Send);
    assert_not_impl_all!(Context: Sync);
}
