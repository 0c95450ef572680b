//! The safety wrapper (SPEC_FULL §4.B), reinterpreting
//! `original_source/include/urcu_safe.h`'s macro-override design — which
//! redefines every RCU/LFHT call to a `_safe` variant wrapped in scope
//! tracking — as an ordinary Rust wrapper layer gated behind the
//! `safety-checks` feature (the original's `URCU_LFHT_SAFETY_ON` switch).
//!
//! Where Rust's own borrow checker already makes a violation
//! unrepresentable (synchronizing while holding a [`crate::rcu::ReadGuard`]),
//! this module does not duplicate a runtime check for it. It covers what
//! the type system cannot see: registration state and read-section nesting
//! depth observed from arbitrary call sites, and recognising the dedicated
//! cleanup thread so it is never mistaken for a misbehaving caller.

use std::cell::Cell;
use std::thread::ThreadId;

use once_cell::sync::OnceCell;

thread_local! {
    static REGISTERED: Cell<bool> = Cell::new(false);
    static IN_CALLBACK: Cell<bool> = Cell::new(false);
}

/// The identity of the dedicated RCU cleanup thread, recorded once on its
/// first callback (SPEC_FULL §4.B "auto-identifies the callback thread").
static CALLBACK_THREAD: OnceCell<ThreadId> = OnceCell::new();

/// Records the current thread as the callback thread. Idempotent; called
/// once by [`crate::rcu::cleanup::Cleaner`] on startup.
pub(crate) fn mark_callback_thread() {
    let _ = CALLBACK_THREAD.set(std::thread::current().id());
}

/// Returns whether the current thread is the dedicated RCU cleanup thread.
pub fn is_callback_thread() -> bool {
    CALLBACK_THREAD.get() == Some(&std::thread::current().id())
}

pub(crate) fn enter_callback() {
    IN_CALLBACK.with(|c| c.set(true));
}

pub(crate) fn exit_callback() {
    IN_CALLBACK.with(|c| c.set(false));
}

/// Returns whether the current thread is presently executing a deferred
/// free callback (SPEC_FULL §5: a callback may not call `barrier` or
/// `synchronize`).
pub fn is_in_callback() -> bool {
    IN_CALLBACK.with(|c| c.get())
}

/// Marks the current thread as registered with the safety wrapper's view of
/// the world. Called by [`crate::rcu::context::Context::new`].
pub(crate) fn mark_registered() {
    REGISTERED.with(|r| r.set(true));
}

pub(crate) fn mark_unregistered() {
    REGISTERED.with(|r| r.set(false));
}

/// Returns whether the current thread has a live [`crate::rcu::Context`].
pub fn is_registered() -> bool {
    REGISTERED.with(|r| r.get())
}

/// Returns the current thread's RCU read-section nesting depth.
pub fn read_lock_depth() -> u64 {
    crate::rcu::runtime::read_depth()
}

/// Returns whether the current thread is inside an open read-section.
pub fn is_in_read_section() -> bool {
    read_lock_depth() > 0
}

/// Contract-violation outcome: fatal by default, downgradable to an error
/// return in test mode (SPEC_FULL §7 "Contract violation... reducible to a
/// non-fatal sentinel in test mode").
#[cfg(feature = "safety-checks")]
pub(crate) fn assert_registered(operation: &str) {
    if !is_registered() {
        log::error!("contract violation: '{operation}' called on an unregistered thread");
        if !cfg!(test) {
            std::process::abort();
        }
    }
}

#[cfg(not(feature = "safety-checks"))]
pub(crate) fn assert_registered(_operation: &str) {}

/// Rejects a read-side or write-side hash-map call made without an open
/// read-section (SPEC_FULL §4.C: "all in-contract require an open
/// read-section").
#[cfg(feature = "safety-checks")]
pub(crate) fn assert_in_read_section(operation: &str) {
    if !is_in_read_section() {
        log::error!("contract violation: '{operation}' called without an open read-section");
        if !cfg!(test) {
            std::process::abort();
        }
    }
}

#[cfg(not(feature = "safety-checks"))]
pub(crate) fn assert_in_read_section(_operation: &str) {}

/// Rejects a writer-side publish/synchronize/barrier call made from inside
/// an open read-section (SPEC_FULL §4.A: "forbidden inside a read-section").
#[cfg(feature = "safety-checks")]
pub(crate) fn assert_not_in_read_section(operation: &str) {
    if is_in_read_section() {
        log::error!("contract violation: '{operation}' called from within a read-section");
        if !cfg!(test) {
            std::process::abort();
        }
    }
}

#[cfg(not(feature = "safety-checks"))]
pub(crate) fn assert_not_in_read_section(_operation: &str) {}

/// Rejects a `synchronize`/`barrier` call made from within a deferred
/// callback (SPEC_FULL §5).
#[cfg(feature = "safety-checks")]
pub(crate) fn assert_not_in_callback(operation: &str) {
    if is_in_callback() {
        log::error!("contract violation: '{operation}' called from within a deferred callback");
        if !cfg!(test) {
            std::process::abort();
        }
    }
}

#[cfg(not(feature = "safety-checks"))]
pub(crate) fn assert_not_in_callback(_operation: &str) {}
