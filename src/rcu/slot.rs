//! A generic RCU-protected pointer slot.
//!
//! Collapses the teacher's `boxed`/`shared` container pair into one
//! primitive: a single atomic pointer to a heap-allocated `T`, published
//! with release semantics and read with acquire semantics. Replacing or
//! clearing the slot returns the previous `Box<T>` so the caller can queue
//! its reclamation with [`super::context::RcuContext::rcu_call`] rather than
//! freeing it immediately.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::rcu::guard::ReadGuard;

/// An RCU-protected slot holding `Option<Box<T>>`.
pub struct RcuSlot<T> {
    ptr: AtomicPtr<T>,
}

impl<T> RcuSlot<T> {
    pub fn new(value: Option<Box<T>>) -> Self {
        let raw = value.map_or(ptr::null_mut(), Box::into_raw);
        Self {
            ptr: AtomicPtr::new(raw),
        }
    }

    pub fn empty() -> Self {
        Self::new(None)
    }

    /// Publishes a new value, returning the previous one (if any) for the
    /// caller to defer-free.
    ///
    /// Writer-side: requires no read-section be held by the caller on this
    /// thread for this slot (SPEC_FULL §4.A).
    pub fn assign(&self, value: Option<Box<T>>) -> Option<Box<T>> {
        crate::safety::assert_not_in_read_section("rcu_assign");

        let new_raw = value.map_or(ptr::null_mut(), Box::into_raw);
        let old_raw = self.ptr.swap(new_raw, Ordering::AcqRel);
        Self::reclaim_handle(old_raw)
    }

    /// Atomically replaces the slot's value only if it currently equals
    /// `current` (by pointer identity), returning `Ok(old)` on success or
    /// `Err(new)` (handing the caller's box back) on failure.
    pub fn cmpxchg(
        &self,
        current: *mut T,
        new: Option<Box<T>>,
    ) -> Result<Option<Box<T>>, Option<Box<T>>> {
        crate::safety::assert_not_in_read_section("rcu_cmpxchg");

        let new_raw = new.map_or(ptr::null_mut(), Box::into_raw);

        match self
            .ptr
            .compare_exchange(current, new_raw, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(old_raw) => Ok(Self::reclaim_handle(old_raw)),
            Err(_) => Err(Self::reclaim_handle(new_raw)),
        }
    }

    /// Reads the current pointer under a read-section.
    ///
    /// Reader-side: the returned reference is valid only for the lifetime of
    /// `guard` (SPEC_FULL invariant #4).
    pub fn dereference<'a>(&'a self, guard: &'a ReadGuard<'a>) -> Option<&'a T> {
        let _ = guard;
        let raw = self.ptr.load(Ordering::Acquire);
        // SAFETY: non-null entries are always produced from `Box::into_raw` and
        // only freed after a grace period during which no reader can hold `guard`.
        unsafe { raw.as_ref() }
    }

    fn reclaim_handle(raw: *mut T) -> Option<Box<T>> {
        if raw.is_null() {
            None
        } else {
            // SAFETY: raw was produced by `Box::into_raw` and is being removed
            // from the slot exactly once.
            Some(unsafe { Box::from_raw(raw) })
        }
    }
}

impl<T> Drop for RcuSlot<T> {
    fn drop(&mut self) {
        let raw = *self.ptr.get_mut();
        drop(Self::reclaim_handle(raw));
    }
}

/// #### Safety
///
/// `T: Send + Sync` makes sharing the slot across threads sound; the
/// compare-exchange/swap operations provide the necessary synchronization.
unsafe impl<T: Send + Sync> Send for RcuSlot<T> {}
unsafe impl<T: Send + Sync> Sync for RcuSlot<T> {}
