//! The grace-period engine.
//!
//! There is no liburcu to bind against, so the grace period is tracked
//! natively: one registration slot per thread holding `(depth, generation)`,
//! plus a global generation counter. `synchronize` snapshots every other
//! registered thread's slot and spins until each snapshotted thread has
//! either left its read-section or moved on to a later generation — either
//! condition proves that any section open at the time of the call has ended.
//!
//! This corresponds in spirit to liburcu's "mb" (memory-barrier) flavor: no
//! cooperative quiescent-state reporting is required from readers beyond the
//! existing read-lock/unlock bracketing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

use crossbeam_utils::Backoff;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// One entry per registered thread.
struct ThreadSlot {
    /// Nesting depth of open read-sections. Zero means not currently reading.
    depth: AtomicU64,
    /// The generation snapshot taken when `depth` last transitioned 0 -> 1.
    generation: AtomicU64,
}

impl ThreadSlot {
    fn new() -> Self {
        Self {
            depth: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> (u64, u64) {
        (
            self.depth.load(Ordering::Acquire),
            self.generation.load(Ordering::Acquire),
        )
    }
}

struct Registry {
    slots: HashMap<ThreadId, &'static ThreadSlot>,
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| {
    Mutex::new(Registry {
        slots: HashMap::new(),
    })
});

static GENERATION: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static LOCAL_SLOT: &'static ThreadSlot = Box::leak(Box::new(ThreadSlot::new()));
    static REGISTERED: std::cell::Cell<bool> = std::cell::Cell::new(false);
}

/// Registers the current thread with the RCU runtime.
///
/// Idempotent: calling it twice on the same thread is a no-op after the
/// first call (matching liburcu's own tolerance for redundant registration).
pub fn register_thread() {
    let already = REGISTERED.with(|r| r.replace(true));
    if already {
        return;
    }

    let slot = LOCAL_SLOT.with(|s| *s);
    let id = std::thread::current().id();

    REGISTRY.lock().slots.insert(id, slot);

    log::debug!(
        "registered thread '{}' ({:?}) with the RCU runtime",
        std::thread::current().name().unwrap_or("<unnamed>"),
        id,
    );
}

/// Unregisters the current thread.
///
/// #### Panics
///
/// Panics (fatal contract violation, per SPEC_FULL §7) if called while the
/// thread still holds an open read-section.
pub fn unregister_thread() {
    let depth = LOCAL_SLOT.with(|s| s.depth.load(Ordering::Acquire));
    if depth != 0 {
        log::error!("unregistering thread with an open RCU read-section");
        std::process::abort();
    }

    let id = std::thread::current().id();
    REGISTRY.lock().slots.remove(&id);
    REGISTERED.with(|r| r.set(false));

    log::debug!(
        "unregistered thread '{}' ({:?}) from the RCU runtime",
        std::thread::current().name().unwrap_or("<unnamed>"),
        id,
    );
}

/// Enters a (possibly nested) read-section on the current thread.
pub fn read_lock() {
    LOCAL_SLOT.with(|s| {
        let prev = s.depth.fetch_add(1, Ordering::AcqRel);
        if prev == 0 {
            let gen = GENERATION.load(Ordering::Acquire);
            s.generation.store(gen, Ordering::Release);
        }
    });
}

/// Leaves one level of a read-section on the current thread.
pub fn read_unlock() {
    LOCAL_SLOT.with(|s| {
        let prev = s.depth.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unbalanced rcu_read_unlock");
    });
}

/// Returns the current nesting depth of read-sections on this thread.
pub fn read_depth() -> u64 {
    LOCAL_SLOT.with(|s| s.depth.load(Ordering::Acquire))
}

/// Blocks the caller until every read-section open at the time of the call
/// has ended.
///
/// Must not be called from within a read-section (the public `&mut self`
/// API in [`crate::rcu::context`] enforces this at compile time for the
/// common path; this free function is the primitive it builds on).
pub fn synchronize() {
    crate::safety::assert_not_in_callback("rcu_synchronize");

    let start_gen = GENERATION.fetch_add(1, Ordering::AcqRel) + 1;
    let _ = start_gen;

    let snapshots: Vec<&'static ThreadSlot> = {
        let registry = REGISTRY.lock();
        registry.slots.values().copied().collect()
    };

    let backoff = Backoff::new();
    for slot in snapshots {
        let (_, observed_gen) = slot.snapshot();
        loop {
            let (depth, gen) = slot.snapshot();
            if depth == 0 || gen != observed_gen {
                break;
            }
            backoff.snooze();
        }
    }
}
