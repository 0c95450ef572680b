//! End-to-end concurrency scenarios across real OS threads, the way the
//! teacher's own `examples/hashmap.rs` races publisher/consumer threads
//! against a shared map via `std::thread::scope`. Unlike that fire-and-forget
//! race, these scenarios need precise ordering between threads, so they use
//! `std::sync::Barrier` for lock-step rendezvous instead of a free-for-all.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use registry::hashmap::Map;
use registry::typesys::root_type_key;
use registry::{Context, Key, NodeHeader, NodeKind, Path, RcuContext, TypeNode, TypeVtable};

fn fresh_tsm() -> registry::tsm::TsmNode {
    let tsm = registry::tsm::TsmNode {
        map: Map::new(),
        path: Path::root(),
    };
    let root_key = root_type_key();
    tsm.map.add(
        root_key.clone(),
        Arc::new(NodeHeader::new(
            root_key.clone(),
            root_key,
            0,
            NodeKind::Type(TypeNode::new(0, TypeVtable::trivial())),
        )),
    );
    tsm
}

fn counter_type_key() -> Key {
    Key::string("counter").unwrap()
}

/// SPEC_FULL §8 scenario 2: two threads race `add_unique` on the same key;
/// exactly one must win, and the map must end up with exactly one instance
/// under that key.
#[test]
fn concurrent_add_unique_has_exactly_one_winner() {
    let tsm = fresh_tsm();
    let key = Key::uint(7);
    let start = Barrier::new(2);
    let successes = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..2 {
            scope.spawn(|| {
                let ctx = Context::rcu_register().expect("thread registers exactly once");
                let node = NodeHeader::new(
                    key.clone(),
                    root_type_key(),
                    0,
                    NodeKind::Type(TypeNode::new(0, TypeVtable::trivial())),
                );

                start.wait();
                if registry::ops::node_insert(&ctx, &tsm, key.clone(), node).is_ok() {
                    successes.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert!(registry::ops::iterate(
        &Context::rcu_register().expect("main thread registers exactly once"),
        &tsm
    )
    .iter()
    .filter(|n| n.key == key)
    .count()
        == 1);
}

/// SPEC_FULL §8 scenario 5: thread A opens a read-section and resolves a
/// node; thread B concurrently `defer_free`s that same node and returns;
/// thread A, still inside its original read-section, must still observe the
/// node's published payload, and the type's free-callback must not yet have
/// run (the grace period cannot end while A's section is open). Only after A
/// leaves its section (and a global barrier drains the queued free) does the
/// callback run and a fresh lookup report the node gone.
#[test]
fn reader_observes_value_across_concurrent_free() {
    let tsm = fresh_tsm();
    let key = Key::uint(42);
    let freed = Arc::new(std::sync::atomic::AtomicBool::new(false));

    {
        let freed = freed.clone();
        tsm.map.add(
            counter_type_key(),
            Arc::new(NodeHeader::new(
                counter_type_key(),
                root_type_key(),
                0,
                NodeKind::Type(TypeNode::new(
                    std::mem::size_of::<i64>() as u32,
                    TypeVtable::new(
                        move |_header| freed.store(true, std::sync::atomic::Ordering::SeqCst),
                        |_| true,
                        |_| String::new(),
                    ),
                )),
            )),
        );

        let ctx = Context::rcu_register().expect("setup thread registers exactly once");
        let node = NodeHeader::new(
            key.clone(),
            counter_type_key(),
            std::mem::size_of::<i64>() as u32,
            NodeKind::User(Box::new(100i64)),
        );
        registry::ops::node_insert(&ctx, &tsm, key.clone(), node).unwrap();
    }

    let reader_has_handle = Barrier::new(2);
    let writer_has_freed = Barrier::new(2);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let ctx = Context::rcu_register().expect("reader thread registers exactly once");
            let guard = ctx.rcu_read_lock();
            let node = tsm.get(&key).expect("node resolvable while read-section is open");
            reader_has_handle.wait();

            // Thread B's `defer_free` call itself has already returned by the
            // time both threads reach this barrier, but its callback is only
            // queued, not run — nothing has called `barrier()` yet, and our
            // own still-open read-section is exactly why a node handle taken
            // before the `del` stays valid for us to read below.
            writer_has_freed.wait();

            assert!(
                !freed.load(std::sync::atomic::Ordering::SeqCst),
                "free callback must not have run before any barrier() call"
            );

            let value = *node
                .kind
                .as_user()
                .and_then(|payload| payload.downcast_ref::<i64>())
                .expect("payload is still the live i64 published at insert time");
            assert_eq!(value, 100);

            drop(guard);
        });

        scope.spawn(|| {
            let ctx = Context::rcu_register().expect("writer thread registers exactly once");
            reader_has_handle.wait();
            registry::ops::node_defer_free(&ctx, &tsm, &key).unwrap();
            writer_has_freed.wait();
        });
    });

    registry::barrier();
    assert!(tsm.map.lookup(&key).is_none());
    assert!(freed.load(std::sync::atomic::Ordering::SeqCst));
}
