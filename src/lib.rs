//! A thread-safe, lock-free, recursively-typed, self-describing key-value
//! registry built on RCU (Read-Copy-Update) semantics.
//!
//! Many reader threads traverse the registry with no locks; writers publish
//! new node versions atomically and defer reclamation until no reader can
//! still observe the old version. Every node is self-describing: it carries
//! a `type_key` pointing at a [`typesys::TypeNode`] resident in the same
//! map, which supplies the free/validate/print behaviour for instances of
//! that type — including the bootstrap case where the root type is its own
//! type. Any node may itself be a sub-map ([`tsm::TsmNode`]), so the whole
//! registry forms a tree addressable by [`key::Path`]s, rooted at the
//! process-wide singleton ([`gtsm`]).
//!
//! See `SPEC_FULL.md` and `DESIGN.md` in the repository root for the full
//! specification and the grounding ledger for this implementation.

pub mod error;
pub mod gtsm;
pub mod hashmap;
pub mod key;
pub mod node;
pub mod ops;
pub mod rcu;
pub mod safety;
pub mod tsm;
pub mod typesys;
mod utility;

pub use crate::error::{RegistryError, Result};
pub use crate::key::{Key, Path};
pub use crate::node::{NodeHeader, NodeKind};
pub use crate::rcu::{barrier, Context, RcuContext, ReadGuard, RcuSlot};
pub use crate::typesys::{TypeNode, TypeVtable};

#[cfg(test)]
mod integration_test {
    use super::*;
    use crate::tsm::TsmNode;
    use std::sync::Arc;

    fn fresh_root() -> (Context, TsmNode) {
        let ctx = Context::rcu_register().expect("first registration on this thread");
        let tsm = TsmNode {
            map: crate::hashmap::Map::new(),
            path: Path::root(),
        };
        let type_key = crate::typesys::root_type_key();
        tsm.map.add(
            type_key.clone(),
            Arc::new(NodeHeader::new(
                type_key.clone(),
                type_key,
                0,
                NodeKind::Type(TypeNode::new(0, TypeVtable::trivial())),
            )),
        );
        let tsm_type = crate::tsm::tsm_type_node();
        tsm.map.add(tsm_type.key.clone(), Arc::new(tsm_type));
        (ctx, tsm)
    }

    #[test]
    fn recursive_path_scenario() {
        let (ctx, root) = fresh_root();

        let (sub_key, sub_header) =
            TsmNode::create(&root.path, Key::string("sub").unwrap()).unwrap();
        ops::node_insert(&ctx, &root, sub_key.clone(), sub_header).unwrap();
        let sub_handle = ops::node_get(&ctx, &root, &sub_key).unwrap();
        let sub_tsm = sub_handle.kind.as_tsm().unwrap();

        let (inner_key, inner_header) =
            TsmNode::create(&sub_tsm.path, Key::string("inner").unwrap()).unwrap();
        ops::node_insert(&ctx, sub_tsm, inner_key.clone(), inner_header).unwrap();
        let inner_handle = ops::node_get(&ctx, sub_tsm, &inner_key).unwrap();
        let inner_tsm = inner_handle.kind.as_tsm().unwrap();

        // `inner_tsm`'s own seeded root type (`TsmNode::new`, tsm.rs) declares
        // `instance_size_bytes = size_of::<TypeNode>()`; `leaf_header` must
        // declare that same size to satisfy invariant #6.
        let type_node_size = std::mem::size_of::<TypeNode>() as u32;
        let leaf_key = Key::string("leaf").unwrap();
        let leaf_header = NodeHeader::new(
            leaf_key.clone(),
            crate::typesys::root_type_key(),
            type_node_size,
            NodeKind::Type(TypeNode::new(type_node_size, TypeVtable::trivial())),
        );
        ops::node_insert(&ctx, inner_tsm, leaf_key.clone(), leaf_header).unwrap();

        let full_path = [
            Key::string("sub").unwrap(),
            Key::string("inner").unwrap(),
            Key::string("leaf").unwrap(),
        ];
        let found = ops::node_get_by_path(&ctx, &root, &full_path).unwrap();
        assert_eq!(found.key, leaf_key);

        let ancestor = crate::tsm::get_by_path_at_depth(
            &root.map,
            &Path::from_keys(full_path),
            -2,
        )
        .unwrap();
        assert!(ancestor.kind.as_tsm().is_some());
    }

    #[test]
    fn layered_teardown_frees_leaves_before_types() {
        // SPEC_FULL §8 scenario 4: Type T1, Type T2 (unused by any instance),
        // and instance I of T1. Expected order: I and T2 become leaves in
        // the same first epoch (neither is used as anyone's type); T1 only
        // becomes a leaf once I is gone; the root type is collected last,
        // by the force-collect fallback, since it is always "used" as its
        // own type.
        //
        // `gtsm::queue_free` always dispatches a freed node's *type's*
        // vtable.free onto that node's own header (`type_node.vtable.free(&node)`,
        // gtsm.rs) — never the node's own vtable. So a type must be the one
        // instrumented to observe what it frees; recording a node's own
        // payload vtable (as a prior version of this test did for "I")
        // records a callback that is never invoked, since nothing has `I`
        // as its `type_key`.
        let ctx = Context::rcu_register().expect("first registration on this thread");
        let free_order = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));

        let recording_vtable = |order: Arc<std::sync::Mutex<Vec<String>>>| {
            crate::typesys::TypeVtable::new(
                move |header| order.lock().unwrap().push(header.key.to_string()),
                |_| true,
                |_| String::new(),
            )
        };

        let root = TsmNode {
            map: crate::hashmap::Map::new(),
            path: Path::root(),
        };
        let root_type_key = crate::typesys::root_type_key();
        root.map.add(
            root_type_key.clone(),
            Arc::new(NodeHeader::new(
                root_type_key.clone(),
                root_type_key.clone(),
                0,
                NodeKind::Type(TypeNode::new(0, recording_vtable(free_order.clone()))),
            )),
        );

        let t1_key = Key::string("T1").unwrap();
        let t1 = NodeHeader::new(
            t1_key.clone(),
            root_type_key.clone(),
            0,
            NodeKind::Type(TypeNode::new(0, recording_vtable(free_order.clone()))),
        );
        ops::node_insert(&ctx, &root, t1_key.clone(), t1).unwrap();

        let t2_key = Key::string("T2").unwrap();
        let t2 = NodeHeader::new(
            t2_key.clone(),
            root_type_key.clone(),
            0,
            NodeKind::Type(TypeNode::new(0, recording_vtable(free_order.clone()))),
        );
        ops::node_insert(&ctx, &root, t2_key.clone(), t2).unwrap();

        let instance_key = Key::uint(1);
        let instance = NodeHeader::new(
            instance_key.clone(),
            t1_key.clone(),
            0,
            NodeKind::Type(TypeNode::new(0, TypeVtable::trivial())),
        );
        ops::node_insert(&ctx, &root, instance_key.clone(), instance).unwrap();

        gtsm::teardown_map_epochs(&root.map);
        crate::rcu::barrier();

        let order = free_order.lock().unwrap();
        let i_pos = order
            .iter()
            .position(|k| *k == instance_key.to_string())
            .unwrap();
        let t2_pos = order.iter().position(|k| *k == t2_key.to_string()).unwrap();
        let t1_pos = order.iter().position(|k| *k == t1_key.to_string()).unwrap();
        assert!(i_pos < t1_pos, "instance must be freed before its own type");
        assert!(
            t2_pos < t1_pos,
            "an unused type must be freed before a type still backing an instance"
        );
    }

    #[test]
    fn tearing_down_a_parent_runs_nested_sub_tsm_free_callbacks() {
        let (ctx, root) = fresh_root();

        let (sub_key, sub_header) =
            TsmNode::create(&root.path, Key::string("sub").unwrap()).unwrap();
        ops::node_insert(&ctx, &root, sub_key.clone(), sub_header).unwrap();
        let sub_handle = ops::node_get(&ctx, &root, &sub_key).unwrap();
        let sub_tsm = sub_handle.kind.as_tsm().unwrap();

        let freed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let freed_in_callback = freed.clone();
        let widget_type_key = Key::string("widget").unwrap();
        // A sub-TSM seeds its own root type with `instance_size_bytes =
        // size_of::<TypeNode>()` (see `TsmNode::new`), so any type node
        // published directly under it (like this one) must declare that
        // same size to satisfy invariant #6.
        let type_node_size = std::mem::size_of::<TypeNode>() as u32;
        let widget_type = NodeHeader::new(
            widget_type_key.clone(),
            crate::typesys::root_type_key(),
            type_node_size,
            NodeKind::Type(TypeNode::new(
                0,
                crate::typesys::TypeVtable::new(
                    move |_header| freed_in_callback.store(true, std::sync::atomic::Ordering::SeqCst),
                    |_| true,
                    |_| String::new(),
                ),
            )),
        );
        ops::node_insert(&ctx, sub_tsm, widget_type_key.clone(), widget_type).unwrap();

        let widget_key = Key::uint(1);
        let widget = NodeHeader::new(widget_key.clone(), widget_type_key, 0, NodeKind::Type(TypeNode::new(0, TypeVtable::trivial())));
        ops::node_insert(&ctx, sub_tsm, widget_key, widget).unwrap();

        drop(sub_handle);

        // Tearing down the *root* (not `sub` directly) must recursively
        // tear down `sub`'s own map and run the nested widget's free
        // callback — this only works if `sub`'s published `type_key`
        // resolves to the TSM type (whose vtable recurses), not the plain
        // root type (whose vtable is a no-op).
        gtsm::teardown_map_epochs(&root.map);
        crate::rcu::barrier();

        assert!(
            freed.load(std::sync::atomic::Ordering::SeqCst),
            "nested sub-TSM instance must be reclaimed when its containing TSM is torn down"
        );
    }
}
