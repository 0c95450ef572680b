//! The global root registry (SPEC_FULL §4.H), grounded in
//! `original_source/include/gtsm.h`.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{RegistryError, Result};
use crate::hashmap::{Map, NodeHandle};
use crate::key::Key;
use crate::rcu::callback::DeferredCallback;
use crate::rcu::context::Context;
use crate::rcu::context::RcuContext;
use crate::typesys::{root_type_key, TypeNode};

static GTSM: OnceCell<Map> = OnceCell::new();

/// Initializes the global root. Idempotent: a second call is a no-op.
///
/// Bootstraps the self-referential root type (`"base_type"`) and the TSM
/// type node shared by every recursive sub-map, exactly as
/// `_gd_init_fundamental_type` bootstraps `base_type` in the original
/// source before any other node can be created.
pub fn gtsm_init() {
    GTSM.get_or_init(|| {
        let map = Map::new();

        let root_type = TypeNode::bootstrap_root();
        let root_key = root_type_key();
        map.add(root_key, Arc::new(root_type));

        let tsm_type = crate::tsm::tsm_type_node();
        map.add(tsm_type.key.clone(), Arc::new(tsm_type));

        map
    });
}

/// Returns the global root map, or an error if [`gtsm_init`] was never
/// called.
pub fn gtsm_get() -> Result<&'static Map> {
    GTSM.get()
        .ok_or_else(|| RegistryError::InvalidPath("GTSM is not initialized".into()))
}

/// The count of live top-level nodes.
pub fn gtsm_nodes_count() -> Result<usize> {
    Ok(gtsm_get()?.count())
}

/// Tears the global root down, layer by layer, then drains every queued
/// reclamation.
///
/// The original source's `gtsm_free` carries a documented gap: it "should
/// set GTSM to NULL... but that is not implemented yet." `std::sync::OnceCell`
/// offers no reset primitive either, so this port carries the same
/// limitation deliberately rather than inventing an unsound workaround
/// (e.g. transmuting around `OnceCell`); after this call the root map is
/// empty (`gtsm_nodes_count() == Ok(0)`) but the process-wide handle
/// remains set.
pub fn gtsm_free(ctx: &Context) {
    let _ = ctx;
    let Ok(map) = gtsm_get() else {
        return;
    };

    teardown_map_epochs(map);
    crate::rcu::cleanup::barrier();
}

/// The layered topological free: frees nodes unused as anyone's type first,
/// looping until the map is empty, with a force-collect fallback once no
/// more leaves exist (SPEC_FULL §4.H).
///
/// Does not call `barrier()` itself: when invoked recursively from a TSM's
/// own free-callback (already running on the cleanup thread), calling
/// `barrier()` there would deadlock against the very callback loop it runs
/// inside of. Only the top-level [`gtsm_free`] calls `barrier()`, once,
/// after this function returns (the Open Question resolution recorded in
/// DESIGN.md).
pub(crate) fn teardown_map_epochs(map: &Map) {
    loop {
        let snapshot = map.iter_snapshot();
        if snapshot.is_empty() {
            break;
        }

        let used_as_type: HashSet<Key> = snapshot.iter().map(|n| n.type_key.clone()).collect();

        let mut leaves: Vec<NodeHandle> = snapshot
            .iter()
            .filter(|n| !used_as_type.contains(&n.key))
            .cloned()
            .collect();

        if leaves.is_empty() {
            // Every remaining node is used as somebody's type; this is the
            // final pass that collapses the type graph itself.
            leaves = snapshot;
        }

        for node in leaves {
            // Resolve the type *before* removing the node from the map: a
            // self-referential type (the root type, on the final pass that
            // force-collects it alongside itself) would otherwise find its
            // own entry already gone and silently skip its free callback.
            let type_node = map.lookup(&node.type_key);
            if map.del(&node.key).is_err() {
                continue;
            }
            queue_free(node, type_node);
        }
    }
}

fn queue_free(node: NodeHandle, type_node: Option<NodeHandle>) {
    crate::rcu::cleanup::cleanup_send(DeferredCallback::new(move || {
        if let Some(type_node) = type_node {
            if let Some(type_node) = type_node.kind.as_type() {
                (type_node.vtable.free)(&node);
            }
        }
    }));
}
