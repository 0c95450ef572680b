//! The operations surface (SPEC_FULL §4.I): the only way external code
//! touches a TSM's contents, grounded in
//! `original_source/include/global_data/core.h`'s `gd_*` function list.

use std::sync::Arc;

use crate::error::{RegistryError, Result};
use crate::hashmap::NodeHandle;
use crate::key::Key;
use crate::node::NodeHeader;
use crate::rcu::context::{Context, RcuContext};
use crate::tsm::TsmNode;

/// Checks SPEC_FULL invariant #2: a node's `type_key` must resolve to a
/// `TypeNode` in the same map it is published into. The bootstrap root
/// type (self-referential) and a brand-new sub-map's own seeded root/TSM
/// types (see `TsmNode::new`) are published directly via `Map::add`,
/// bypassing this check, exactly as the original source relaxes safety
/// checks only for that one bootstrap case (SPEC_FULL §4.F/§9).
fn check_type_resolves(tsm: &TsmNode, type_key: &Key) -> Result<()> {
    match tsm.map.lookup(type_key) {
        Some(type_node) if type_node.kind.as_type().is_some() => Ok(()),
        _ => Err(RegistryError::UnresolvedType),
    }
}

/// Checks SPEC_FULL invariant #6: a node's `size_bytes` must equal its
/// type's `instance_size_bytes`.
fn check_size_matches(tsm: &TsmNode, node: &NodeHeader) -> Result<()> {
    let type_node = tsm
        .map
        .lookup(&node.type_key)
        .ok_or(RegistryError::UnresolvedType)?;
    let type_node = type_node
        .kind
        .as_type()
        .ok_or(RegistryError::UnresolvedType)?;

    if type_node.instance_size_bytes != node.size_bytes {
        return Err(RegistryError::SizeMismatch {
            expected: type_node.instance_size_bytes,
            actual: node.size_bytes,
        });
    }
    Ok(())
}

/// Inserts `node` under `key` into `tsm`. Fails with
/// [`RegistryError::NodeExists`] on a duplicate key, or
/// [`RegistryError::UnresolvedType`] if `node.type_key` does not resolve to
/// a type node already present in `tsm`.
pub fn node_insert(ctx: &Context, tsm: &TsmNode, key: Key, node: NodeHeader) -> Result<NodeHandle> {
    if !key.is_published_valid() {
        return Err(RegistryError::InvalidKey(format!("{key}")));
    }

    let _guard = ctx.rcu_read_lock();
    check_type_resolves(tsm, &node.type_key)?;
    check_size_matches(tsm, &node)?;

    tsm.map
        .add_unique(key, Arc::new(node))
        .map_err(|_| RegistryError::NodeExists)
}

/// Looks up a node by key. The returned handle is valid for as long as it
/// is held (the underlying storage is refcounted), but callers should still
/// read it from within a read-section per the specification's discipline.
pub fn node_get(ctx: &Context, tsm: &TsmNode, key: &Key) -> Result<NodeHandle> {
    let _guard = ctx.rcu_read_lock();
    tsm.map.lookup(key).ok_or(RegistryError::NodeNotFound)
}

/// Looks up a node anywhere under the registry by its full path from the
/// root TSM's own position.
pub fn node_get_by_path(ctx: &Context, tsm: &TsmNode, path: &[Key]) -> Result<NodeHandle> {
    let _guard = ctx.rcu_read_lock();
    crate::tsm::get_by_path(&tsm.map, path)
}

/// Replaces the node under `new_node`'s key. Fails if absent, if
/// `new_node.type_key` does not resolve, or if its declared size disagrees
/// with its type's `instance_size_bytes` (SPEC_FULL invariant #6).
pub fn node_update(ctx: &Context, tsm: &TsmNode, key: &Key, new_node: NodeHeader) -> Result<NodeHandle> {
    let _guard = ctx.rcu_read_lock();
    check_type_resolves(tsm, &new_node.type_key)?;
    check_size_matches(tsm, &new_node)?;

    let old = tsm.map.replace(key, Arc::new(new_node))?;
    let old_type_key = old.type_key.clone();
    let old_for_free = old.clone();
    let type_node = tsm.map.lookup(&old_type_key);
    ctx.rcu_call(move || {
        if let Some(type_node) = type_node {
            if let Some(type_node) = type_node.kind.as_type() {
                (type_node.vtable.free)(&old_for_free);
            }
        }
    });
    Ok(old)
}

/// Update-if-present, else insert — a single atomic operation built
/// directly on the hash map's `add_replace` primitive (SPEC_FULL §4.C),
/// rather than composing separate update/insert calls that would need the
/// node constructed twice.
pub fn node_upsert(ctx: &Context, tsm: &TsmNode, key: Key, new_node: NodeHeader) -> Result<NodeHandle> {
    if !key.is_published_valid() {
        return Err(RegistryError::InvalidKey(format!("{key}")));
    }

    let _guard = ctx.rcu_read_lock();
    check_type_resolves(tsm, &new_node.type_key)?;
    check_size_matches(tsm, &new_node)?;

    let new_handle = Arc::new(new_node);
    let displaced = tsm.map.add_replace(key, new_handle.clone());

    if let Some(old) = displaced {
        let type_node = tsm.map.lookup(&old.type_key);
        ctx.rcu_call(move || {
            if let Some(type_node) = type_node {
                if let Some(type_node) = type_node.kind.as_type() {
                    (type_node.vtable.free)(&old);
                }
            }
        });
    }

    Ok(new_handle)
}

/// Removes `key` from `tsm` and queues its type's free callback. Safe
/// against concurrent double-free.
pub fn node_defer_free(ctx: &Context, tsm: &TsmNode, key: &Key) -> Result<()> {
    let _guard = ctx.rcu_read_lock();
    let removed = tsm.map.del(key)?;
    let type_node = tsm.map.lookup(&removed.type_key);
    ctx.rcu_call(move || {
        if let Some(type_node) = type_node {
            if let Some(type_node) = type_node.kind.as_type() {
                (type_node.vtable.free)(&removed);
            }
        }
    });
    Ok(())
}

/// Composite validity check: the header's own invariants, then the type's
/// `is_valid`.
pub fn node_is_valid(ctx: &Context, tsm: &TsmNode, node: &NodeHandle) -> bool {
    let _guard = ctx.rcu_read_lock();
    if !node.key.is_published_valid() {
        return false;
    }
    match tsm.map.lookup(&node.type_key) {
        Some(type_node) => match type_node.kind.as_type() {
            Some(type_node) => (type_node.vtable.is_valid)(node),
            None => false,
        },
        None => false,
    }
}

/// Approximate node count (exact only under external stop-the-world).
pub fn nodes_count(tsm: &TsmNode) -> usize {
    tsm.map.count()
}

/// Diagnostic one-line description of `node`, delegated to its type's
/// `print_info` (SPEC_FULL §2 Operations Surface row I, "print").
pub fn node_print(ctx: &Context, tsm: &TsmNode, node: &NodeHandle) -> Result<String> {
    let _guard = ctx.rcu_read_lock();
    let type_node = tsm
        .map
        .lookup(&node.type_key)
        .ok_or(RegistryError::UnresolvedType)?;
    let type_node = type_node
        .kind
        .as_type()
        .ok_or(RegistryError::UnresolvedType)?;
    Ok((type_node.vtable.print_info)(node))
}

/// An unordered snapshot iterator over every live node in `tsm`.
pub fn iterate(ctx: &Context, tsm: &TsmNode) -> Vec<NodeHandle> {
    let _guard = ctx.rcu_read_lock();
    tsm.map.iter_snapshot()
}
