//! The recursive map node (SPEC_FULL §4.G), grounded in
//! `original_source/include/tsm.h`'s overview of a node whose payload is
//! itself a map plus a path from the global root.

use std::sync::Arc;

use crate::error::{RegistryError, Result};
use crate::hashmap::{Map, NodeHandle};
use crate::key::{Key, Path};
use crate::node::{NodeHeader, NodeKind};
use crate::typesys::{root_type_key, TypeNode, TypeVtable};

/// A node whose payload is a map of child nodes plus the path that
/// addresses it from the global root.
pub struct TsmNode {
    pub map: Map,
    pub path: Path,
}

impl TsmNode {
    /// Builds an empty sub-map seeded with its own local copy of the root
    /// type and the TSM type, so that any node subsequently inserted into
    /// it (whose `type_key` must resolve *in the same map*, SPEC_FULL §3)
    /// can be a plain type or another nested TSM without first requiring a
    /// separate type-registration step.
    pub(crate) fn new(path: Path) -> Self {
        let map = Map::new();
        let root_key = root_type_key();
        map.add(
            root_key.clone(),
            Arc::new(NodeHeader::new(
                root_key.clone(),
                root_key,
                std::mem::size_of::<TypeNode>() as u32,
                NodeKind::Type(TypeNode::new(
                    std::mem::size_of::<TypeNode>() as u32,
                    TypeVtable::trivial(),
                )),
            )),
        );
        let tsm_type = tsm_type_node();
        map.add(tsm_type.key.clone(), Arc::new(tsm_type));

        Self { map, path }
    }

    /// Builds (but does not publish) a TSM node as a child of `parent_path`
    /// under `key`. The caller publishes it via `ops::node_insert` on the
    /// parent.
    ///
    /// `type_key` must resolve to a [`TypeNode`] inside the *parent* TSM
    /// (SPEC_FULL invariant #2). Every TSM seeds its own map with
    /// [`tsm_type_key`] (see [`TsmNode::new`]), so any child created under it
    /// — including the global root — can always resolve this reference in
    /// its immediate parent.
    pub fn create(parent_path: &Path, key: Key) -> Result<(Key, NodeHeader)> {
        if !key.is_published_valid() {
            return Err(RegistryError::InvalidKey(format!("{key}")));
        }

        let path = parent_path.joined(key.clone());
        let size = std::mem::size_of::<TsmNode>() as u32;
        let header = NodeHeader::new(
            key.clone(),
            tsm_type_key(),
            size,
            NodeKind::Tsm(TsmNode::new(path)),
        );
        Ok((key, header))
    }

    /// Looks up a child node by key. Requires the caller hold an open
    /// read-section for the returned handle's lifetime (SPEC_FULL §4.C/§4.I).
    ///
    /// Unlike [`crate::ops::node_get`], this bypasses the `Context`-typed
    /// entry point, so the discipline can't be proven by the borrow checker
    /// here; the safety wrapper's runtime check covers the gap.
    pub fn get(&self, key: &Key) -> Option<NodeHandle> {
        crate::safety::assert_registered("tsm::get");
        crate::safety::assert_in_read_section("tsm::get");
        self.map.lookup(key)
    }
}

/// Walks `path` from `root_header`, requiring every intermediate segment to
/// itself be a TSM (SPEC_FULL §4.G `node_get_by_path`).
pub fn get_by_path(root: &Map, path: &[Key]) -> Result<NodeHandle> {
    let mut keys = path.iter();
    let Some(first) = keys.next() else {
        return Err(RegistryError::InvalidPath("empty path has no node".into()));
    };

    let mut current = root.lookup(first).ok_or(RegistryError::NodeNotFound)?;

    for key in keys {
        let next = {
            let tsm = current
                .kind
                .as_tsm()
                .ok_or(RegistryError::NotAMap)?;
            tsm.map.lookup(key).ok_or(RegistryError::NodeNotFound)?
        };
        current = next;
    }

    Ok(current)
}

/// Same as [`get_by_path`] but addresses an ancestor of the full path
/// instead of the full path itself; see [`Path::at_depth`] for the depth
/// convention.
pub fn get_by_path_at_depth(root: &Map, path: &Path, depth: isize) -> Result<NodeHandle> {
    let truncated = path
        .at_depth(depth)
        .ok_or_else(|| RegistryError::InvalidPath(format!("depth {depth} out of range")))?;
    get_by_path(root, truncated)
}

/// The vtable shared by every TSM node, including the global root: freeing
/// a TSM recursively tears down its own sub-map first (SPEC_FULL §4.H "TSM
/// children are themselves nodes; their free-callback recursively tears
/// down their own map before freeing their header").
pub fn tsm_vtable() -> TypeVtable {
    TypeVtable::new(
        |header| {
            if let NodeKind::Tsm(tsm) = &header.kind {
                crate::gtsm::teardown_map_epochs(&tsm.map);
            }
        },
        |header| matches!(header.kind, NodeKind::Tsm(_)),
        |header| format!("<tsm path={}>", header.key),
    )
}

/// The reserved key of the TSM type node every recursive map seeds itself
/// with (see [`TsmNode::new`]), distinct from [`root_type_key`].
pub fn tsm_type_key() -> Key {
    Key::Str("tsm_type".to_string())
}

/// Creates (but does not publish) the TSM type node used by every recursive
/// map in the registry.
pub fn tsm_type_node() -> NodeHeader {
    NodeHeader::new(
        tsm_type_key(),
        root_type_key(),
        std::mem::size_of::<TypeNode>() as u32,
        NodeKind::Type(TypeNode::new(
            std::mem::size_of::<TsmNode>() as u32,
            tsm_vtable(),
        )),
    )
}

mod asserts {
    use static_assertions::assert_impl_all;

    use crate::hashmap::Map;
    use crate::node::NodeHeader;

    assert_impl_all!(Map: Send, Sync);
    assert_impl_all!(NodeHeader: Send, Sync);
}
