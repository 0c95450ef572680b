//! Type nodes: the vtable bound to a type key.
//!
//! Grounded on `original_source/include/global_data/type.h`'s
//! `struct gd_type_node { ... fn_free_node, fn_free_node_callback, fn_is_valid, type_size }`.
//! The root type is bootstrapped as its own type (SPEC_FULL §9 "Cyclic type
//! graph").

use std::sync::Arc;

use crate::key::Key;
use crate::node::NodeHeader;

/// The reserved key of the self-referential root type.
pub const ROOT_TYPE_KEY_NAME: &str = "base_type";

pub fn root_type_key() -> Key {
    Key::Str(ROOT_TYPE_KEY_NAME.to_string())
}

/// Per-type behaviour, type-erased behind boxed closures so callers can
/// register their own types without the crate knowing their concrete Rust
/// type ahead of time (SPEC_FULL §9, the trait-object branch of the
/// dispatch-strategy either/or).
#[derive(Clone)]
pub struct TypeVtable {
    /// Releases any type-specific resources held by an instance's payload
    /// before its `NodeHeader` itself is dropped.
    pub free: Arc<dyn Fn(&NodeHeader) + Send + Sync>,
    /// Checks an instance's invariants in the context of its owning map.
    pub is_valid: Arc<dyn Fn(&NodeHeader) -> bool + Send + Sync>,
    /// Produces a one-line diagnostic description of an instance.
    pub print_info: Arc<dyn Fn(&NodeHeader) -> String + Send + Sync>,
}

impl TypeVtable {
    pub fn new(
        free: impl Fn(&NodeHeader) + Send + Sync + 'static,
        is_valid: impl Fn(&NodeHeader) -> bool + Send + Sync + 'static,
        print_info: impl Fn(&NodeHeader) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            free: Arc::new(free),
            is_valid: Arc::new(is_valid),
            print_info: Arc::new(print_info),
        }
    }

    /// A vtable with trivial free/validate/print behaviour, suitable for
    /// types whose payload needs no teardown beyond dropping the header
    /// (e.g. plain-old-data user types).
    pub fn trivial() -> Self {
        Self::new(
            |_| {},
            |_| true,
            |header| format!("<node key={:?}>", header.key),
        )
    }
}

/// A type node: binds an instance size and a [`TypeVtable`] to a type key.
pub struct TypeNode {
    pub instance_size_bytes: u32,
    pub vtable: TypeVtable,
}

impl TypeNode {
    pub fn new(instance_size_bytes: u32, vtable: TypeVtable) -> Self {
        Self {
            instance_size_bytes,
            vtable,
        }
    }

    /// Builds the bootstrap root type: self-referential (`type_key` equals
    /// its own key), zero-sized instance footprint (it never holds an
    /// instance payload of its own beyond the header).
    pub fn bootstrap_root() -> NodeHeader {
        let key = root_type_key();
        let size = std::mem::size_of::<TypeNode>() as u32;
        NodeHeader::new(
            key.clone(),
            key,
            size,
            crate::node::NodeKind::Type(TypeNode::new(size, TypeVtable::trivial())),
        )
    }
}
