//! The common node header every entity embeds, and the closed enum of node
//! payload kinds.
//!
//! Grounded on `original_source/include/global_data/core.h`'s
//! `struct gd_base_node`. The payload itself follows SPEC_FULL §9's "do
//! both" resolution of the Design Notes' dispatch-strategy either/or: a
//! closed enum distinguishes the crate's own `Type`/`Tsm` kinds from opaque
//! user payloads erased behind `Box<dyn Any + Send + Sync>`.

use std::any::Any;
use std::fmt;

use crate::key::Key;
use crate::tsm::TsmNode;
use crate::typesys::TypeNode;

/// The payload carried by a [`NodeHeader`].
pub enum NodeKind {
    /// A type node: binds an instance size and a vtable to a type key.
    Type(TypeNode),
    /// A recursive sub-map.
    Tsm(TsmNode),
    /// An opaque, caller-registered payload.
    User(Box<dyn Any + Send + Sync>),
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Type(_) => f.write_str("NodeKind::Type"),
            NodeKind::Tsm(_) => f.write_str("NodeKind::Tsm"),
            NodeKind::User(_) => f.write_str("NodeKind::User"),
        }
    }
}

impl NodeKind {
    pub fn as_type(&self) -> Option<&TypeNode> {
        match self {
            NodeKind::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tsm(&self) -> Option<&TsmNode> {
        match self {
            NodeKind::Tsm(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<&(dyn Any + Send + Sync)> {
        match self {
            NodeKind::User(b) => Some(b.as_ref()),
            _ => None,
        }
    }

    /// The logical size (in bytes) this payload declares, checked against
    /// its type's `instance_size_bytes` (SPEC_FULL invariant #6). Built-in
    /// kinds report their own native size; user payloads are validated by
    /// the caller at creation time and simply echo the declared size.
    pub fn declared_size(&self, declared: u32) -> u32 {
        match self {
            NodeKind::Type(_) => std::mem::size_of::<TypeNode>() as u32,
            NodeKind::Tsm(_) => std::mem::size_of::<TsmNode>() as u32,
            NodeKind::User(_) => declared,
        }
    }
}

/// The header every registry entity embeds (SPEC_FULL §3 "Base Node
/// header").
pub struct NodeHeader {
    pub key: Key,
    pub type_key: Key,
    pub size_bytes: u32,
    pub kind: NodeKind,
}

impl NodeHeader {
    pub fn new(key: Key, type_key: Key, size_bytes: u32, kind: NodeKind) -> Self {
        Self {
            key,
            type_key,
            size_bytes,
            kind,
        }
    }
}

impl fmt::Debug for NodeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHeader")
            .field("key", &self.key)
            .field("type_key", &self.type_key)
            .field("size_bytes", &self.size_bytes)
            .field("kind", &self.kind)
            .finish()
    }
}
