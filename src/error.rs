//! The flat error taxonomy returned by every fallible registry operation
//! (SPEC_FULL §7).

use thiserror::Error;

/// The result type returned by every fallible registry operation.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Every way a registry operation can fail.
///
/// Contract violations and internal-consistency failures are not part of
/// this enum: those are treated as fatal (`log::error!` + process abort)
/// outside of test mode, per SPEC_FULL §7. This enum covers domain and
/// resource failures only, the ones a caller is expected to recover from.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A key failed validation (empty/oversize string, reserved numeric zero
    /// outside of node creation).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A path failed validation or addressed something that is not a map.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// `add_unique`/`node_insert` found an existing node under that key.
    #[error("node already exists")]
    NodeExists,

    /// `get`/`update`/`replace` found no node under that key.
    #[error("node not found")]
    NodeNotFound,

    /// `defer_free`/`del` was called on a node already logically removed.
    #[error("node already removed")]
    NodeIsRemoved,

    /// A node's declared `type_key` does not resolve to a `TypeNode` in its
    /// owning map.
    #[error("unresolved type key")]
    UnresolvedType,

    /// A node's `size_bytes` does not match its type's `instance_size_bytes`.
    #[error("size mismatch: node declares {actual} bytes, type expects {expected} bytes")]
    SizeMismatch { expected: u32, actual: u32 },

    /// An intermediate path segment did not address a TSM.
    #[error("path segment is not a map")]
    NotAMap,

    /// The process-wide allocator reported exhaustion.
    #[error("allocation failure")]
    AllocationFailure,
}
