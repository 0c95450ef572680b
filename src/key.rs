//! The [`Key`] tagged union and the [`Path`] it composes into.
//!
//! Grounded on `original_source/include/global_data/core.h`'s
//! `union gd_key { uint64_t number; char* string; }`, ported as a Rust enum
//! so the tag and payload can never disagree.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{RegistryError, Result};

const MAX_STRING_KEY_LEN: usize = 63;

/// A process-wide counter for `Key::fresh_uint()` (SPEC_FULL §4.D: "a fresh
/// unsigned key is produced by atomically incrementing a process-wide
/// counter initialised to 1").
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A registry key: either an unsigned integer or an owned string.
///
/// `Uint(0)` is reserved to mean "assign me one" and is only a legal
/// argument to node-creation entry points that allocate a fresh id; it is
/// never a legal key of a *published* node.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Key {
    Uint(u64),
    Str(String),
}

impl Key {
    /// Creates a numeric key. `0` is accepted here and resolved to a fresh
    /// id by node-creation call sites; it is rejected by [`Key::is_published_valid`].
    pub fn uint(value: u64) -> Self {
        Key::Uint(value)
    }

    /// Creates a string key, validating non-empty and `<= 63` bytes.
    pub fn string(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(RegistryError::InvalidKey("empty string key".into()));
        }
        if value.len() > MAX_STRING_KEY_LEN {
            return Err(RegistryError::InvalidKey(format!(
                "string key exceeds {MAX_STRING_KEY_LEN} bytes"
            )));
        }
        Ok(Key::Str(value))
    }

    /// Atomically allocates a fresh, never-zero numeric key.
    pub fn fresh_uint() -> Self {
        Key::Uint(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns whether this key may be used as the key of a node actually
    /// published into a map (i.e. not the "assign me one" sentinel).
    pub fn is_published_valid(&self) -> bool {
        match self {
            Key::Uint(0) => false,
            Key::Uint(_) => true,
            Key::Str(s) => !s.is_empty() && s.len() <= MAX_STRING_KEY_LEN,
        }
    }

    pub fn is_assign_sentinel(&self) -> bool {
        matches!(self, Key::Uint(0))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Uint(n) => write!(f, "{n}"),
            Key::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// An ordered sequence of keys describing a route from the global root to a
/// node. An empty path denotes the root itself.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Path(Vec<Key>);

impl Path {
    pub fn root() -> Self {
        Path(Vec::new())
    }

    pub fn from_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        Path(keys.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.0.iter().all(Key::is_published_valid)
    }

    /// Appends `key` as a child path.
    pub fn joined(&self, key: Key) -> Self {
        let mut keys = self.0.clone();
        keys.push(key);
        Path(keys)
    }

    /// Returns a key reference at `idx`, where negative indices count from
    /// the end (`-1` is the last key).
    pub fn get(&self, idx: isize) -> Option<&Key> {
        let resolved = Self::resolve_index(self.0.len(), idx)?;
        self.0.get(resolved)
    }

    /// Inserts `key` at `idx` (negative counts from the end; `-1` inserts
    /// before the last element, matching SPEC_FULL §4.D semantics for
    /// `path_insert_key`).
    pub fn insert(&mut self, idx: isize, key: Key) -> Result<()> {
        let resolved = Self::resolve_insert_index(self.0.len(), idx)
            .ok_or_else(|| RegistryError::InvalidPath(format!("index {idx} out of range")))?;
        self.0.insert(resolved, key);
        Ok(())
    }

    /// Removes and returns the key at `idx` (negative counts from the end).
    pub fn remove(&mut self, idx: isize) -> Result<Key> {
        let resolved = Self::resolve_index(self.0.len(), idx)
            .ok_or_else(|| RegistryError::InvalidPath(format!("index {idx} out of range")))?;
        Ok(self.0.remove(resolved))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.0.iter()
    }

    /// Returns the path prefix addressing the ancestor `depth` steps up
    /// from the full path, where a non-negative `depth` is an absolute
    /// prefix length from the root and a negative `depth` counts backward
    /// from the full path itself: `-1` is the full path, `-2` its parent,
    /// `-3` its grandparent, and so on (SPEC_FULL §4.G / §8).
    pub fn at_depth(&self, depth: isize) -> Option<&[Key]> {
        let len = self.0.len() as isize;
        let cut = if depth >= 0 { depth } else { len + depth + 1 };
        if cut < 0 || cut > len {
            return None;
        }
        self.0.get(..cut as usize)
    }

    fn resolve_index(len: usize, idx: isize) -> Option<usize> {
        if idx >= 0 {
            let idx = idx as usize;
            (idx < len).then_some(idx)
        } else {
            len.checked_sub(idx.unsigned_abs())
        }
    }

    fn resolve_insert_index(len: usize, idx: isize) -> Option<usize> {
        if idx >= 0 {
            let idx = idx as usize;
            (idx <= len).then_some(idx)
        } else {
            len.checked_sub(idx.unsigned_abs() - 1)
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}
