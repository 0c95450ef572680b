//! The lock-free(-ish) hash map primitive (SPEC_FULL §4.C).
//!
//! Buckets are chains of tombstoned entries. Structural bucket-array
//! resizing is the only operation that takes an exclusive lock across the
//! whole table; per-bucket chain mutation (insert/delete) takes a lock
//! scoped to a single bucket, so unrelated keys never contend. This is the
//! same striping strategy the wider ecosystem uses for concurrent maps
//! (e.g. `dashmap`) in place of hand-rolled atomic-pointer CAS chains, which
//! this port cannot validate without compiling. Deletion is logical
//! (tombstone) so a concurrent reader that already captured a node's `Arc`
//! keeps a valid reference regardless of a later `del` (SPEC_FULL
//! invariant #4); physical removal happens only during `resize`.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{RegistryError, Result};
use crate::key::Key;
use crate::node::NodeHeader;

const DEFAULT_BUCKET_COUNT: usize = 16;
const MAX_LOAD_FACTOR: usize = 4;

struct Entry {
    key: Key,
    node: Arc<NodeHeader>,
    deleted: AtomicBool,
}

impl Entry {
    fn is_live(&self) -> bool {
        !self.deleted.load(Ordering::Acquire)
    }
}

struct Bucket {
    entries: RwLock<Vec<Arc<Entry>>>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

fn hash_key(key: &Key) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// A handle to a node published in a [`Map`], returned by lookups and
/// iteration. Stays valid for as long as the `Arc` is held, regardless of a
/// concurrent logical `del` (SPEC_FULL invariant #4).
pub type NodeHandle = Arc<NodeHeader>;

/// The lock-free-style bucket-chain hash map.
pub struct Map {
    buckets: RwLock<Vec<Bucket>>,
    live_count: AtomicUsize,
}

impl Map {
    pub fn new() -> Self {
        Self::with_bucket_count(DEFAULT_BUCKET_COUNT)
    }

    pub fn with_bucket_count(n: usize) -> Self {
        let n = n.max(1);
        Self {
            buckets: RwLock::new((0..n).map(|_| Bucket::new()).collect()),
            live_count: AtomicUsize::new(0),
        }
    }

    fn bucket_index(&self, key: &Key, bucket_len: usize) -> usize {
        (hash_key(key) as usize) % bucket_len
    }

    /// Looks up a node by key.
    pub fn lookup(&self, key: &Key) -> Option<NodeHandle> {
        let buckets = self.buckets.read();
        let idx = self.bucket_index(key, buckets.len());
        let chain = buckets[idx].entries.read();
        chain
            .iter()
            .find(|e| e.is_live() && &e.key == key)
            .map(|e| e.node.clone())
    }

    /// Unconditionally prepends `node` under `key`; duplicates allowed.
    ///
    /// Used only by bootstrap call sites (`gtsm_init`, `TsmNode::new`) that
    /// publish a fundamental type before any safety-wrapper read-section
    /// could sensibly exist yet; it deliberately does not assert one, the
    /// same relaxation SPEC_FULL §4.F grants the root type's bootstrap.
    pub fn add(&self, key: Key, node: Arc<NodeHeader>) {
        let buckets = self.buckets.read();
        let idx = self.bucket_index(&key, buckets.len());
        buckets[idx].entries.write().push(Arc::new(Entry {
            key,
            node,
            deleted: AtomicBool::new(false),
        }));
        self.live_count.fetch_add(1, Ordering::Relaxed);
        drop(buckets);
        self.maybe_grow();
    }

    /// Atomic test-and-insert. `Ok` carries the freshly inserted node;
    /// `Err` carries the pre-existing node that blocked the insert.
    pub fn add_unique(
        &self,
        key: Key,
        node: Arc<NodeHeader>,
    ) -> std::result::Result<NodeHandle, NodeHandle> {
        let buckets = self.buckets.read();
        let idx = self.bucket_index(&key, buckets.len());
        let mut chain = buckets[idx].entries.write();

        if let Some(existing) = chain.iter().find(|e| e.is_live() && e.key == key) {
            return Err(existing.node.clone());
        }

        chain.push(Arc::new(Entry {
            key,
            node: node.clone(),
            deleted: AtomicBool::new(false),
        }));
        drop(chain);
        drop(buckets);
        self.live_count.fetch_add(1, Ordering::Relaxed);
        self.maybe_grow();
        Ok(node)
    }

    /// Atomic replace-or-insert. Returns the displaced node, if any.
    pub fn add_replace(&self, key: Key, node: Arc<NodeHeader>) -> Option<NodeHandle> {
        let buckets = self.buckets.read();
        let idx = self.bucket_index(&key, buckets.len());
        let mut chain = buckets[idx].entries.write();

        let displaced = chain.iter().find(|e| e.is_live() && e.key == key).map(|e| {
            e.deleted.store(true, Ordering::Release);
            e.node.clone()
        });

        chain.push(Arc::new(Entry {
            key,
            node,
            deleted: AtomicBool::new(false),
        }));

        if displaced.is_none() {
            self.live_count.fetch_add(1, Ordering::Relaxed);
        }

        displaced
    }

    /// Replaces the live node under `key` with `node`. Fails with
    /// [`RegistryError::NodeNotFound`] if no live node has that key.
    pub fn replace(&self, key: &Key, node: Arc<NodeHeader>) -> Result<NodeHandle> {
        let buckets = self.buckets.read();
        let idx = self.bucket_index(key, buckets.len());
        let mut chain = buckets[idx].entries.write();

        let old = chain
            .iter()
            .find(|e| e.is_live() && &e.key == key)
            .ok_or(RegistryError::NodeNotFound)?
            .clone();

        old.deleted.store(true, Ordering::Release);
        chain.push(Arc::new(Entry {
            key: key.clone(),
            node,
            deleted: AtomicBool::new(false),
        }));

        Ok(old.node.clone())
    }

    /// Logically removes the live node under `key`, returning it so the
    /// caller can queue its type's free callback.
    pub fn del(&self, key: &Key) -> Result<NodeHandle> {
        let buckets = self.buckets.read();
        let idx = self.bucket_index(key, buckets.len());
        let chain = buckets[idx].entries.read();

        let entry = chain
            .iter()
            .find(|e| &e.key == key)
            .ok_or(RegistryError::NodeNotFound)?;

        if entry
            .deleted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RegistryError::NodeIsRemoved);
        }

        self.live_count.fetch_sub(1, Ordering::Relaxed);
        Ok(entry.node.clone())
    }

    /// An unordered snapshot of every currently-live node. Tolerates
    /// concurrent mutation: nodes removed mid-snapshot may still appear,
    /// nodes added mid-snapshot may or may not (SPEC_FULL §4.C).
    pub fn iter_snapshot(&self) -> Vec<NodeHandle> {
        let buckets = self.buckets.read();
        let mut out = Vec::new();
        for bucket in buckets.iter() {
            let chain = bucket.entries.read();
            out.extend(
                chain
                    .iter()
                    .filter(|e| e.is_live())
                    .map(|e| e.node.clone()),
            );
        }
        out
    }

    /// Returns an exact live count (requires briefly locking every bucket).
    pub fn count(&self) -> usize {
        self.live_count.load(Ordering::Relaxed)
    }

    /// Grows the bucket array and physically compacts tombstones, rehashing
    /// every live entry. Writer-only: blocks until no concurrent bucket
    /// operation is in flight.
    pub fn resize(&self, new_bucket_count: usize) {
        let new_bucket_count = new_bucket_count.max(1);
        let mut buckets = self.buckets.write();

        let mut live_entries = Vec::new();
        for bucket in buckets.iter() {
            let chain = bucket.entries.read();
            live_entries.extend(chain.iter().filter(|e| e.is_live()).cloned());
        }

        let mut new_buckets: Vec<Bucket> = (0..new_bucket_count).map(|_| Bucket::new()).collect();
        for entry in live_entries {
            let idx = (hash_key(&entry.key) as usize) % new_bucket_count;
            new_buckets[idx].entries.get_mut().push(entry);
        }

        *buckets = new_buckets;
    }

    fn maybe_grow(&self) {
        let buckets_len = self.buckets.read().len();
        if self.live_count.load(Ordering::Relaxed) > buckets_len * MAX_LOAD_FACTOR {
            self.resize(buckets_len * 2);
        }
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test;
