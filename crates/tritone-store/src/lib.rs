//! Storage backends for the tritone fingerprint index.
//!
//! The index maps a 64-bit fingerprint hash to a posting list of
//! `(resource_id, t1)` pairs, next to a small per-resource metadata table.
//! All backends satisfy the same [`Storage`] contract and differ only in
//! persistence: in-memory, SQLite-backed ordered KV, append-only text files,
//! or a caching composite that writes through a file cache.

pub mod caching;
pub mod file;
pub mod kv;
pub mod memory;

pub use caching::CachingStorage;
pub use file::FileStorage;
pub use kv::KvStorage;
pub use memory::MemoryStorage;

use serde::{Deserialize, Serialize};

/// Errors raised by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend: {0}")]
    Backend(#[from] rusqlite::Error),
    #[error("corrupt storage record: {0}")]
    Corrupt(String),
    #[error("resource {0} not found")]
    NotFound(i32),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A posting: one indexed fingerprint occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Posting {
    pub resource_id: i32,
    pub t1: i32,
}

/// A posting returned from a near-hash lookup, together with the hash it was
/// actually stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryHit {
    pub resource_id: i32,
    pub t1: i32,
    pub matched_hash: u64,
}

/// Per-resource metadata, written once per store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub identifier: i32,
    pub path: String,
    pub duration: f32,
    pub num_fingerprints: i32,
}

impl ResourceMetadata {
    pub fn prints_per_second(&self) -> f32 {
        if self.duration > 0.0 {
            self.num_fingerprints as f32 / self.duration
        } else {
            0.0
        }
    }
}

/// Aggregate counts reported by [`Storage::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub resource_count: u64,
    pub posting_count: u64,
}

/// The storage contract shared by all backends.
///
/// `add` and `delete` enqueue; nothing is visible until the matching flush
/// commits the queue. `query` must return the same postings for a given
/// store state regardless of the order they were inserted in.
pub trait Storage: Send + Sync {
    /// Enqueue a posting for `flush_store`.
    fn add(&self, hash: u64, resource_id: i32, t1: i32);

    /// Commit all enqueued postings durably.
    fn flush_store(&self) -> Result<()>;

    /// Drop all enqueued postings without committing them.
    fn clear_store_queue(&self);

    /// Enqueue a posting removal for `flush_delete`.
    fn delete(&self, hash: u64, resource_id: i32, t1: i32);

    /// Commit all enqueued removals. Removing an absent posting is a no-op.
    fn flush_delete(&self) -> Result<()>;

    /// All postings stored under a hash `H'` with `|H' - hash| <= range`,
    /// sorted by `(matched_hash, resource_id, t1)`. Unknown hashes yield an
    /// empty list.
    fn query(&self, hash: u64, range: u64) -> Result<Vec<QueryHit>>;

    fn put_metadata(&self, meta: &ResourceMetadata) -> Result<()>;
    fn get_metadata(&self, resource_id: i32) -> Result<Option<ResourceMetadata>>;
    fn delete_metadata(&self, resource_id: i32) -> Result<()>;

    /// Remove every posting and every metadata record.
    fn clear(&self) -> Result<()>;

    fn stats(&self) -> Result<StorageStats>;
}

fn sort_hits(hits: &mut Vec<QueryHit>) {
    hits.sort_by_key(|hit| (hit.matched_hash, hit.resource_id, hit.t1));
}

/// Inclusive hash interval `[hash - range, hash + range]` with saturation at
/// the ends of the key space.
fn hash_bounds(hash: u64, range: u64) -> (u64, u64) {
    (hash.saturating_sub(range), hash.saturating_add(range))
}
