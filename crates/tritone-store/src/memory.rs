//! In-memory backend: an ordered map guarded by a readers-writer lock.

use crate::{
    hash_bounds, sort_hits, Posting, QueryHit, ResourceMetadata, Result, Storage, StorageStats,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

#[derive(Default)]
struct Tables {
    postings: BTreeMap<u64, Vec<Posting>>,
    metadata: HashMap<i32, ResourceMetadata>,
}

/// Volatile storage. The ordered posting map makes the near-hash range scan
/// a plain `BTreeMap::range`.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
    store_queue: Mutex<Vec<(u64, Posting)>>,
    delete_queue: Mutex<Vec<(u64, Posting)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn add(&self, hash: u64, resource_id: i32, t1: i32) {
        self.store_queue
            .lock()
            .expect("store queue poisoned")
            .push((hash, Posting { resource_id, t1 }));
    }

    fn flush_store(&self) -> Result<()> {
        let queued: Vec<_> = self
            .store_queue
            .lock()
            .expect("store queue poisoned")
            .drain(..)
            .collect();
        let mut tables = self.tables.write().expect("tables poisoned");
        for (hash, posting) in queued {
            // Record identity is (hash, resource_id, t1); re-inserting an
            // existing posting is a no-op, matching the KV backend.
            let list = tables.postings.entry(hash).or_default();
            if !list.contains(&posting) {
                list.push(posting);
            }
        }
        Ok(())
    }

    fn clear_store_queue(&self) {
        self.store_queue
            .lock()
            .expect("store queue poisoned")
            .clear();
    }

    fn delete(&self, hash: u64, resource_id: i32, t1: i32) {
        self.delete_queue
            .lock()
            .expect("delete queue poisoned")
            .push((hash, Posting { resource_id, t1 }));
    }

    fn flush_delete(&self) -> Result<()> {
        let queued: Vec<_> = self
            .delete_queue
            .lock()
            .expect("delete queue poisoned")
            .drain(..)
            .collect();
        let mut tables = self.tables.write().expect("tables poisoned");
        for (hash, posting) in queued {
            if let Some(list) = tables.postings.get_mut(&hash) {
                if let Some(index) = list.iter().position(|p| *p == posting) {
                    list.swap_remove(index);
                }
                if list.is_empty() {
                    tables.postings.remove(&hash);
                }
            }
        }
        Ok(())
    }

    fn query(&self, hash: u64, range: u64) -> Result<Vec<QueryHit>> {
        let (low, high) = hash_bounds(hash, range);
        let tables = self.tables.read().expect("tables poisoned");
        let mut hits = Vec::new();
        for (&matched_hash, postings) in tables.postings.range(low..=high) {
            for posting in postings {
                hits.push(QueryHit {
                    resource_id: posting.resource_id,
                    t1: posting.t1,
                    matched_hash,
                });
            }
        }
        sort_hits(&mut hits);
        Ok(hits)
    }

    fn put_metadata(&self, meta: &ResourceMetadata) -> Result<()> {
        self.tables
            .write()
            .expect("tables poisoned")
            .metadata
            .insert(meta.identifier, meta.clone());
        Ok(())
    }

    fn get_metadata(&self, resource_id: i32) -> Result<Option<ResourceMetadata>> {
        Ok(self
            .tables
            .read()
            .expect("tables poisoned")
            .metadata
            .get(&resource_id)
            .cloned())
    }

    fn delete_metadata(&self, resource_id: i32) -> Result<()> {
        self.tables
            .write()
            .expect("tables poisoned")
            .metadata
            .remove(&resource_id);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut tables = self.tables.write().expect("tables poisoned");
        tables.postings.clear();
        tables.metadata.clear();
        drop(tables);
        self.clear_store_queue();
        self.delete_queue
            .lock()
            .expect("delete queue poisoned")
            .clear();
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        let tables = self.tables.read().expect("tables poisoned");
        Ok(StorageStats {
            resource_count: tables.metadata.len() as u64,
            posting_count: tables.postings.values().map(|v| v.len() as u64).sum(),
        })
    }
}
