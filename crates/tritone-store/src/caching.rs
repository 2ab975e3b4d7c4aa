//! Write-through composite: a file cache in front of a primary backend.
//!
//! Every mutation goes to both stores so the cache folder stays a complete
//! text mirror of the index (re-usable for bulk loads and to skip
//! re-extraction). Lookups always hit the primary.

use crate::{FileStorage, QueryHit, ResourceMetadata, Result, Storage, StorageStats};
use std::sync::Arc;

pub struct CachingStorage {
    cache: FileStorage,
    primary: Arc<dyn Storage>,
}

impl CachingStorage {
    pub fn new(cache: FileStorage, primary: Arc<dyn Storage>) -> Self {
        Self { cache, primary }
    }

    pub fn cache(&self) -> &FileStorage {
        &self.cache
    }
}

impl Storage for CachingStorage {
    fn add(&self, hash: u64, resource_id: i32, t1: i32) {
        self.cache.add(hash, resource_id, t1);
        self.primary.add(hash, resource_id, t1);
    }

    fn flush_store(&self) -> Result<()> {
        self.cache.flush_store()?;
        self.primary.flush_store()
    }

    fn clear_store_queue(&self) {
        self.cache.clear_store_queue();
        self.primary.clear_store_queue();
    }

    fn delete(&self, hash: u64, resource_id: i32, t1: i32) {
        self.cache.delete(hash, resource_id, t1);
        self.primary.delete(hash, resource_id, t1);
    }

    fn flush_delete(&self) -> Result<()> {
        self.cache.flush_delete()?;
        self.primary.flush_delete()
    }

    fn query(&self, hash: u64, range: u64) -> Result<Vec<QueryHit>> {
        self.primary.query(hash, range)
    }

    fn put_metadata(&self, meta: &ResourceMetadata) -> Result<()> {
        self.cache.put_metadata(meta)?;
        self.primary.put_metadata(meta)
    }

    fn get_metadata(&self, resource_id: i32) -> Result<Option<ResourceMetadata>> {
        self.primary.get_metadata(resource_id)
    }

    fn delete_metadata(&self, resource_id: i32) -> Result<()> {
        self.cache.delete_metadata(resource_id)?;
        self.primary.delete_metadata(resource_id)
    }

    fn clear(&self) -> Result<()> {
        self.cache.clear()?;
        self.primary.clear()
    }

    fn stats(&self) -> Result<StorageStats> {
        self.primary.stats()
    }
}
