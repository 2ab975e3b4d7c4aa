//! Append-only text file backend.
//!
//! Each resource gets `<resource_id>.tdb` with one posting per line plus a
//! `<resource_id>_meta_data.txt` sidecar. This backend exists for caching
//! and exchange; its near-hash lookup is a full scan and is only meant for
//! bulk load/dump.

use crate::{sort_hits, QueryHit, ResourceMetadata, Result, Storage, StorageStats};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tritone_fmt::{
    meta_file_name, read_meta_file, read_print_file, tdb_file_name, write_meta_file, MetaRecord,
    PrintRecord, META_DATA_SUFFIX, TDB_EXTENSION,
};

/// Text file storage rooted at a single folder.
pub struct FileStorage {
    folder: PathBuf,
    store_queue: Mutex<Vec<PrintRecord>>,
    delete_queue: Mutex<Vec<PrintRecord>>,
    // Serialises all file writes; readers go through the filesystem directly.
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn open(folder: &Path) -> Result<Self> {
        std::fs::create_dir_all(folder)?;
        Ok(Self {
            folder: folder.to_path_buf(),
            store_queue: Mutex::new(Vec::new()),
            delete_queue: Mutex::new(Vec::new()),
            write_lock: Mutex::new(()),
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Path of the cached print file for a resource.
    pub fn tdb_path(&self, resource_id: i32) -> PathBuf {
        self.folder.join(tdb_file_name(resource_id))
    }

    fn meta_path(&self, resource_id: i32) -> PathBuf {
        self.folder.join(meta_file_name(resource_id))
    }

    fn tdb_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.folder)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(TDB_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Every posting in the folder. Used by the near-hash scan and bulk load.
    pub fn scan_all(&self) -> Result<Vec<PrintRecord>> {
        let files = self.tdb_files()?;
        let prints: Vec<PrintRecord> = files
            .par_iter()
            .filter_map(|path| match read_print_file(path) {
                Ok(prints) => Some(prints),
                Err(e) => {
                    log::warn!("Failed to read {}: {}", path.display(), e);
                    None
                }
            })
            .flatten()
            .collect();
        Ok(prints)
    }
}

impl Storage for FileStorage {
    fn add(&self, hash: u64, resource_id: i32, t1: i32) {
        self.store_queue
            .lock()
            .expect("store queue poisoned")
            .push(PrintRecord {
                hash,
                resource_id,
                t1,
            });
    }

    fn flush_store(&self) -> Result<()> {
        let queued: Vec<_> = self
            .store_queue
            .lock()
            .expect("store queue poisoned")
            .drain(..)
            .collect();
        let mut per_resource: BTreeMap<i32, Vec<PrintRecord>> = BTreeMap::new();
        for print in queued {
            per_resource.entry(print.resource_id).or_default().push(print);
        }
        let _guard = self.write_lock.lock().expect("write lock poisoned");
        for (resource_id, prints) in per_resource {
            tritone_fmt::append_print_file(&self.tdb_path(resource_id), &prints)?;
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
            .push(PrintRecord {
                hash,
                resource_id,
                t1,
            });
    }

    fn flush_delete(&self) -> Result<()> {
        let queued: Vec<_> = self
            .delete_queue
            .lock()
            .expect("delete queue poisoned")
            .drain(..)
            .collect();
        let mut per_resource: BTreeMap<i32, BTreeSet<PrintRecord>> = BTreeMap::new();
        for print in queued {
            per_resource.entry(print.resource_id).or_default().insert(print);
        }
        let _guard = self.write_lock.lock().expect("write lock poisoned");
        for (resource_id, doomed) in per_resource {
            let path = self.tdb_path(resource_id);
            if !path.exists() {
                continue;
            }
            let remaining: Vec<PrintRecord> = read_print_file(&path)?
                .into_iter()
                .filter(|print| !doomed.contains(print))
                .collect();
            if remaining.is_empty() {
                std::fs::remove_file(&path)?;
            } else {
                std::fs::remove_file(&path)?;
                tritone_fmt::append_print_file(&path, &remaining)?;
            }
        }
        Ok(())
    }

    fn query(&self, hash: u64, range: u64) -> Result<Vec<QueryHit>> {
        let (low, high) = crate::hash_bounds(hash, range);
        let mut unique: BTreeSet<(u64, i32, i32)> = BTreeSet::new();
        for print in self.scan_all()? {
            if print.hash >= low && print.hash <= high {
                unique.insert((print.hash, print.resource_id, print.t1));
            }
        }
        let mut hits: Vec<QueryHit> = unique
            .into_iter()
            .map(|(matched_hash, resource_id, t1)| QueryHit {
                resource_id,
                t1,
                matched_hash,
            })
            .collect();
        sort_hits(&mut hits);
        Ok(hits)
    }

    fn put_metadata(&self, meta: &ResourceMetadata) -> Result<()> {
        let _guard = self.write_lock.lock().expect("write lock poisoned");
        write_meta_file(
            &self.meta_path(meta.identifier),
            &MetaRecord {
                path: meta.path.clone(),
                duration: meta.duration,
                num_fingerprints: meta.num_fingerprints,
            },
        )?;
        Ok(())
    }

    fn get_metadata(&self, resource_id: i32) -> Result<Option<ResourceMetadata>> {
        let path = self.meta_path(resource_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(read_meta_file(&path)?.map(|meta| ResourceMetadata {
            identifier: resource_id,
            path: meta.path,
            duration: meta.duration,
            num_fingerprints: meta.num_fingerprints,
        }))
    }

    fn delete_metadata(&self, resource_id: i32) -> Result<()> {
        let _guard = self.write_lock.lock().expect("write lock poisoned");
        let path = self.meta_path(resource_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.clear_store_queue();
        self.delete_queue
            .lock()
            .expect("delete queue poisoned")
            .clear();
        let _guard = self.write_lock.lock().expect("write lock poisoned");
        for entry in std::fs::read_dir(&self.folder)? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            let is_tdb = path.extension().and_then(|e| e.to_str()) == Some(TDB_EXTENSION);
            if is_tdb || name.ends_with(META_DATA_SUFFIX) {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        let posting_count = self.scan_all()?.len() as u64;
        let mut resource_count = 0u64;
        for entry in std::fs::read_dir(&self.folder)? {
            let path = entry?.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.ends_with(META_DATA_SUFFIX))
            {
                resource_count += 1;
            }
        }
        Ok(StorageStats {
            resource_count,
            posting_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_and_query_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileStorage::open(dir.path()).unwrap();
        store.add(100, 1, 10);
        store.add(102, 2, 20);
        store.add(400, 2, 30);
        store.flush_store().unwrap();

        let hits = store.query(101, 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(dir.path().join("1.tdb").exists());
        assert!(dir.path().join("2.tdb").exists());
    }

    #[test]
    fn delete_rewrites_and_removes_empty_files() {
        let dir = tempdir().unwrap();
        let store = FileStorage::open(dir.path()).unwrap();
        store.add(100, 1, 10);
        store.add(101, 1, 20);
        store.flush_store().unwrap();

        store.delete(100, 1, 10);
        store.flush_delete().unwrap();
        assert_eq!(store.query(100, 5).unwrap().len(), 1);

        store.delete(101, 1, 20);
        store.flush_delete().unwrap();
        assert!(!dir.path().join("1.tdb").exists());
    }

    #[test]
    fn corrupt_lines_are_skipped_not_rewritten() {
        let dir = tempdir().unwrap();
        let store = FileStorage::open(dir.path()).unwrap();
        let path = dir.path().join("3.tdb");
        std::fs::write(&path, "100 3 10\nnot a posting\n101 3 20\n").unwrap();

        assert_eq!(store.query(100, 5).unwrap().len(), 2);
        // The file keeps its corrupt line.
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("not a posting"));
    }

    #[test]
    fn clear_removes_prints_and_sidecars() {
        let dir = tempdir().unwrap();
        let store = FileStorage::open(dir.path()).unwrap();
        store.add(1, 4, 0);
        store.flush_store().unwrap();
        store
            .put_metadata(&ResourceMetadata {
                identifier: 4,
                path: "x.wav".to_string(),
                duration: 1.0,
                num_fingerprints: 1,
            })
            .unwrap();

        store.clear().unwrap();
        assert_eq!(store.stats().unwrap(), StorageStats::default());
    }
}
