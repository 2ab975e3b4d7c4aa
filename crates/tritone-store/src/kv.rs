//! SQLite-backed ordered KV backend.
//!
//! Postings are single 16-byte keys: the big-endian concatenation
//! `hash (8) : t1 (4) : resource_id (4)`. SQLite compares BLOBs bytewise, so
//! the near-hash lookup is one `BETWEEN` range scan over the primary key and
//! every `flush_store` is a single write transaction.

use crate::{
    hash_bounds, sort_hits, QueryHit, ResourceMetadata, Result, Storage, StorageError,
    StorageStats,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const KEY_LEN: usize = 16;

/// Durable storage in a single SQLite database file.
pub struct KvStorage {
    conn: Mutex<Connection>,
    store_queue: Mutex<Vec<[u8; KEY_LEN]>>,
    delete_queue: Mutex<Vec<[u8; KEY_LEN]>>,
}

impl KvStorage {
    /// Open (and if needed create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// An in-memory database, useful for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS postings (key BLOB PRIMARY KEY) WITHOUT ROWID;
             CREATE TABLE IF NOT EXISTS resources (
                 id       INTEGER PRIMARY KEY,
                 path     TEXT    NOT NULL,
                 duration REAL    NOT NULL,
                 prints   INTEGER NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            store_queue: Mutex::new(Vec::new()),
            delete_queue: Mutex::new(Vec::new()),
        })
    }
}

fn encode_key(hash: u64, t1: i32, resource_id: i32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    key[..8].copy_from_slice(&hash.to_be_bytes());
    key[8..12].copy_from_slice(&(t1 as u32).to_be_bytes());
    key[12..].copy_from_slice(&(resource_id as u32).to_be_bytes());
    key
}

fn decode_key(key: &[u8]) -> std::result::Result<(u64, i32, i32), StorageError> {
    if key.len() != KEY_LEN {
        return Err(StorageError::Corrupt(format!(
            "posting key has {} bytes, expected {}",
            key.len(),
            KEY_LEN
        )));
    }
    let hash = u64::from_be_bytes(key[..8].try_into().expect("length checked"));
    let t1 = u32::from_be_bytes(key[8..12].try_into().expect("length checked")) as i32;
    let resource_id = u32::from_be_bytes(key[12..].try_into().expect("length checked")) as i32;
    Ok((hash, t1, resource_id))
}

impl Storage for KvStorage {
    fn add(&self, hash: u64, resource_id: i32, t1: i32) {
        self.store_queue
            .lock()
            .expect("store queue poisoned")
            .push(encode_key(hash, t1, resource_id));
    }

    fn flush_store(&self) -> Result<()> {
        let queued: Vec<_> = self
            .store_queue
            .lock()
            .expect("store queue poisoned")
            .drain(..)
            .collect();
        if queued.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().expect("connection poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("INSERT OR IGNORE INTO postings (key) VALUES (?1)")?;
            for key in &queued {
                stmt.execute(params![key.as_slice()])?;
            }
        }
        tx.commit()?;
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
            .push(encode_key(hash, t1, resource_id));
    }

    fn flush_delete(&self) -> Result<()> {
        let queued: Vec<_> = self
            .delete_queue
            .lock()
            .expect("delete queue poisoned")
            .drain(..)
            .collect();
        if queued.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().expect("connection poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM postings WHERE key = ?1")?;
            for key in &queued {
                stmt.execute(params![key.as_slice()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn query(&self, hash: u64, range: u64) -> Result<Vec<QueryHit>> {
        let (low_hash, high_hash) = hash_bounds(hash, range);
        let low = encode_key(low_hash, 0, 0);
        let mut high = [0xFFu8; KEY_LEN];
        high[..8].copy_from_slice(&high_hash.to_be_bytes());

        let conn = self.conn.lock().expect("connection poisoned");
        let mut stmt = conn.prepare_cached(
            "SELECT key FROM postings WHERE key BETWEEN ?1 AND ?2 ORDER BY key",
        )?;
        let mut rows = stmt.query(params![low.as_slice(), high.as_slice()])?;
        let mut hits = Vec::new();
        while let Some(row) = rows.next()? {
            let key: Vec<u8> = row.get(0)?;
            let (matched_hash, t1, resource_id) = decode_key(&key)?;
            hits.push(QueryHit {
                resource_id,
                t1,
                matched_hash,
            });
        }
        drop(rows);
        drop(stmt);
        drop(conn);
        sort_hits(&mut hits);
        Ok(hits)
    }

    fn put_metadata(&self, meta: &ResourceMetadata) -> Result<()> {
        let conn = self.conn.lock().expect("connection poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO resources (id, path, duration, prints) VALUES (?1, ?2, ?3, ?4)",
            params![
                meta.identifier,
                meta.path,
                meta.duration as f64,
                meta.num_fingerprints
            ],
        )?;
        Ok(())
    }

    fn get_metadata(&self, resource_id: i32) -> Result<Option<ResourceMetadata>> {
        let conn = self.conn.lock().expect("connection poisoned");
        let meta = conn
            .query_row(
                "SELECT path, duration, prints FROM resources WHERE id = ?1",
                params![resource_id],
                |row| {
                    Ok(ResourceMetadata {
                        identifier: resource_id,
                        path: row.get(0)?,
                        duration: row.get::<_, f64>(1)? as f32,
                        num_fingerprints: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    fn delete_metadata(&self, resource_id: i32) -> Result<()> {
        let conn = self.conn.lock().expect("connection poisoned");
        conn.execute("DELETE FROM resources WHERE id = ?1", params![resource_id])?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.clear_store_queue();
        self.delete_queue
            .lock()
            .expect("delete queue poisoned")
            .clear();
        let conn = self.conn.lock().expect("connection poisoned");
        conn.execute_batch("DELETE FROM postings; DELETE FROM resources;")?;
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        let conn = self.conn.lock().expect("connection poisoned");
        let posting_count: u64 =
            conn.query_row("SELECT COUNT(*) FROM postings", [], |row| row.get(0))?;
        let resource_count: u64 =
            conn.query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))?;
        Ok(StorageStats {
            resource_count,
            posting_count,
        })
    }
}
