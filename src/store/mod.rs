//! Object store (C4): persistent content-addressed storage backed by an embedded SQL engine.
//!
//! The public surface mirrors the abstract interface in spec §6 (`open`/`prepare`/`statement.run
//! |get|all`/`exec`/`export`/`transaction`) bound concretely to `rusqlite`. Every mutating
//! sequence that touches more than one row (commit, merge, import, GC) is wrapped by its caller
//! in [`ObjectStore::begin_transaction`]/[`ObjectStore::commit_transaction`]/
//! [`ObjectStore::rollback_transaction`] so a failure midway leaves the object graph untouched.

mod schema_sql;

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, DatabaseName, OptionalExtension, params};
use tracing::warn;

use crate::config::RepoConfig;
use crate::delta::policy::{DeltaPlan, StoreReason, plan_store};
use crate::errors::{Result, VcsError};
use crate::hash::ObjectHash;
use crate::object::{Commit, GitObject, ObjectKind, Tree};

/// Result of [`ObjectStore::put_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutResult {
    pub hash: ObjectHash,
    pub is_new: bool,
}

/// Result of [`ObjectStore::store_blob_with_delta`], mirroring spec §4.3's write-path contract.
#[derive(Debug, Clone)]
pub struct StoreBlobResult {
    pub hash: ObjectHash,
    pub used_delta: bool,
    pub delta_size: usize,
    pub compression_ratio: f64,
    pub reason: StoreReason,
    pub is_new: bool,
}

/// A reconstructed object as returned by [`ObjectStore::get_object`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub kind: ObjectKind,
    pub size: u64,
    pub compression: &'static str,
}

/// One row of `refs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    pub hash: ObjectHash,
    pub kind: String,
}

/// Raw aggregate counters behind the richer summary built by [`crate::stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RawStats {
    pub object_count: u64,
    pub blob_count: u64,
    pub tree_count: u64,
    pub commit_count: u64,
    pub delta_count: u64,
    pub unique_bases: u64,
    pub total_uncompressed: u64,
    pub total_compressed: u64,
    pub total_delta_payload: u64,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A single connection to the embedded database backing one repository.
pub struct ObjectStore {
    conn: Connection,
    config: RepoConfig,
}

struct ObjectRow {
    kind: ObjectKind,
    size: u64,
    data: Vec<u8>,
    compression: String,
    base_hash: Option<ObjectHash>,
    delta_depth: u32,
}

impl ObjectStore {
    /// Open (creating if absent) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, config: RepoConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = ObjectStore { conn, config };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a private in-memory store, mainly for tests and staging scratch work.
    pub fn open_in_memory(config: RepoConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = ObjectStore { conn, config };
        store.init_schema()?;
        Ok(store)
    }

    /// Load a store from a previously exported byte image (spec §4.8 branch transfer).
    pub fn from_bytes(bytes: &[u8], config: RepoConfig) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        // Safety: `bytes` is a complete, well-formed database image produced by
        // `export_bytes`; rusqlite takes ownership of a copy of the buffer.
        unsafe {
            conn.deserialize(DatabaseName::Main, bytes.to_vec(), false)?;
        }
        let store = ObjectStore { conn, config };
        store.init_schema()?;
        Ok(store)
    }

    /// Serialize the whole store to a byte image suitable for `from_bytes`.
    pub fn export_bytes(&self) -> Result<Vec<u8>> {
        let data = self.conn.serialize(DatabaseName::Main)?;
        Ok(data.to_vec())
    }

    /// `(freelist_pages, total_pages)` of the underlying database file, via `PRAGMA
    /// freelist_count`/`PRAGMA page_count`. The freelist holds pages vacated by deleted rows
    /// (e.g. a garbage-collection pass) that SQLite has not yet reclaimed — this is the actual
    /// on-disk overhead `stats::size_summary` reports against, rather than a comparison between
    /// the object table's own compressed/uncompressed byte totals (which can never diverge
    /// enough to matter, since stored deltas are always smaller than their full-copy size).
    pub fn page_stats(&self) -> Result<(u64, u64)> {
        let freelist_count: i64 = self
            .conn
            .query_row("PRAGMA freelist_count", [], |row| row.get(0))?;
        let page_count: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))?;
        Ok((freelist_count.max(0) as u64, page_count.max(0) as u64))
    }

    fn init_schema(&self) -> Result<()> {
        for stmt in schema_sql::SCHEMA_STATEMENTS {
            self.conn.execute_batch(stmt)?;
        }
        Ok(())
    }

    /// Run `f` inside `BEGIN ... COMMIT`; any `Err` returned by `f` rolls the transaction back.
    pub fn with_transaction<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Begin a raw transaction spanning calls to the ordinary `&self` methods below (`put_object`,
    /// `set_ref`, ...). Pairs with [`ObjectStore::commit_transaction`] / [`ObjectStore::rollback_transaction`].
    ///
    /// Used where a multi-statement sequence (commit, merge, import, GC) must be atomic but its
    /// steps are spread across several `ObjectStore` calls that each take `&self`, which rules out
    /// `with_transaction`'s borrowed `rusqlite::Transaction` handle.
    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    pub fn commit_transaction(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback_transaction(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    // -- objects ---------------------------------------------------------

    fn fetch_row(&self, hash: &ObjectHash) -> Result<Option<ObjectRow>> {
        let hex = hash.to_hex();
        let row = self
            .conn
            .query_row(
                "SELECT type, size, data, compression, base_hash, delta_depth FROM objects WHERE hash = ?1",
                params![hex],
                |row| {
                    let kind_str: String = row.get(0)?;
                    let size: i64 = row.get(1)?;
                    let data: Vec<u8> = row.get(2)?;
                    let compression: String = row.get(3)?;
                    let base_hash: Option<String> = row.get(4)?;
                    let delta_depth: i64 = row.get(5)?;
                    Ok((kind_str, size, data, compression, base_hash, delta_depth))
                },
            )
            .optional()?;

        let Some((kind_str, size, data, compression, base_hash, delta_depth)) = row else {
            return Ok(None);
        };
        let kind = ObjectKind::parse(&kind_str)?;
        let base_hash = match base_hash {
            Some(h) => Some(
                h.parse::<ObjectHash>()
                    .map_err(VcsError::integrity)?,
            ),
            None => None,
        };
        Ok(Some(ObjectRow {
            kind,
            size: size as u64,
            data,
            compression,
            base_hash,
            delta_depth: delta_depth as u32,
        }))
    }

    /// Insert `data` as a full (non-delta) object if absent. Returns the computed hash and
    /// whether this call actually inserted a new row.
    pub fn put_object(&self, data: &[u8], kind: ObjectKind) -> Result<PutResult> {
        let hash = ObjectHash::of(data);
        if self.has_object(&hash)? {
            return Ok(PutResult { hash, is_new: false });
        }
        self.conn.execute(
            "INSERT INTO objects (hash, type, size, data, compression, base_hash, delta_depth, created_at)
             VALUES (?1, ?2, ?3, ?4, 'full', NULL, 0, ?5)",
            params![hash.to_hex(), kind.as_str(), data.len() as i64, data, now_unix()],
        )?;
        Ok(PutResult { hash, is_new: true })
    }

    /// Store a blob, optionally delta-encoded against `base_hash`, following the write-path
    /// policy in spec §4.3.
    pub fn store_blob_with_delta(
        &self,
        data: &[u8],
        base_hash: Option<ObjectHash>,
    ) -> Result<StoreBlobResult> {
        let hash = ObjectHash::of(data);
        if let Some(existing) = self.fetch_row(&hash)? {
            return Ok(StoreBlobResult {
                hash,
                used_delta: existing.compression == "delta",
                delta_size: existing.data.len(),
                compression_ratio: existing.data.len() as f64 / data.len().max(1) as f64,
                reason: if existing.compression == "delta" {
                    StoreReason::OkDelta
                } else {
                    StoreReason::OkFull
                },
                is_new: false,
            });
        }

        let base_row = match base_hash {
            Some(h) => self.fetch_row(&h)?,
            None => None,
        };

        let plan: DeltaPlan = match (&base_hash, &base_row) {
            (Some(_), Some(row)) if row.delta_depth + 1 > self.config.d_max => DeltaPlan {
                payload: data.to_vec(),
                used_delta: false,
                base_hash: None,
                stored_size: data.len(),
                full_size: data.len(),
                compression_ratio: 1.0,
                reason: StoreReason::InsufficientSimilarity,
            },
            (Some(h), Some(_)) => {
                let base_bytes = self
                    .reconstruct(h, self.config.d_max + 1)?
                    .ok_or_else(|| VcsError::integrity("base object failed to reconstruct"))?;
                plan_store(data, Some(*h), Some(&base_bytes), &self.config)
            }
            (Some(_), None) => plan_store(data, base_hash, None, &self.config),
            (None, _) => plan_store(data, None, None, &self.config),
        };

        let delta_depth = if plan.used_delta {
            base_row.map(|r| r.delta_depth + 1).unwrap_or(1)
        } else {
            0
        };

        self.conn.execute(
            "INSERT INTO objects (hash, type, size, data, compression, base_hash, delta_depth, created_at)
             VALUES (?1, 'blob', ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                hash.to_hex(),
                data.len() as i64,
                plan.payload,
                if plan.used_delta { "delta" } else { "full" },
                plan.base_hash.map(|h| h.to_hex()),
                delta_depth as i64,
                now_unix(),
            ],
        )?;

        Ok(StoreBlobResult {
            hash,
            used_delta: plan.used_delta,
            delta_size: plan.stored_size,
            compression_ratio: plan.compression_ratio,
            reason: plan.reason,
            is_new: true,
        })
    }

    /// Reconstruct the identity bytes for `hash`, walking a delta chain if needed. Any
    /// corruption, missing base, or chain deeper than `depth_budget` yields `Ok(None)` rather
    /// than an error (spec §4.4 failure semantics: callers treat it as absent).
    fn reconstruct(&self, hash: &ObjectHash, depth_budget: u32) -> Result<Option<Vec<u8>>> {
        let mut chain: Vec<Vec<u8>> = Vec::new();
        let mut current = *hash;

        loop {
            let row = match self.fetch_row(&current)? {
                Some(row) => row,
                None => return Ok(None),
            };

            match row.compression.as_str() {
                "full" => {
                    let mut data = row.data;
                    for delta in chain.iter().rev() {
                        data = match crate::delta::apply_delta(&data, delta) {
                            Ok(d) => d,
                            Err(err) => {
                                warn!(%err, "delta chain failed to apply");
                                return Ok(None);
                            }
                        };
                    }
                    return Ok(Some(data));
                }
                "delta" => {
                    let Some(base_hash) = row.base_hash else {
                        return Ok(None);
                    };
                    chain.push(row.data);
                    if chain.len() as u32 > depth_budget {
                        warn!("delta chain exceeds configured depth budget");
                        return Ok(None);
                    }
                    current = base_hash;
                }
                other => {
                    warn!(tag = other, "unknown object compression tag");
                    return Ok(None);
                }
            }
        }
    }

    /// Fetch an object, transparently reconstructing delta-encoded blobs. Returns `None` for
    /// missing objects or unrecoverable corruption rather than erroring.
    pub fn get_object(&self, hash: &ObjectHash) -> Result<Option<StoredObject>> {
        let Some(row) = self.fetch_row(hash)? else {
            return Ok(None);
        };
        let data = match self.reconstruct(hash, self.config.d_max + 1)? {
            Some(d) => d,
            None => return Ok(None),
        };
        let compression = if row.compression == "delta" { "delta" } else { "full" };
        Ok(Some(StoredObject {
            data,
            kind: row.kind,
            size: row.size,
            compression,
        }))
    }

    pub fn has_object(&self, hash: &ObjectHash) -> Result<bool> {
        let hex = hash.to_hex();
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM objects WHERE hash = ?1",
            params![hex],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn remove_object(&self, hash: &ObjectHash) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM objects WHERE hash = ?1", params![hash.to_hex()])?;
        Ok(changed > 0)
    }

    // -- refs --------------------------------------------------------------

    pub fn set_ref(&self, name: &str, hash: ObjectHash, kind: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO refs (name, hash, kind, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET hash = excluded.hash, kind = excluded.kind, updated_at = excluded.updated_at",
            params![name, hash.to_hex(), kind, now_unix()],
        )?;
        Ok(())
    }

    pub fn get_ref(&self, name: &str) -> Result<Option<RefEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT hash, kind FROM refs WHERE name = ?1",
                params![name],
                |row| {
                    let hash: String = row.get(0)?;
                    let kind: String = row.get(1)?;
                    Ok((hash, kind))
                },
            )
            .optional()?;
        match row {
            Some((hash, kind)) => Ok(Some(RefEntry {
                hash: hash.parse().map_err(VcsError::integrity)?,
                kind,
            })),
            None => Ok(None),
        }
    }

    pub fn list_refs(&self) -> Result<Vec<(String, RefEntry)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, hash, kind FROM refs ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let hash: String = row.get(1)?;
            let kind: String = row.get(2)?;
            Ok((name, hash, kind))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (name, hash, kind) = row?;
            out.push((
                name,
                RefEntry {
                    hash: hash.parse().map_err(VcsError::integrity)?,
                    kind,
                },
            ));
        }
        Ok(out)
    }

    pub fn remove_ref(&self, name: &str) -> Result<bool> {
        let changed = self.conn.execute("DELETE FROM refs WHERE name = ?1", params![name])?;
        Ok(changed > 0)
    }

    // -- metadata ------------------------------------------------------------

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    pub fn delete_meta(&self, key: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM metadata WHERE key = ?1", params![key])?;
        Ok(changed > 0)
    }

    // -- graph queries -------------------------------------------------------

    /// Transitive closure from `root`, following commit→parent, commit→tree, tree→entries.
    pub fn reachable_from(&self, root: ObjectHash) -> Result<HashSet<ObjectHash>> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(root);

        while let Some(hash) = queue.pop_front() {
            if !seen.insert(hash) {
                continue;
            }
            let Some(obj) = self.get_object(&hash)? else {
                continue;
            };
            match obj.kind {
                ObjectKind::Commit => {
                    let commit = Commit::decode(&obj.data)?;
                    queue.push_back(commit.tree);
                    for parent in commit.parents {
                        queue.push_back(parent);
                    }
                }
                ObjectKind::Tree => {
                    let tree = Tree::decode(&obj.data)?;
                    for entry in tree.entries {
                        queue.push_back(entry.hash);
                    }
                }
                ObjectKind::Blob => {}
            }
        }
        Ok(seen)
    }

    /// All object hashes currently stored, used by garbage collection to find unreachable rows.
    pub fn all_hashes(&self) -> Result<Vec<ObjectHash>> {
        let mut stmt = self.conn.prepare("SELECT hash FROM objects")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.parse().map_err(VcsError::integrity)?);
        }
        Ok(out)
    }

    pub fn raw_stats(&self) -> Result<RawStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT type, compression, base_hash, size, length(data) FROM objects")?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(0)?;
            let compression: String = row.get(1)?;
            let base_hash: Option<String> = row.get(2)?;
            let size: i64 = row.get(3)?;
            let stored: i64 = row.get(4)?;
            Ok((kind, compression, base_hash, size as u64, stored as u64))
        })?;

        let mut stats = RawStats::default();
        let mut bases = HashSet::new();
        for row in rows {
            let (kind, compression, base_hash, size, stored) = row?;
            stats.object_count += 1;
            stats.total_uncompressed += size;
            stats.total_compressed += stored;
            match kind.as_str() {
                "blob" => stats.blob_count += 1,
                "tree" => stats.tree_count += 1,
                "commit" => stats.commit_count += 1,
                _ => {}
            }
            if compression == "delta" {
                stats.delta_count += 1;
                stats.total_delta_payload += stored;
                if let Some(b) = base_hash {
                    bases.insert(b);
                }
            }
        }
        stats.unique_bases = bases.len() as u64;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Blob, GitObject};

    fn store() -> ObjectStore {
        ObjectStore::open_in_memory(RepoConfig::default()).unwrap()
    }

    #[test]
    fn put_object_is_idempotent_by_digest() {
        let store = store();
        let blob = Blob::new(b"hello".to_vec());
        let first = store.put_object(&blob.encode(), ObjectKind::Blob).unwrap();
        let second = store.put_object(&blob.encode(), ObjectKind::Blob).unwrap();
        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(first.hash, second.hash);
    }

    #[test]
    fn get_object_round_trips_full_blob() {
        let store = store();
        let data = b"content to retrieve".to_vec();
        let put = store.put_object(&data, ObjectKind::Blob).unwrap();
        let fetched = store.get_object(&put.hash).unwrap().unwrap();
        assert_eq!(fetched.data, data);
    }

    #[test]
    fn get_object_missing_returns_none() {
        let store = store();
        let missing = ObjectHash::of(b"never stored");
        assert!(store.get_object(&missing).unwrap().is_none());
    }

    #[test]
    fn store_blob_with_delta_without_base_stores_full() {
        let store = store();
        let result = store.store_blob_with_delta(b"standalone content", None).unwrap();
        assert!(!result.used_delta);
        assert_eq!(result.reason, StoreReason::NoBaseHash);
    }

    #[test]
    fn store_blob_with_delta_against_similar_base_uses_delta_and_reconstructs() {
        let store = store();
        let base = "shared padding text repeated many times for length ".repeat(20);
        let base_result = store.store_blob_with_delta(base.as_bytes(), None).unwrap();

        let mut updated = base.clone();
        updated.push_str("a small appended tail");
        let delta_result = store
            .store_blob_with_delta(updated.as_bytes(), Some(base_result.hash))
            .unwrap();

        assert!(delta_result.used_delta);
        let fetched = store.get_object(&delta_result.hash).unwrap().unwrap();
        assert_eq!(fetched.data, updated.as_bytes());
    }

    #[test]
    fn refs_round_trip() {
        let store = store();
        let hash = ObjectHash::of(b"commit bytes");
        store.set_ref("refs/heads/main", hash, "branch").unwrap();
        let got = store.get_ref("refs/heads/main").unwrap().unwrap();
        assert_eq!(got.hash, hash);
        assert!(store.remove_ref("refs/heads/main").unwrap());
        assert!(store.get_ref("refs/heads/main").unwrap().is_none());
    }

    #[test]
    fn metadata_round_trip() {
        let store = store();
        store.set_meta("export_type", "differential").unwrap();
        assert_eq!(
            store.get_meta("export_type").unwrap().as_deref(),
            Some("differential")
        );
        assert!(store.delete_meta("export_type").unwrap());
        assert!(store.get_meta("export_type").unwrap().is_none());
    }

    #[test]
    fn export_and_reimport_preserves_objects() {
        let mut store = store();
        let put = store.put_object(b"roundtrip via export", ObjectKind::Blob).unwrap();
        store.set_ref("refs/heads/main", put.hash, "branch").unwrap();

        let bytes = store.export_bytes().unwrap();
        let reopened = ObjectStore::from_bytes(&bytes, RepoConfig::default()).unwrap();
        assert!(reopened.has_object(&put.hash).unwrap());
        assert_eq!(reopened.get_ref("refs/heads/main").unwrap().unwrap().hash, put.hash);
        let _ = store.with_transaction(|_tx| Ok(()));
    }

    #[test]
    fn raw_transaction_rollback_discards_writes_inside_it() {
        let store = store();
        store.begin_transaction().unwrap();
        let put = store.put_object(b"should vanish", ObjectKind::Blob).unwrap();
        assert!(store.has_object(&put.hash).unwrap());
        store.rollback_transaction().unwrap();
        assert!(!store.has_object(&put.hash).unwrap());
    }

    #[test]
    fn raw_transaction_commit_keeps_writes_inside_it() {
        let store = store();
        store.begin_transaction().unwrap();
        let put = store.put_object(b"should persist", ObjectKind::Blob).unwrap();
        store.commit_transaction().unwrap();
        assert!(store.has_object(&put.hash).unwrap());
    }
}
