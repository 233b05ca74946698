//! Status & stats (C9): aggregate size/compression reporting over the object store
//! (spec §4.9).

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::repo::Repository;

/// Aggregate counters for one repository's object store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StoreStats {
    pub object_count: u64,
    pub total_compressed: u64,
    pub total_uncompressed: u64,
    pub compression_ratio: f64,
    pub blob_count: u64,
    pub delta_count: u64,
    pub avg_delta_size: f64,
    pub unique_bases: u64,
}

/// Human-facing summary built from [`StoreStats`] plus the on-disk file size, if known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SizeSummary {
    pub stats: StoreStats,
    pub db_overhead: f64,
    pub needs_optimisation: bool,
    pub message: String,
}

impl Repository {
    pub fn stats(&self) -> Result<StoreStats> {
        let raw = self.store().raw_stats()?;
        let compression_ratio = if raw.total_uncompressed == 0 {
            1.0
        } else {
            raw.total_compressed as f64 / raw.total_uncompressed as f64
        };
        let avg_delta_size = if raw.delta_count == 0 {
            0.0
        } else {
            raw.total_delta_payload as f64 / raw.delta_count as f64
        };

        Ok(StoreStats {
            object_count: raw.object_count,
            total_compressed: raw.total_compressed,
            total_uncompressed: raw.total_uncompressed,
            compression_ratio,
            blob_count: raw.blob_count,
            delta_count: raw.delta_count,
            avg_delta_size,
            unique_bases: raw.unique_bases,
        })
    }

    /// `size_summary` per spec §4.9: flags "needs optimisation" once database overhead exceeds
    /// `overhead_warn_ratio` (default 10%) of the file's actual page count. Overhead here is the
    /// fraction of the underlying database file sitting on SQLite's freelist — space vacated by
    /// deleted rows (typically after a `garbage_collect` pass) that has not yet been reclaimed.
    pub fn size_summary(&self) -> Result<SizeSummary> {
        let stats = self.stats()?;
        let (freelist_pages, page_count) = self.store().page_stats()?;
        let db_overhead = if page_count == 0 {
            0.0
        } else {
            freelist_pages as f64 / page_count as f64
        };
        let needs_optimisation = db_overhead > self.store().config().overhead_warn_ratio;

        let message = if needs_optimisation {
            format!(
                "{} objects, {:.1}% database overhead — consider compacting the database",
                stats.object_count,
                db_overhead * 100.0
            )
        } else {
            format!(
                "{} objects, {:.1}% database overhead",
                stats.object_count,
                db_overhead * 100.0
            )
        };

        Ok(SizeSummary {
            stats,
            db_overhead,
            needs_optimisation,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepoConfig;
    use crate::repo::ResetMode;

    #[test]
    fn stats_reflect_committed_objects() {
        let mut repo = Repository::open_in_memory(RepoConfig::default()).unwrap();
        repo.add("a.txt", b"hello world", None).unwrap();
        repo.commit("first", None, None).unwrap();

        let stats = repo.stats().unwrap();
        assert!(stats.object_count >= 3); // blob + tree + commit
        assert!(stats.blob_count >= 1);
    }

    #[test]
    fn size_summary_is_not_flagged_for_a_small_fresh_repo() {
        let mut repo = Repository::open_in_memory(RepoConfig::default()).unwrap();
        repo.add("a.txt", b"hello world", None).unwrap();
        repo.commit("first", None, None).unwrap();

        let summary = repo.size_summary().unwrap();
        assert!(!summary.needs_optimisation);
    }

    #[test]
    fn size_summary_flags_needs_optimisation_after_heavy_churn_and_gc() {
        let mut repo = Repository::open_in_memory(RepoConfig::default()).unwrap();
        repo.add("seed.txt", b"seed", None).unwrap();
        repo.commit("seed", None, None).unwrap();

        // Stage and discard a large number of never-committed blobs: each becomes
        // unreachable the moment `reset --hard` clears the staging set, so `garbage_collect`
        // frees a correspondingly large number of database pages onto the freelist without
        // shrinking the file.
        for i in 0..200u32 {
            let content = vec![(i % 251) as u8; 4096];
            repo.add(&format!("orphan{i}.bin"), &content, None).unwrap();
            repo.reset(ResetMode::Hard, None).unwrap();
        }
        repo.garbage_collect().unwrap();

        let summary = repo.size_summary().unwrap();
        assert!(
            summary.needs_optimisation,
            "expected heavy churn + GC to push overhead above the warn ratio, got {summary:?}"
        );
    }
}
