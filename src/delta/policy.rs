//! Write-path policy (spec §4.3): decide whether a new blob is worth storing as a delta
//! against a candidate base, or should fall back to a full copy.
//!
//! The policy is deliberately conservative: small objects never pay the per-delta overhead,
//! and a delta is only kept when it measurably beats the full-copy size by the configured
//! ratio `kd`.

use crate::config::RepoConfig;
use crate::hash::ObjectHash;

use super::encode::DeltaDiff;

/// Why a candidate blob ended up stored the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreReason {
    /// Stored as a full copy: no base was supplied.
    NoBaseHash,
    /// Stored as a full copy: the named base object does not exist.
    BaseNotFound,
    /// Stored as a full copy: the new content is smaller than `t_min`, so delta overhead
    /// isn't worth it regardless of similarity.
    FileTooSmall,
    /// Stored as a full copy: the delta encoding did not beat `kd * full_size`.
    InsufficientSimilarity,
    /// Stored as a full copy because there was nothing better to do with it.
    OkFull,
    /// Stored as a delta against `base_hash`.
    OkDelta,
}

/// Outcome of applying the write-path policy to one candidate blob.
#[derive(Debug, Clone)]
pub struct DeltaPlan {
    /// The bytes that should actually be persisted (either `new` verbatim, or a delta stream).
    pub payload: Vec<u8>,
    /// Whether `payload` is a delta (`true`) or the full object (`false`).
    pub used_delta: bool,
    /// The base object the delta was computed against, if any.
    pub base_hash: Option<ObjectHash>,
    /// Size of the encoded payload actually chosen.
    pub stored_size: usize,
    /// Size of the uncompressed candidate content.
    pub full_size: usize,
    /// `stored_size / full_size`, for diagnostics and `overhead_warn_ratio` checks.
    pub compression_ratio: f64,
    /// Why this particular outcome was chosen.
    pub reason: StoreReason,
}

/// Decide how `new` should be stored given an optional candidate base.
///
/// `base` is `None` when no base hash was supplied, or when the caller already
/// determined the named base object doesn't exist (distinguished via `base_missing`).
pub fn plan_store(
    new: &[u8],
    base_hash: Option<ObjectHash>,
    base: Option<&[u8]>,
    config: &RepoConfig,
) -> DeltaPlan {
    let full_size = new.len();

    let no_base_plan = |reason: StoreReason| DeltaPlan {
        payload: new.to_vec(),
        used_delta: false,
        base_hash: None,
        stored_size: full_size,
        full_size,
        compression_ratio: 1.0,
        reason,
    };

    let base_hash = match base_hash {
        Some(h) => h,
        None => return no_base_plan(StoreReason::NoBaseHash),
    };
    let base = match base {
        Some(b) => b,
        None => return no_base_plan(StoreReason::BaseNotFound),
    };

    if full_size < config.t_min {
        return no_base_plan(StoreReason::FileTooSmall);
    }

    let diff = DeltaDiff::new(base, new);
    let delta_bytes = diff.encode();
    let delta_size = delta_bytes.len();

    // A delta must beat kd * full_size to be worth the indirection, matching the
    // intent of diff.similarity() as a secondary signal: high similarity and a small
    // encoded delta should usually agree, but the size threshold is authoritative.
    // Equality falls back to full storage (spec: fallback triggers at len(delta) >= kd * len(new)).
    if (delta_size as f64) < config.kd * full_size as f64 {
        DeltaPlan {
            payload: delta_bytes,
            used_delta: true,
            base_hash: Some(base_hash),
            stored_size: delta_size,
            full_size,
            compression_ratio: delta_size as f64 / full_size as f64,
            reason: StoreReason::OkDelta,
        }
    } else {
        DeltaPlan {
            payload: new.to_vec(),
            used_delta: false,
            base_hash: None,
            stored_size: full_size,
            full_size,
            compression_ratio: 1.0,
            reason: StoreReason::InsufficientSimilarity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ObjectHash;

    fn cfg() -> RepoConfig {
        RepoConfig::default()
    }

    #[test]
    fn no_base_hash_stores_full() {
        let plan = plan_store(b"some content here", None, None, &cfg());
        assert!(!plan.used_delta);
        assert_eq!(plan.reason, StoreReason::NoBaseHash);
    }

    #[test]
    fn base_not_found_stores_full() {
        let hash = ObjectHash::of(b"base");
        let plan = plan_store(b"some content here", Some(hash), None, &cfg());
        assert!(!plan.used_delta);
        assert_eq!(plan.reason, StoreReason::BaseNotFound);
    }

    #[test]
    fn tiny_content_stores_full_even_with_identical_base() {
        let base = b"hi";
        let hash = ObjectHash::of(base);
        let plan = plan_store(b"hi!", Some(hash), Some(base.as_slice()), &cfg());
        assert_eq!(plan.reason, StoreReason::FileTooSmall);
    }

    #[test]
    fn near_identical_large_content_uses_delta() {
        let base = "Lorem ipsum dolor sit amet consectetur ".repeat(50);
        let mut new = base.clone();
        new.push_str("trailing addition");
        let hash = ObjectHash::of(base.as_bytes());

        let plan = plan_store(new.as_bytes(), Some(hash), Some(base.as_bytes()), &cfg());
        assert!(plan.used_delta);
        assert_eq!(plan.reason, StoreReason::OkDelta);
        assert!(plan.stored_size < plan.full_size);
    }

    #[test]
    fn unrelated_large_content_stores_full() {
        let base = "A".repeat(500);
        let new = "B".repeat(500);
        let hash = ObjectHash::of(base.as_bytes());

        let plan = plan_store(new.as_bytes(), Some(hash), Some(base.as_bytes()), &cfg());
        assert!(!plan.used_delta);
        assert_eq!(plan.reason, StoreReason::InsufficientSimilarity);
    }
}
