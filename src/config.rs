//! Tunables for the object store and repository controller.
//!
//! Everything the spec leaves as a named constant (`Kd`, `Tmin`, `Dmax`, the
//! binary-detection window, ...) lives here instead of being hardcoded, so a
//! caller embedding the engine can tighten or loosen policy without
//! recompiling.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RepoConfig {
    /// Delta-size policy ratio `Kd`: a delta is rejected in favor of full
    /// storage when `len(delta) >= kd * len(new)`.
    pub kd: f64,
    /// Minimum new-content length `Tmin` below which delta encoding is
    /// skipped outright.
    pub t_min: usize,
    /// Maximum delta-chain depth `Dmax`. Writes that would exceed this
    /// materialize a full blob instead of chaining further.
    pub d_max: u32,
    /// Number of leading bytes scanned by the binary-content heuristic.
    pub binary_detection_window: usize,
    /// Fraction of non-printable bytes (outside `\t \n \r`) above which a
    /// file is declared binary.
    pub binary_nonprintable_ratio: f64,
    /// Fraction of the database file's pages that may sit on the freelist
    /// (reclaimable space left behind by deleted rows) before
    /// `stats::size_summary` flags "needs optimisation".
    pub overhead_warn_ratio: f64,
    /// Default author name used when a commit omits one.
    pub default_author_name: String,
    /// Default author email used when a commit omits one.
    pub default_author_email: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            kd: 0.9,
            t_min: 256,
            d_max: 16,
            binary_detection_window: 8192,
            binary_nonprintable_ratio: 0.30,
            overhead_warn_ratio: 0.10,
            default_author_name: "Unknown".to_string(),
            default_author_email: "unknown@example.com".to_string(),
        }
    }
}
