//! Error types for the versant core engine.
//!
//! A single enumeration covers every failure the repository controller,
//! object store, merge engine and branch transfer can produce. Variants are
//! grouped by cause, not by the subsystem that raised them, so callers can
//! match on "what kind of thing went wrong" without caring which module
//! noticed it first.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VcsError>;

#[derive(Error, Debug)]
/// Unified error enumeration for the versant library.
pub enum VcsError {
    /// Object, reference, commit or path absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unparseable ref, empty author on commit, unknown reset mode, etc.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Already-exists branch, delete-current-branch, merge conflicts.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Commit with empty staging/removals, create-branch with no commits yet.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A tree entry or delta base points at an object that does not exist.
    #[error("integrity error: {0}")]
    IntegrityError(String),

    /// Underlying SQL engine failure.
    #[error("storage error: {0}")]
    StorageError(#[from] rusqlite::Error),

    /// I/O failure while reading/writing a byte image.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl VcsError {
    pub fn not_found(what: impl Into<String>) -> Self {
        VcsError::NotFound(what.into())
    }

    pub fn invalid_argument(what: impl Into<String>) -> Self {
        VcsError::InvalidArgument(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        VcsError::Conflict(what.into())
    }

    pub fn precondition(what: impl Into<String>) -> Self {
        VcsError::PreconditionFailed(what.into())
    }

    pub fn integrity(what: impl Into<String>) -> Self {
        VcsError::IntegrityError(what.into())
    }
}
