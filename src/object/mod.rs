//! Object schema (C5): the three object kinds that make up the content-addressed graph,
//! and the common [`GitObject`] trait that ties encoding, decoding and hashing together.

pub mod blob;
pub mod commit;
pub mod tree;

pub use blob::Blob;
pub use commit::Commit;
pub use tree::{EntryKind, Tree, TreeEntry};

use std::fmt;

use crate::errors::{Result, VcsError};
use crate::hash::ObjectHash;

/// Discriminates the three stored object kinds. Stored alongside each object row so a raw
/// `(hash, data)` pair can be reinterpreted without guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Blob => write!(f, "blob"),
            ObjectKind::Tree => write!(f, "tree"),
            ObjectKind::Commit => write!(f, "commit"),
        }
    }
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(ObjectKind::Blob),
            "tree" => Ok(ObjectKind::Tree),
            "commit" => Ok(ObjectKind::Commit),
            other => Err(VcsError::integrity(format!("unknown object kind {other:?}"))),
        }
    }
}

/// Common interface shared by blobs, trees and commits: serialize to the bytes that get
/// hashed and stored, and parse those bytes back.
pub trait GitObject: Sized {
    fn kind() -> ObjectKind;

    /// Canonical byte encoding. The object's content hash is `ObjectHash::of(self.encode())`
    /// for blobs; trees and commits hash their own encoding the same way (spec §4.5).
    fn encode(&self) -> Vec<u8>;

    fn decode(bytes: &[u8]) -> Result<Self>;

    /// Content hash of this object's canonical encoding.
    fn hash(&self) -> ObjectHash {
        ObjectHash::of(&self.encode())
    }
}
