//! Blob objects: the raw byte content of one file version (spec §4.5). A blob carries no
//! framing of its own; the object store layer (C4) decides whether the bytes on disk are the
//! identity encoding or a delta against another blob, and always reconstructs identity bytes
//! before they reach this type.

use super::{GitObject, ObjectKind};
use crate::errors::Result;

/// A file version's content, addressed by the hash of its raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Blob { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl GitObject for Blob {
    fn kind() -> ObjectKind {
        ObjectKind::Blob
    }

    /// Identity encoding: a blob's on-wire form is exactly its content.
    fn encode(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Blob::new(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ObjectHash;

    #[test]
    fn hash_matches_raw_content() {
        let blob = Blob::new(b"hello world".to_vec());
        assert_eq!(blob.hash(), ObjectHash::of(b"hello world"));
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let blob = Blob::new(b"some file content\nwith a newline".to_vec());
        let decoded = Blob::decode(&blob.encode()).unwrap();
        assert_eq!(blob, decoded);
    }

    #[test]
    fn empty_blob_has_stable_hash() {
        let blob = Blob::new(Vec::new());
        assert_eq!(blob.hash(), ObjectHash::of(b""));
    }
}
