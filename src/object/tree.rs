//! Tree objects: an ordered directory snapshot (spec §4.5). Entries are length-prefixed and
//! sorted ascending by name so that two trees with the same contents always encode to the same
//! bytes, which is what makes tree hashes canonical.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use super::{GitObject, ObjectKind};
use crate::errors::{Result, VcsError};
use crate::hash::ObjectHash;

/// Whether a tree entry points at a file (blob) or a subdirectory (tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Tree,
}

impl EntryKind {
    fn tag(self) -> u8 {
        match self {
            EntryKind::File => 0,
            EntryKind::Tree => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(EntryKind::File),
            1 => Ok(EntryKind::Tree),
            other => Err(VcsError::integrity(format!("unknown tree entry tag {other}"))),
        }
    }
}

/// One named entry in a tree: a file or a subdirectory, with the metadata needed to answer
/// status/diff queries without re-reading the underlying blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
    pub hash: ObjectHash,
    pub mode: u32,
    pub size: u64,
    pub binary: bool,
}

/// A directory snapshot: a sorted, deduplicated-by-name list of entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree from entries, sorting them by name so the encoding is canonical.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Tree { entries }
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GitObject for Tree {
    fn kind() -> ObjectKind {
        ObjectKind::Tree
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.write_u32::<BigEndian>(entry.mode).unwrap();
            out.push(entry.kind.tag());
            out.extend_from_slice(entry.hash.as_bytes());
            out.write_u64::<BigEndian>(entry.size).unwrap();
            out.push(u8::from(entry.binary));
            let name_bytes = entry.name.as_bytes();
            out.write_u32::<BigEndian>(name_bytes.len() as u32).unwrap();
            out.extend_from_slice(name_bytes);
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let mut entries = Vec::new();

        while (cursor.position() as usize) < bytes.len() {
            let mode = cursor
                .read_u32::<BigEndian>()
                .map_err(|e| VcsError::integrity(format!("truncated tree entry (mode): {e}")))?;
            let mut tag = [0u8; 1];
            cursor
                .read_exact(&mut tag)
                .map_err(|e| VcsError::integrity(format!("truncated tree entry (tag): {e}")))?;
            let kind = EntryKind::from_tag(tag[0])?;

            let mut hash_bytes = [0u8; ObjectHash::LEN];
            cursor
                .read_exact(&mut hash_bytes)
                .map_err(|e| VcsError::integrity(format!("truncated tree entry (hash): {e}")))?;
            let hash = ObjectHash::from_bytes(&hash_bytes).map_err(VcsError::integrity)?;

            let size = cursor
                .read_u64::<BigEndian>()
                .map_err(|e| VcsError::integrity(format!("truncated tree entry (size): {e}")))?;

            let mut binary_byte = [0u8; 1];
            cursor
                .read_exact(&mut binary_byte)
                .map_err(|e| VcsError::integrity(format!("truncated tree entry (binary): {e}")))?;
            let binary = binary_byte[0] != 0;

            let name_len = cursor
                .read_u32::<BigEndian>()
                .map_err(|e| VcsError::integrity(format!("truncated tree entry (name len): {e}")))?
                as usize;
            let mut name_bytes = vec![0u8; name_len];
            cursor
                .read_exact(&mut name_bytes)
                .map_err(|e| VcsError::integrity(format!("truncated tree entry (name): {e}")))?;
            let name = String::from_utf8(name_bytes)
                .map_err(|e| VcsError::integrity(format!("tree entry name is not utf-8: {e}")))?;

            entries.push(TreeEntry {
                name,
                kind,
                hash,
                mode,
                size,
                binary,
            });
        }

        Ok(Tree { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, kind: EntryKind) -> TreeEntry {
        TreeEntry {
            name: name.to_string(),
            kind,
            hash: ObjectHash::of(name.as_bytes()),
            mode: 0o100644,
            size: 42,
            binary: false,
        }
    }

    #[test]
    fn entries_are_sorted_by_name() {
        let tree = Tree::new(vec![
            entry("zeta.txt", EntryKind::File),
            entry("alpha.txt", EntryKind::File),
            entry("mid", EntryKind::Tree),
        ]);
        let names: Vec<_> = tree.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha.txt", "mid", "zeta.txt"]);
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let tree = Tree::new(vec![entry("a.txt", EntryKind::File), entry("sub", EntryKind::Tree)]);
        let decoded = Tree::decode(&tree.encode()).unwrap();
        assert_eq!(tree, decoded);
    }

    #[test]
    fn same_contents_produce_same_hash_regardless_of_input_order() {
        let a = Tree::new(vec![entry("b", EntryKind::File), entry("a", EntryKind::File)]);
        let b = Tree::new(vec![entry("a", EntryKind::File), entry("b", EntryKind::File)]);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn truncated_bytes_are_a_decode_error() {
        let tree = Tree::new(vec![entry("a.txt", EntryKind::File)]);
        let mut bytes = tree.encode();
        bytes.truncate(bytes.len() - 2);
        assert!(Tree::decode(&bytes).is_err());
    }
}
