//! Commit objects: a tree snapshot plus authorship metadata and zero or more parents
//! (spec §4.5). Unlike the tree/blob encodings, a commit's wire form is a small text header
//! followed by a free-form message, which keeps commits human-readable when exported.

use super::{GitObject, ObjectKind};
use crate::errors::{Result, VcsError};
use crate::hash::ObjectHash;

/// A single point in the commit DAG: the tree it records, the commit(s) it follows, and who
/// made it. `parents` is empty for a root commit, has one entry for an ordinary commit, and
/// two or more for a merge (spec §3 leaves the exact parent-count convention to the
/// implementation; this one stores an explicit ordered list rather than deriving a second
/// parent from a branch reference).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectHash,
    pub parents: Vec<ObjectHash>,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: i64,
    pub message: String,
}

impl Commit {
    pub fn new(
        tree: ObjectHash,
        parents: Vec<ObjectHash>,
        author_name: impl Into<String>,
        author_email: impl Into<String>,
        timestamp: i64,
        message: impl Into<String>,
    ) -> Self {
        Commit {
            tree,
            parents,
            author_name: author_name.into(),
            author_email: author_email.into(),
            timestamp,
            message: message.into(),
        }
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First non-empty line of the message, used for one-line log summaries.
    pub fn summary(&self) -> &str {
        self.message
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or(self.message.as_str())
    }
}

fn parse_author_line(line: &str) -> Result<(String, String, i64)> {
    let rest = line
        .strip_prefix("author ")
        .ok_or_else(|| VcsError::integrity("commit missing author line"))?;

    let open = rest
        .find('<')
        .ok_or_else(|| VcsError::integrity("commit author line missing '<'"))?;
    let close = rest
        .find('>')
        .ok_or_else(|| VcsError::integrity("commit author line missing '>'"))?;
    if close < open {
        return Err(VcsError::integrity("commit author line has malformed email"));
    }

    let name = rest[..open].trim().to_string();
    let email = rest[open + 1..close].to_string();
    let timestamp = rest[close + 1..]
        .trim()
        .parse::<i64>()
        .map_err(|e| VcsError::integrity(format!("commit author timestamp invalid: {e}")))?;

    Ok((name, email, timestamp))
}

impl GitObject for Commit {
    fn kind() -> ObjectKind {
        ObjectKind::Commit
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str("tree ");
        out.push_str(&self.tree.to_hex());
        out.push('\n');

        for parent in &self.parents {
            out.push_str("parent ");
            out.push_str(&parent.to_hex());
            out.push('\n');
        }

        out.push_str(&format!(
            "author {} <{}> {}\n",
            self.author_name, self.author_email, self.timestamp
        ));
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| VcsError::integrity(format!("commit is not utf-8: {e}")))?;

        let mut lines = text.split('\n');

        let tree_line = lines
            .next()
            .ok_or_else(|| VcsError::integrity("commit is empty"))?;
        let tree_hex = tree_line
            .strip_prefix("tree ")
            .ok_or_else(|| VcsError::integrity("commit missing tree line"))?;
        let tree = tree_hex
            .parse::<ObjectHash>()
            .map_err(|e| VcsError::integrity(format!("commit tree hash invalid: {e}")))?;

        let mut parents = Vec::new();
        let mut line = lines
            .next()
            .ok_or_else(|| VcsError::integrity("commit missing author line"))?;
        while let Some(parent_hex) = line.strip_prefix("parent ") {
            let parent = parent_hex
                .parse::<ObjectHash>()
                .map_err(|e| VcsError::integrity(format!("commit parent hash invalid: {e}")))?;
            parents.push(parent);
            line = lines
                .next()
                .ok_or_else(|| VcsError::integrity("commit missing author line"))?;
        }

        let (author_name, author_email, timestamp) = parse_author_line(line)?;

        let blank = lines
            .next()
            .ok_or_else(|| VcsError::integrity("commit missing header/message separator"))?;
        if !blank.is_empty() {
            return Err(VcsError::integrity(
                "commit header must be followed by a blank line",
            ));
        }

        let message = lines.collect::<Vec<_>>().join("\n");

        Ok(Commit {
            tree,
            parents,
            author_name,
            author_email,
            timestamp,
            message,
        })
    }
}
