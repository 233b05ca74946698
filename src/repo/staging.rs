//! The staging set and removal set held by the repository controller (spec §4.6): the changes
//! that will go into the next commit, kept in memory and mirrored into each mutating
//! operation's transaction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::hash::ObjectHash;

/// One staged file: enough metadata to build a tree entry without re-reading the blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedEntry {
    pub hash: ObjectHash,
    pub size: u64,
    pub binary: bool,
    pub mode: u32,
}

/// Outcome of [`Staging::unstage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnstageAction {
    Unstaged,
    Unremoved,
    NotFound,
}

/// In-memory staging area: paths staged for addition/modification, and paths marked for
/// removal. A path is never in both sets at once.
#[derive(Debug, Clone, Default)]
pub struct Staging {
    added: BTreeMap<String, StagedEntry>,
    removed: BTreeSet<String>,
}

impl Staging {
    pub fn new() -> Self {
        Staging::default()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Stage `path` for addition/modification, clearing any pending removal mark.
    pub fn stage(&mut self, path: impl Into<String>, entry: StagedEntry) {
        let path = path.into();
        self.removed.remove(&path);
        self.added.insert(path, entry);
    }

    /// Mark `path` for deletion, clearing any pending staged content.
    pub fn mark_removed(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.added.remove(&path);
        self.removed.insert(path);
    }

    /// Undo whichever pending change `path` has. Returns which kind of change was undone.
    pub fn unstage(&mut self, path: &str) -> UnstageAction {
        if self.added.remove(path).is_some() {
            UnstageAction::Unstaged
        } else if self.removed.remove(path) {
            UnstageAction::Unremoved
        } else {
            UnstageAction::NotFound
        }
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.removed.clear();
    }

    /// Drop only the staged additions (`reset --mixed`); pair with `clear_removed` for
    /// `reset --hard`.
    pub fn clear_added(&mut self) {
        self.added.clear();
    }

    /// Drop only the removal set (used by `reset --mixed`, which keeps staged adds).
    pub fn clear_removed(&mut self) {
        self.removed.clear();
    }

    pub fn added(&self) -> impl Iterator<Item = (&str, &StagedEntry)> {
        self.added.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.removed.iter().map(|s| s.as_str())
    }

    pub fn get(&self, path: &str) -> Option<&StagedEntry> {
        self.added.get(path)
    }

    pub fn is_removed(&self, path: &str) -> bool {
        self.removed.contains(path)
    }

    pub fn staged_paths(&self) -> Vec<String> {
        self.added.keys().cloned().collect()
    }

    pub fn removed_paths(&self) -> Vec<String> {
        self.removed.iter().cloned().collect()
    }
}

/// Serializable snapshot of a [`Staging`] set, written into the `staging_area` metadata key so
/// a reopened repository can rehydrate in-flight work (spec §9 design note).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagingSnapshot {
    pub added: BTreeMap<String, StagedEntry>,
    pub removed: BTreeSet<String>,
}

impl Staging {
    pub fn to_snapshot(&self) -> StagingSnapshot {
        StagingSnapshot {
            added: self.added.clone(),
            removed: self.removed.clone(),
        }
    }

    pub fn from_snapshot(snapshot: StagingSnapshot) -> Self {
        Staging {
            added: snapshot.added,
            removed: snapshot.removed,
        }
    }
}
