//! Repository controller (C6): the staging set, the removal set, and every operation that
//! mutates or inspects one branch's history (spec §4.6).
//!
//! A working tree is modelled as a single flat [`Tree`] keyed by full relative path (`"src/
//! lib.rs"`, not nested per-directory trees) — the staging set is itself flat, and collapsing
//! to one tree per commit keeps the add/commit/diff contracts in this module simple without
//! losing anything the spec's operations actually require.

pub mod staging;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::RepoConfig;
use crate::diff::{FileDiff, diff_bytes};
use crate::errors::{Result, VcsError};
use crate::hash::{ObjectHash, is_binary};
use crate::object::{Commit, EntryKind, GitObject, ObjectKind, Tree, TreeEntry};
use crate::store::ObjectStore;

use staging::{StagedEntry, Staging, StagingSnapshot, UnstageAction};

const HEAD_BRANCH_META_KEY: &str = "current_branch";
const STAGING_META_KEY: &str = "staging_area";
const AUTHOR_NAME_META_KEY: &str = "author.name";
const AUTHOR_EMAIL_META_KEY: &str = "author.email";
const DEFAULT_BRANCH: &str = "main";

pub(crate) fn branch_ref(name: &str) -> String {
    format!("refs/heads/{name}")
}

/// How far `reset` rolls back staging state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    Soft,
    Mixed,
    Hard,
}

#[derive(Debug, Clone)]
pub struct AddResult {
    pub path: String,
    pub hash: ObjectHash,
    pub binary: bool,
    pub size: u64,
    pub is_new: bool,
}

#[derive(Debug, Clone)]
pub struct CommitResult {
    pub commit_hash: ObjectHash,
    pub tree_hash: ObjectHash,
    pub message: String,
    pub author: String,
    pub timestamp: i64,
    pub branch: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutResult {
    pub files: Vec<(String, Vec<u8>)>,
    pub files_metadata: Vec<TreeEntry>,
}

#[derive(Debug, Clone)]
pub struct StatusResult {
    pub current_branch: String,
    pub head: Option<ObjectHash>,
    pub staged: Vec<String>,
    pub deleted: Vec<String>,
    pub object_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone)]
pub struct DiffEntry {
    pub file: String,
    pub change: ChangeType,
    pub hash_a: Option<ObjectHash>,
    pub hash_b: Option<ObjectHash>,
    pub diff: FileDiff,
}

#[derive(Debug, Clone, Copy)]
pub struct GcResult {
    pub total_objects: u64,
    pub reachable: u64,
    pub deleted: u64,
    pub duration_ms: u64,
}

/// Progress update emitted by long-running operations (spec §5: GC and large imports report
/// progress through an opt-in callback rather than any cancellation/timeout mechanism).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Objects processed so far.
    pub done: u64,
    /// Total objects the operation expects to process.
    pub total: u64,
}

/// One repository: the object store plus the staging/removal sets and the current branch.
pub struct Repository {
    store: ObjectStore,
    staging: Staging,
    current_branch: String,
    debug: bool,
}

impl Repository {
    /// Open (creating if absent) a repository rooted at `path`.
    pub fn open(path: impl AsRef<Path>, config: RepoConfig) -> Result<Self> {
        let store = ObjectStore::open(path, config)?;
        Self::from_store(store)
    }

    pub fn open_in_memory(config: RepoConfig) -> Result<Self> {
        let store = ObjectStore::open_in_memory(config)?;
        Self::from_store(store)
    }

    fn from_store(store: ObjectStore) -> Result<Self> {
        let current_branch = store
            .get_meta(HEAD_BRANCH_META_KEY)?
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        store.set_meta(HEAD_BRANCH_META_KEY, &current_branch)?;

        let staging = match store.get_meta(STAGING_META_KEY)? {
            Some(json) => match serde_json::from_str::<StagingSnapshot>(&json) {
                Ok(snapshot) => {
                    let mut staged = Staging::from_snapshot(snapshot);
                    // Drop any staged entry whose blob no longer exists (e.g. a prior GC ran
                    // against a store that never persisted this staging snapshot).
                    let stale: Vec<String> = staged
                        .added()
                        .filter(|(_, entry)| !store.has_object(&entry.hash).unwrap_or(false))
                        .map(|(path, _)| path.to_string())
                        .collect();
                    for path in stale {
                        staged.unstage(&path);
                    }
                    staged
                }
                Err(_) => Staging::new(),
            },
            None => Staging::new(),
        };

        Ok(Repository {
            store,
            staging,
            current_branch,
            debug: false,
        })
    }

    fn persist_staging(&self) -> Result<()> {
        let snapshot = self.staging.to_snapshot();
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| VcsError::integrity(format!("failed to serialize staging area: {e}")))?;
        self.store.set_meta(STAGING_META_KEY, &json)
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Set the repository-wide default author identity (spec §6 "authorship metadata"),
    /// persisted in the metadata table and consulted by `commit` whenever a caller omits
    /// `author`/`email`.
    pub fn set_default_author(&mut self, name: &str, email: &str) -> Result<()> {
        self.store.set_meta(AUTHOR_NAME_META_KEY, name)?;
        self.store.set_meta(AUTHOR_EMAIL_META_KEY, email)?;
        Ok(())
    }

    pub fn current_branch(&self) -> &str {
        &self.current_branch
    }

    pub(crate) fn head_hash(&self) -> Result<Option<ObjectHash>> {
        Ok(self.store.get_ref(&branch_ref(&self.current_branch))?.map(|r| r.hash))
    }

    pub(crate) fn load_commit(&self, hash: ObjectHash) -> Result<Commit> {
        let obj = self
            .store
            .get_object(&hash)?
            .ok_or_else(|| VcsError::not_found(format!("commit {hash} not found")))?;
        if obj.kind != ObjectKind::Commit {
            return Err(VcsError::integrity(format!("{hash} is not a commit")));
        }
        Commit::decode(&obj.data)
    }

    pub(crate) fn load_tree(&self, hash: ObjectHash) -> Result<Tree> {
        let obj = self
            .store
            .get_object(&hash)?
            .ok_or_else(|| VcsError::not_found(format!("tree {hash} not found")))?;
        if obj.kind != ObjectKind::Tree {
            return Err(VcsError::integrity(format!("{hash} is not a tree")));
        }
        Tree::decode(&obj.data)
    }

    pub(crate) fn head_tree(&self) -> Result<Tree> {
        match self.head_hash()? {
            Some(commit_hash) => {
                let commit = self.load_commit(commit_hash)?;
                self.load_tree(commit.tree)
            }
            None => Ok(Tree::default()),
        }
    }

    /// The tree that `commit()` would write right now: HEAD's tree with the removal set
    /// dropped and the staging set overlaid.
    fn effective_tree(&self) -> Result<Tree> {
        let head = self.head_tree()?;
        let mut by_name: BTreeMap<String, TreeEntry> =
            head.entries.into_iter().map(|e| (e.name.clone(), e)).collect();

        for path in self.staging.removed() {
            by_name.remove(path);
        }
        for (path, staged) in self.staging.added() {
            by_name.insert(
                path.to_string(),
                TreeEntry {
                    name: path.to_string(),
                    kind: EntryKind::File,
                    hash: staged.hash,
                    mode: staged.mode,
                    size: staged.size,
                    binary: staged.binary,
                },
            );
        }

        Ok(Tree::new(by_name.into_values().collect()))
    }

    // -- working tree operations -------------------------------------------

    pub fn add(&mut self, path: &str, bytes: &[u8], force_binary: Option<bool>) -> Result<AddResult> {
        if path.is_empty() {
            return Err(VcsError::invalid_argument("path must not be empty"));
        }
        let binary = force_binary.unwrap_or_else(|| is_binary(bytes, Some(path), self.store.config()));

        let base_hash = self.head_tree().ok().and_then(|tree| tree.get(path).map(|e| e.hash));
        let stored = self.store.store_blob_with_delta(bytes, base_hash)?;

        self.staging.stage(
            path,
            StagedEntry {
                hash: stored.hash,
                size: bytes.len() as u64,
                binary,
                mode: 0o100644,
            },
        );

        self.persist_staging()?;
        debug!(path, used_delta = stored.used_delta, "staged file");
        Ok(AddResult {
            path: path.to_string(),
            hash: stored.hash,
            binary,
            size: bytes.len() as u64,
            is_new: stored.is_new,
        })
    }

    pub fn rm(&mut self, paths: &[String]) -> Result<usize> {
        let head = self.head_tree()?;
        let mut removed_count = 0;
        for path in paths {
            let present = head.get(path).is_some() || self.staging.get(path).is_some();
            if present {
                self.staging.mark_removed(path.clone());
                removed_count += 1;
            }
        }
        self.persist_staging()?;
        Ok(removed_count)
    }

    pub fn unstage(&mut self, path: &str) -> Result<UnstageAction> {
        let action = self.staging.unstage(path);
        self.persist_staging()?;
        Ok(action)
    }

    pub fn reset(&mut self, mode: ResetMode, target_ref: Option<&str>) -> Result<()> {
        if let Some(target) = target_ref {
            let hash = self
                .resolve_ref(target)?
                .ok_or_else(|| VcsError::not_found(format!("ref {target} not found")))?;
            self.store.set_ref(&branch_ref(&self.current_branch), hash, "branch")?;
        }

        match mode {
            ResetMode::Soft => {}
            ResetMode::Mixed => self.staging.clear_added(),
            ResetMode::Hard => self.staging.clear(),
        }
        self.persist_staging()?;
        Ok(())
    }

    pub fn commit(
        &mut self,
        message: &str,
        author: Option<&str>,
        email: Option<&str>,
    ) -> Result<CommitResult> {
        if self.staging.is_empty() {
            return Err(VcsError::precondition("nothing staged to commit"));
        }
        self.in_transaction(|this| this.commit_locked(message, author, email))
    }

    fn commit_locked(
        &mut self,
        message: &str,
        author: Option<&str>,
        email: Option<&str>,
    ) -> Result<CommitResult> {
        let tree = self.effective_tree()?;
        let tree_bytes = tree.encode();
        let tree_put = self.store.put_object(&tree_bytes, ObjectKind::Tree)?;

        let parents = match self.head_hash()? {
            Some(h) => vec![h],
            None => vec![],
        };

        let author_name = match author {
            Some(a) => a.to_string(),
            None => self
                .store
                .get_meta(AUTHOR_NAME_META_KEY)?
                .unwrap_or_else(|| self.store.config().default_author_name.clone()),
        };
        let author_email = match email {
            Some(e) => e.to_string(),
            None => self
                .store
                .get_meta(AUTHOR_EMAIL_META_KEY)?
                .unwrap_or_else(|| self.store.config().default_author_email.clone()),
        };
        let timestamp = chrono::Utc::now().timestamp();

        let commit = Commit::new(
            tree_put.hash,
            parents,
            author_name.clone(),
            author_email,
            timestamp,
            message,
        );
        let commit_bytes = commit.encode();
        let commit_put = self.store.put_object(&commit_bytes, ObjectKind::Commit)?;

        self.store
            .set_ref(&branch_ref(&self.current_branch), commit_put.hash, "branch")?;
        self.staging.clear();
        self.persist_staging()?;

        info!(commit = %commit_put.hash, branch = %self.current_branch, "committed");
        Ok(CommitResult {
            commit_hash: commit_put.hash,
            tree_hash: tree_put.hash,
            message: message.to_string(),
            author: author_name,
            timestamp,
            branch: self.current_branch.clone(),
        })
    }

    pub fn checkout(&mut self, reference: &str, path: Option<&str>, write: bool) -> Result<CheckoutResult> {
        let hash = self
            .resolve_ref(reference)?
            .ok_or_else(|| VcsError::not_found(format!("ref {reference} not found")))?;
        let commit = self.load_commit(hash)?;
        let tree = self.load_tree(commit.tree)?;

        let entries: Vec<TreeEntry> = match path {
            Some(p) => tree.get(p).cloned().into_iter().collect(),
            None => tree.entries.clone(),
        };
        if path.is_some() && entries.is_empty() {
            return Err(VcsError::not_found(format!("{path:?} not found in {reference}")));
        }

        let mut files = Vec::with_capacity(entries.len());
        for entry in &entries {
            let obj = self
                .store
                .get_object(&entry.hash)?
                .ok_or_else(|| VcsError::integrity(format!("blob {} missing", entry.hash)))?;
            files.push((entry.name.clone(), obj.data));
        }

        if write {
            if path.is_none() {
                self.staging.clear();
            }
            for entry in &entries {
                self.staging.stage(
                    entry.name.clone(),
                    StagedEntry {
                        hash: entry.hash,
                        size: entry.size,
                        binary: entry.binary,
                        mode: entry.mode,
                    },
                );
            }
            self.persist_staging()?;
        }

        Ok(CheckoutResult {
            files,
            files_metadata: entries,
        })
    }

    pub fn get_file(&self, path: &str, commit_ref: Option<&str>) -> Result<Vec<u8>> {
        if let Some(reference) = commit_ref {
            let hash = self
                .resolve_ref(reference)?
                .ok_or_else(|| VcsError::not_found(format!("ref {reference} not found")))?;
            let commit = self.load_commit(hash)?;
            let tree = self.load_tree(commit.tree)?;
            let entry = tree
                .get(path)
                .ok_or_else(|| VcsError::not_found(format!("{path} not found in {reference}")))?;
            let obj = self
                .store
                .get_object(&entry.hash)?
                .ok_or_else(|| VcsError::integrity(format!("blob {} missing", entry.hash)))?;
            return Ok(obj.data);
        }

        if let Some(staged) = self.staging.get(path) {
            let obj = self
                .store
                .get_object(&staged.hash)?
                .ok_or_else(|| VcsError::integrity(format!("blob {} missing", staged.hash)))?;
            return Ok(obj.data);
        }
        if self.staging.is_removed(path) {
            return Err(VcsError::not_found(format!("not_staged: {path}")));
        }

        let head = self.head_tree()?;
        let entry = head
            .get(path)
            .ok_or_else(|| VcsError::not_found(format!("not_staged: {path}")))?;
        let obj = self
            .store
            .get_object(&entry.hash)?
            .ok_or_else(|| VcsError::integrity(format!("blob {} missing", entry.hash)))?;
        Ok(obj.data)
    }

    /// The current branch's history, most recent first, following first parents up to `limit`
    /// commits. Empty on a repository with no commits yet.
    pub fn log(&self, limit: usize) -> Result<Vec<Commit>> {
        let mut out = Vec::new();
        let mut current = self.head_hash()?;
        while let Some(hash) = current {
            if out.len() >= limit {
                break;
            }
            let commit = self.load_commit(hash)?;
            current = commit.parents.first().copied();
            out.push(commit);
        }
        Ok(out)
    }

    pub fn status(&self) -> Result<StatusResult> {
        let stats = self.store.raw_stats()?;
        Ok(StatusResult {
            current_branch: self.current_branch.clone(),
            head: self.head_hash()?,
            staged: self.staging.staged_paths(),
            deleted: self.staging.removed_paths(),
            object_count: stats.object_count,
        })
    }

    fn diff_trees(&self, from: &Tree, to: &Tree) -> Result<Vec<DiffEntry>> {
        let from_by_name: BTreeMap<&str, &TreeEntry> =
            from.entries.iter().map(|e| (e.name.as_str(), e)).collect();
        let to_by_name: BTreeMap<&str, &TreeEntry> =
            to.entries.iter().map(|e| (e.name.as_str(), e)).collect();

        let mut names: Vec<&str> = from_by_name.keys().chain(to_by_name.keys()).copied().collect();
        names.sort_unstable();
        names.dedup();

        let mut out = Vec::new();
        for name in names {
            let a = from_by_name.get(name).copied();
            let b = to_by_name.get(name).copied();
            match (a, b) {
                (None, Some(entry)) => {
                    let data = self.blob_bytes(entry.hash)?;
                    out.push(DiffEntry {
                        file: name.to_string(),
                        change: ChangeType::Added,
                        hash_a: None,
                        hash_b: Some(entry.hash),
                        diff: diff_bytes(&[], &data, Some(name), self.store.config()),
                    });
                }
                (Some(entry), None) => {
                    let data = self.blob_bytes(entry.hash)?;
                    out.push(DiffEntry {
                        file: name.to_string(),
                        change: ChangeType::Removed,
                        hash_a: Some(entry.hash),
                        hash_b: None,
                        diff: diff_bytes(&data, &[], Some(name), self.store.config()),
                    });
                }
                (Some(a_entry), Some(b_entry)) if a_entry.hash != b_entry.hash => {
                    let a_data = self.blob_bytes(a_entry.hash)?;
                    let b_data = self.blob_bytes(b_entry.hash)?;
                    out.push(DiffEntry {
                        file: name.to_string(),
                        change: ChangeType::Modified,
                        hash_a: Some(a_entry.hash),
                        hash_b: Some(b_entry.hash),
                        diff: diff_bytes(&a_data, &b_data, Some(name), self.store.config()),
                    });
                }
                _ => {}
            }
        }
        Ok(out)
    }

    pub(crate) fn blob_bytes(&self, hash: ObjectHash) -> Result<Vec<u8>> {
        Ok(self
            .store
            .get_object(&hash)?
            .ok_or_else(|| VcsError::integrity(format!("blob {hash} missing")))?
            .data)
    }

    /// Diff between two commits' trees (`to` defaults to the current HEAD).
    pub fn diff(&self, from_commit: &str, to_commit: Option<&str>) -> Result<Vec<DiffEntry>> {
        let from_hash = self
            .resolve_ref(from_commit)?
            .ok_or_else(|| VcsError::not_found(format!("ref {from_commit} not found")))?;
        let from_tree = self.load_tree(self.load_commit(from_hash)?.tree)?;

        let to_tree = match to_commit {
            Some(r) => {
                let hash = self
                    .resolve_ref(r)?
                    .ok_or_else(|| VcsError::not_found(format!("ref {r} not found")))?;
                self.load_tree(self.load_commit(hash)?.tree)?
            }
            None => self.head_tree()?,
        };

        self.diff_trees(&from_tree, &to_tree)
    }

    /// Diff between HEAD and the effective working tree (staged + removed changes).
    pub fn show_changes(&self) -> Result<Vec<DiffEntry>> {
        let head = self.head_tree()?;
        let working = self.effective_tree()?;
        self.diff_trees(&head, &working)
    }

    // -- branches -----------------------------------------------------------

    pub fn list_branches(&self) -> Result<Vec<String>> {
        let refs = self.store.list_refs()?;
        Ok(refs
            .into_iter()
            .filter(|(_, entry)| entry.kind == "branch")
            .filter_map(|(name, _)| name.strip_prefix("refs/heads/").map(str::to_string))
            .collect())
    }

    pub fn create_branch(&mut self, name: &str, from: Option<&str>) -> Result<()> {
        if self.store.get_ref(&branch_ref(name))?.is_some() {
            return Err(VcsError::conflict(format!("branch {name} already exists")));
        }
        let source = match from {
            Some(r) => self.resolve_ref(r)?,
            None => self.head_hash()?,
        };
        let hash = source
            .ok_or_else(|| VcsError::precondition("cannot create a branch with no commits yet"))?;
        self.store.set_ref(&branch_ref(name), hash, "branch")?;
        Ok(())
    }

    pub fn switch_branch(&mut self, name: &str) -> Result<()> {
        if self.store.get_ref(&branch_ref(name))?.is_none() {
            return Err(VcsError::not_found(format!("branch {name} not found")));
        }
        self.current_branch = name.to_string();
        self.store.set_meta(HEAD_BRANCH_META_KEY, name)?;
        self.staging.clear();
        self.persist_staging()?;
        Ok(())
    }

    pub fn delete_branch(&mut self, name: &str, run_gc: bool) -> Result<()> {
        if name == self.current_branch {
            return Err(VcsError::conflict("refusing to delete the current branch"));
        }
        if self.store.get_ref(&branch_ref(name))?.is_none() {
            return Err(VcsError::not_found(format!("branch {name} not found")));
        }
        self.store.remove_ref(&branch_ref(name))?;
        if run_gc {
            self.garbage_collect()?;
        }
        Ok(())
    }

    // -- ref resolution & GC --------------------------------------------------

    pub fn resolve_ref(&self, spec: &str) -> Result<Option<ObjectHash>> {
        if spec == "HEAD" {
            return self.head_hash();
        }
        if let Some(rest) = spec.strip_prefix("HEAD~") {
            let steps: usize = rest
                .parse()
                .map_err(|_| VcsError::invalid_argument(format!("invalid ref {spec:?}")))?;
            let mut current = match self.head_hash()? {
                Some(h) => h,
                None => return Ok(None),
            };
            for _ in 0..steps {
                let commit = self.load_commit(current)?;
                match commit.parents.first() {
                    Some(parent) => current = *parent,
                    None => return Ok(None),
                }
            }
            return Ok(Some(current));
        }
        if spec.len() == ObjectHash::HEX_LEN {
            if let Ok(hash) = spec.parse::<ObjectHash>() {
                return Ok(if self.store.has_object(&hash)? { Some(hash) } else { None });
            }
        }
        Ok(None)
    }

    pub fn garbage_collect(&mut self) -> Result<GcResult> {
        self.garbage_collect_with_progress(|_| {})
    }

    /// Same as [`Repository::garbage_collect`], but invokes `on_progress` after each object is
    /// considered for removal. Useful for repositories large enough that a caller wants to
    /// surface a progress bar; the callback is a no-op by default.
    pub fn garbage_collect_with_progress(
        &mut self,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<GcResult> {
        self.in_transaction(move |this| this.garbage_collect_locked(&mut on_progress))
    }

    fn garbage_collect_locked(&mut self, on_progress: &mut dyn FnMut(Progress)) -> Result<GcResult> {
        let start = Instant::now();
        let all = self.store.all_hashes()?;
        let total_objects = all.len() as u64;

        let mut reachable = std::collections::HashSet::new();
        for (_, entry) in self.store.list_refs()? {
            reachable.extend(self.store.reachable_from(entry.hash)?);
        }

        let mut deleted = 0u64;
        for (i, hash) in all.iter().enumerate() {
            if !reachable.contains(hash) && self.store.remove_object(hash)? {
                deleted += 1;
            }
            on_progress(Progress {
                done: i as u64 + 1,
                total: total_objects,
            });
        }

        info!(total_objects, reachable = reachable.len(), deleted, "garbage collected");
        Ok(GcResult {
            total_objects,
            reachable: reachable.len() as u64,
            deleted,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    pub(crate) fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut ObjectStore {
        &mut self.store
    }

    /// Run a multi-statement mutating sequence (commit, merge, import, GC) atomically (spec §5:
    /// "wraps multi-statement sequences ... in BEGIN/COMMIT/ROLLBACK. A failure inside a
    /// transaction rolls back and leaves the object graph intact"). `f`'s error is propagated
    /// after the rollback completes.
    pub(crate) fn in_transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.store.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.store.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                self.store.rollback_transaction()?;
                Err(err)
            }
        }
    }
}
