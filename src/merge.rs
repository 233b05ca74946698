//! Three-way merge engine (C7): merge-base discovery and the file-level resolution table from
//! spec §4.7.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::info;

use crate::errors::Result;
use crate::hash::ObjectHash;
use crate::object::{Commit, GitObject, ObjectKind, Tree, TreeEntry};
use crate::repo::{Repository, branch_ref};

/// Why a file could not be merged automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    BothAdded,
    DeletedModified,
    ModifiedDeleted,
    BothModified,
}

#[derive(Debug, Clone)]
pub struct MergeConflict {
    pub file: String,
    pub kind: ConflictKind,
}

#[derive(Debug, Clone)]
pub enum MergeOutcome {
    UpToDate,
    FastForward { commit_hash: ObjectHash },
    ThreeWay { commit_hash: ObjectHash },
    Conflict { conflicts: Vec<MergeConflict> },
}

impl Repository {
    /// Merge `target_branch` into the current branch.
    pub fn merge(&mut self, target_branch: &str) -> Result<MergeOutcome> {
        self.in_transaction(|this| this.merge_locked(target_branch))
    }

    fn merge_locked(&mut self, target_branch: &str) -> Result<MergeOutcome> {
        let a = self.head_hash()?;
        let b = self
            .store()
            .get_ref(&branch_ref(target_branch))?
            .map(|r| r.hash);

        let (a, b) = match (a, b) {
            (None, None) => return Ok(MergeOutcome::UpToDate),
            (None, Some(b)) => {
                self.store_mut()
                    .set_ref(&branch_ref(self.current_branch()), b, "branch")?;
                return Ok(MergeOutcome::FastForward { commit_hash: b });
            }
            (Some(_), None) => {
                return Err(crate::errors::VcsError::invalid_argument(format!(
                    "branch {target_branch} has no commits"
                )));
            }
            (Some(a), Some(b)) if a == b => return Ok(MergeOutcome::UpToDate),
            (Some(a), Some(b)) => (a, b),
        };

        let base = self.merge_base(a, b)?;
        if base == Some(a) {
            self.store_mut()
                .set_ref(&branch_ref(self.current_branch()), b, "branch")?;
            return Ok(MergeOutcome::FastForward { commit_hash: b });
        }
        if base == Some(b) {
            return Ok(MergeOutcome::UpToDate);
        }

        let a_tree = self.load_tree(self.load_commit(a)?.tree)?;
        let b_tree = self.load_tree(self.load_commit(b)?.tree)?;
        let o_tree = match base {
            Some(hash) => self.load_tree(self.load_commit(hash)?.tree)?,
            None => Tree::default(),
        };

        let (merged, conflicts) = resolve_three_way(&o_tree, &a_tree, &b_tree);
        if !conflicts.is_empty() {
            return Ok(MergeOutcome::Conflict { conflicts });
        }

        let tree_bytes = merged.encode();
        let tree_put = self.store_mut().put_object(&tree_bytes, ObjectKind::Tree)?;

        let author_name = self.store().config().default_author_name.clone();
        let author_email = self.store().config().default_author_email.clone();
        let message = format!("Merge branch '{target_branch}'");
        let commit = Commit::new(
            tree_put.hash,
            vec![a, b],
            author_name,
            author_email,
            chrono::Utc::now().timestamp(),
            message,
        );
        let commit_put = self.store_mut().put_object(&commit.encode(), ObjectKind::Commit)?;
        self.store_mut()
            .set_ref(&branch_ref(self.current_branch()), commit_put.hash, "branch")?;

        info!(commit = %commit_put.hash, target_branch, "merged");
        Ok(MergeOutcome::ThreeWay {
            commit_hash: commit_put.hash,
        })
    }

    /// Nearest common ancestor of `a` and `b`, found via simultaneous BFS from each side.
    fn merge_base(&self, a: ObjectHash, b: ObjectHash) -> Result<Option<ObjectHash>> {
        let mut visited_a: HashSet<ObjectHash> = HashSet::from([a]);
        let mut visited_b: HashSet<ObjectHash> = HashSet::from([b]);
        let mut queue_a: VecDeque<ObjectHash> = VecDeque::from([a]);
        let mut queue_b: VecDeque<ObjectHash> = VecDeque::from([b]);

        if visited_a.contains(&b) {
            return Ok(Some(b));
        }
        if visited_b.contains(&a) {
            return Ok(Some(a));
        }

        while !queue_a.is_empty() || !queue_b.is_empty() {
            if let Some(current) = queue_a.pop_front() {
                for parent in self.load_commit(current)?.parents {
                    if visited_b.contains(&parent) {
                        return Ok(Some(parent));
                    }
                    if visited_a.insert(parent) {
                        queue_a.push_back(parent);
                    }
                }
            }
            if let Some(current) = queue_b.pop_front() {
                for parent in self.load_commit(current)?.parents {
                    if visited_a.contains(&parent) {
                        return Ok(Some(parent));
                    }
                    if visited_b.insert(parent) {
                        queue_b.push_back(parent);
                    }
                }
            }
        }
        Ok(None)
    }
}

fn resolve_three_way(o: &Tree, a: &Tree, b: &Tree) -> (Tree, Vec<MergeConflict>) {
    let o_map: HashMap<&str, &TreeEntry> = o.entries.iter().map(|e| (e.name.as_str(), e)).collect();
    let a_map: HashMap<&str, &TreeEntry> = a.entries.iter().map(|e| (e.name.as_str(), e)).collect();
    let b_map: HashMap<&str, &TreeEntry> = b.entries.iter().map(|e| (e.name.as_str(), e)).collect();

    let mut names: Vec<&str> = o_map.keys().chain(a_map.keys()).chain(b_map.keys()).copied().collect();
    names.sort_unstable();
    names.dedup();

    let mut merged = Vec::new();
    let mut conflicts = Vec::new();

    for name in names {
        let o_entry = o_map.get(name).copied();
        let a_entry = a_map.get(name).copied();
        let b_entry = b_map.get(name).copied();

        match (o_entry, a_entry, b_entry) {
            (None, None, Some(b)) => merged.push(b.clone()),
            (None, Some(a), None) => merged.push(a.clone()),
            (None, Some(a), Some(b)) if a.hash == b.hash => merged.push(a.clone()),
            (None, Some(_), Some(_)) => conflicts.push(MergeConflict {
                file: name.to_string(),
                kind: ConflictKind::BothAdded,
            }),

            (Some(_), None, None) => {}
            (Some(o), None, Some(b)) if b.hash == o.hash => {}
            (Some(_), None, Some(_)) => conflicts.push(MergeConflict {
                file: name.to_string(),
                kind: ConflictKind::DeletedModified,
            }),
            (Some(o), Some(a), None) if a.hash == o.hash => {}
            (Some(_), Some(_), None) => conflicts.push(MergeConflict {
                file: name.to_string(),
                kind: ConflictKind::ModifiedDeleted,
            }),

            (Some(o), Some(a), Some(b)) => {
                let a_changed = a.hash != o.hash;
                let b_changed = b.hash != o.hash;
                if !a_changed && !b_changed {
                    merged.push(a.clone());
                } else if !a_changed && b_changed {
                    merged.push(b.clone());
                } else if a_changed && !b_changed {
                    merged.push(a.clone());
                } else if a.hash == b.hash {
                    merged.push(a.clone());
                } else {
                    conflicts.push(MergeConflict {
                        file: name.to_string(),
                        kind: ConflictKind::BothModified,
                    });
                }
            }
        }
    }

    (Tree::new(merged), conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepoConfig;

    fn repo() -> Repository {
        Repository::open_in_memory(RepoConfig::default()).unwrap()
    }

    #[test]
    fn fast_forward_merge_advances_current_branch() {
        let mut repo = repo();
        repo.add("a.txt", b"base", None).unwrap();
        repo.commit("base", None, None).unwrap();

        repo.create_branch("feature", None).unwrap();
        repo.switch_branch("feature").unwrap();
        repo.add("b.txt", b"feature work", None).unwrap();
        repo.commit("feature work", None, None).unwrap();

        repo.switch_branch("main").unwrap();
        let outcome = repo.merge("feature").unwrap();
        assert!(matches!(outcome, MergeOutcome::FastForward { .. }));
    }

    #[test]
    fn non_conflicting_three_way_merge_combines_changes() {
        let mut repo = repo();
        repo.add("shared.txt", b"base", None).unwrap();
        repo.commit("base", None, None).unwrap();

        repo.create_branch("feature", None).unwrap();
        repo.switch_branch("feature").unwrap();
        repo.add("feature.txt", b"from feature", None).unwrap();
        repo.commit("feature adds file", None, None).unwrap();

        repo.switch_branch("main").unwrap();
        repo.add("main.txt", b"from main", None).unwrap();
        repo.commit("main adds file", None, None).unwrap();

        let outcome = repo.merge("feature").unwrap();
        assert!(matches!(outcome, MergeOutcome::ThreeWay { .. }));
        assert_eq!(repo.get_file("feature.txt", None).unwrap(), b"from feature");
        assert_eq!(repo.get_file("main.txt", None).unwrap(), b"from main");
    }

    #[test]
    fn merge_error_path_leaves_head_and_object_count_untouched() {
        let mut repo = repo();
        repo.add("a.txt", b"base", None).unwrap();
        repo.commit("base", None, None).unwrap();
        let before_head = repo.resolve_ref("HEAD").unwrap();
        let before_stats = repo.stats().unwrap();

        let err = repo.merge("no-such-branch");
        assert!(err.is_err());

        assert_eq!(repo.resolve_ref("HEAD").unwrap(), before_head);
        assert_eq!(repo.stats().unwrap().object_count, before_stats.object_count);
    }

    #[test]
    fn conflicting_edits_to_the_same_file_are_reported() {
        let mut repo = repo();
        repo.add("shared.txt", b"base", None).unwrap();
        repo.commit("base", None, None).unwrap();

        repo.create_branch("feature", None).unwrap();
        repo.switch_branch("feature").unwrap();
        repo.add("shared.txt", b"feature version", None).unwrap();
        repo.commit("feature edits shared", None, None).unwrap();

        repo.switch_branch("main").unwrap();
        repo.add("shared.txt", b"main version", None).unwrap();
        repo.commit("main edits shared", None, None).unwrap();

        let outcome = repo.merge("feature").unwrap();
        match outcome {
            MergeOutcome::Conflict { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].kind, ConflictKind::BothModified);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
