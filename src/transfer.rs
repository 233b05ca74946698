//! Branch transfer (C8): differential export of one branch's unique history into a standalone
//! database image, and import of such an image into another repository (spec §4.8).

use std::collections::HashSet;

use tracing::info;

use crate::errors::{Result, VcsError};
use crate::hash::ObjectHash;
use crate::repo::{Progress, Repository, branch_ref};
use crate::store::ObjectStore;

const EXPORT_TYPE_META_KEY: &str = "export_type";
const EXPORT_TYPE_DIFFERENTIAL: &str = "differential";

#[derive(Debug, Clone)]
pub struct ImportResult {
    pub branch: String,
    pub objects_imported: u64,
    pub objects_skipped: u64,
    pub differential: bool,
}

impl Repository {
    /// Export `branch` as a standalone database image containing only the objects unique to
    /// it (not reachable from any other local branch head).
    pub fn export_branch(&self, branch: &str) -> Result<Vec<u8>> {
        let head = self
            .store()
            .get_ref(&branch_ref(branch))?
            .map(|r| r.hash)
            .ok_or_else(|| VcsError::not_found(format!("branch {branch} not found")))?;

        let mut excluded: HashSet<ObjectHash> = HashSet::new();
        for other in self.list_branches()? {
            if other == branch {
                continue;
            }
            if let Some(entry) = self.store().get_ref(&branch_ref(&other))? {
                excluded.extend(self.store().reachable_from(entry.hash)?);
            }
        }

        let full_closure = self.store().reachable_from(head)?;
        let unique: Vec<ObjectHash> = full_closure.difference(&excluded).copied().collect();
        if unique.is_empty() {
            return Err(VcsError::precondition(format!(
                "nothing unique to branch {branch} to export"
            )));
        }

        let mut image = ObjectStore::open_in_memory(self.store().config().clone())?;
        for hash in &unique {
            let obj = self
                .store()
                .get_object(hash)?
                .ok_or_else(|| VcsError::integrity(format!("object {hash} vanished during export")))?;
            image.put_object(&obj.data, obj.kind)?;
        }
        image.set_ref(&branch_ref(branch), head, "branch")?;
        image.set_meta(EXPORT_TYPE_META_KEY, EXPORT_TYPE_DIFFERENTIAL)?;

        info!(branch, objects = unique.len(), "exported differential branch image");
        image.export_bytes()
    }

    /// Import a branch image produced by [`Repository::export_branch`]. Existing objects are
    /// skipped by digest; a branch name collision fails unless `overwrite` is set.
    pub fn import_branch(&mut self, bytes: &[u8], overwrite: bool) -> Result<ImportResult> {
        self.import_branch_with_progress(bytes, overwrite, |_| {})
    }

    /// Same as [`Repository::import_branch`], but invokes `on_progress` after each object in
    /// the image is considered, for callers importing large branch histories.
    pub fn import_branch_with_progress(
        &mut self,
        bytes: &[u8],
        overwrite: bool,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<ImportResult> {
        self.in_transaction(move |this| {
            this.import_branch_locked(bytes, overwrite, &mut on_progress)
        })
    }

    fn import_branch_locked(
        &mut self,
        bytes: &[u8],
        overwrite: bool,
        on_progress: &mut dyn FnMut(Progress),
    ) -> Result<ImportResult> {
        let image = ObjectStore::from_bytes(bytes, self.store().config().clone())?;

        let branch_entry = image
            .list_refs()?
            .into_iter()
            .find(|(name, entry)| entry.kind == "branch" && name.starts_with("refs/heads/"))
            .ok_or_else(|| VcsError::invalid_argument("import image carries no branch ref"))?;
        let branch = branch_entry
            .0
            .strip_prefix("refs/heads/")
            .unwrap()
            .to_string();
        let head = branch_entry.1.hash;

        if !overwrite && self.store().get_ref(&branch_ref(&branch))?.is_some() {
            return Err(VcsError::conflict(format!("branch {branch} already exists")));
        }

        let differential = image
            .get_meta(EXPORT_TYPE_META_KEY)?
            .as_deref()
            == Some(EXPORT_TYPE_DIFFERENTIAL);

        let all_hashes = image.all_hashes()?;
        let total = all_hashes.len() as u64;
        let mut objects_imported = 0u64;
        let mut objects_skipped = 0u64;
        for (i, hash) in all_hashes.iter().enumerate() {
            if self.store().has_object(hash)? {
                objects_skipped += 1;
            } else {
                let obj = image
                    .get_object(hash)?
                    .ok_or_else(|| VcsError::integrity(format!("object {hash} missing from import image")))?;
                self.store_mut().put_object(&obj.data, obj.kind)?;
                objects_imported += 1;
            }
            on_progress(Progress {
                done: i as u64 + 1,
                total,
            });
        }

        self.store_mut().set_ref(&branch_ref(&branch), head, "branch")?;

        info!(branch, objects_imported, objects_skipped, "imported branch image");
        Ok(ImportResult {
            branch,
            objects_imported,
            objects_skipped,
            differential,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepoConfig;

    fn repo() -> Repository {
        Repository::open_in_memory(RepoConfig::default()).unwrap()
    }

    #[test]
    fn export_then_import_round_trips_a_branch() {
        let mut source = repo();
        source.add("a.txt", b"shared base", None).unwrap();
        source.commit("base", None, None).unwrap();

        source.create_branch("feature", None).unwrap();
        source.switch_branch("feature").unwrap();
        source.add("feature.txt", b"feature content", None).unwrap();
        source.commit("feature work", None, None).unwrap();

        let image = source.export_branch("feature").unwrap();

        let mut dest = repo();
        dest.add("a.txt", b"shared base", None).unwrap();
        dest.commit("base", None, None).unwrap();

        let result = dest.import_branch(&image, false).unwrap();
        assert_eq!(result.branch, "feature");
        assert!(result.differential);
        assert!(result.objects_imported > 0);

        dest.switch_branch("feature").unwrap();
        assert_eq!(dest.get_file("feature.txt", None).unwrap(), b"feature content");
    }

    #[test]
    fn import_refuses_existing_branch_without_overwrite() {
        let mut source = repo();
        source.add("a.txt", b"content", None).unwrap();
        source.commit("base", None, None).unwrap();
        source.create_branch("feature", None).unwrap();
        source.switch_branch("feature").unwrap();
        source.add("b.txt", b"more", None).unwrap();
        source.commit("more", None, None).unwrap();
        let image = source.export_branch("feature").unwrap();

        let mut dest = repo();
        dest.add("a.txt", b"content", None).unwrap();
        dest.commit("base", None, None).unwrap();
        dest.create_branch("feature", None).unwrap();

        assert!(dest.import_branch(&image, false).is_err());
        assert!(dest.import_branch(&image, true).is_ok());
    }

    #[test]
    fn import_with_progress_reports_every_object_in_the_image() {
        let mut source = repo();
        source.add("a.txt", b"shared base", None).unwrap();
        source.commit("base", None, None).unwrap();
        source.create_branch("feature", None).unwrap();
        source.switch_branch("feature").unwrap();
        source.add("feature.txt", b"feature content", None).unwrap();
        source.commit("feature work", None, None).unwrap();
        let image = source.export_branch("feature").unwrap();

        let mut dest = repo();
        dest.add("a.txt", b"shared base", None).unwrap();
        dest.commit("base", None, None).unwrap();

        let mut seen = Vec::new();
        let result = dest
            .import_branch_with_progress(&image, false, |p| seen.push(p))
            .unwrap();

        assert!(!seen.is_empty());
        assert!(seen.iter().all(|p| p.total == seen.last().unwrap().total));
        assert_eq!(
            seen.last().unwrap().done,
            result.objects_imported + result.objects_skipped
        );
    }

    #[test]
    fn export_with_nothing_unique_fails() {
        let mut source = repo();
        source.add("a.txt", b"content", None).unwrap();
        source.commit("base", None, None).unwrap();
        source.create_branch("feature", None).unwrap();

        assert!(source.export_branch("feature").is_err());
    }
}
