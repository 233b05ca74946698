//! End-to-end walkthroughs exercising the repository controller, delta reuse, branching,
//! three-way merge, conflict detection, and differential branch transfer as a user of the
//! library would actually drive them.

use versant::{MergeOutcome, RepoConfig, Repository};

fn repo() -> Repository {
    Repository::open_in_memory(RepoConfig::default()).unwrap()
}

#[test]
fn s1_stage_commit_retrieve() {
    let mut repo = repo();
    repo.add("a.txt", b"hello\n", None).unwrap();
    repo.commit("m", Some("A"), Some("a@x")).unwrap();

    assert_eq!(repo.get_file("a.txt", None).unwrap(), b"hello\n");
    assert_eq!(repo.log(10).unwrap().len(), 1);
    assert_eq!(repo.current_branch(), "main");
    assert!(repo.status().unwrap().staged.is_empty());
}

#[test]
fn s2_delta_reuse_on_a_near_identical_large_file() {
    let mut repo = repo();
    let base: Vec<u8> = "Hello World! ".repeat(320); // ~4 KiB
    repo.add("big.txt", &base, None).unwrap();
    repo.commit("base version", None, None).unwrap();

    let mut modified = base.clone();
    // Flip roughly 1% of bytes.
    for i in (0..modified.len()).step_by(100) {
        modified[i] = modified[i].wrapping_add(1);
    }
    let add_result = repo.add("big.txt", &modified, None).unwrap();
    repo.commit("tweaked version", None, None).unwrap();

    let stats = repo.stats().unwrap();
    assert!(stats.delta_count >= 1);
    assert!(stats.compression_ratio <= 0.5);

    assert_eq!(repo.get_file("big.txt", None).unwrap(), modified);
    assert_ne!(add_result.hash.to_hex().len(), 0);
}

#[test]
fn s3_branching_makes_other_branch_files_unreachable_after_switch() {
    let mut repo = repo();
    repo.add("a.txt", b"hello\n", None).unwrap();
    repo.commit("m", None, None).unwrap();

    repo.create_branch("feature", None).unwrap();
    repo.switch_branch("feature").unwrap();
    repo.add("b.txt", b"hi", None).unwrap();
    repo.commit("m2", None, None).unwrap();

    let branches = repo.list_branches().unwrap();
    assert!(branches.contains(&"main".to_string()));
    assert!(branches.contains(&"feature".to_string()));

    let feature_head = repo.resolve_ref("HEAD").unwrap().unwrap();
    repo.switch_branch("main").unwrap();
    let main_head = repo.resolve_ref("HEAD").unwrap().unwrap();
    assert_ne!(feature_head, main_head);

    assert!(repo.get_file("b.txt", None).is_err());
}

#[test]
fn s4_three_way_merge_combines_both_sides_and_is_idempotent() {
    let mut repo = repo();
    repo.add("x.txt", b"one\ntwo\n", None).unwrap();
    repo.commit("base", None, None).unwrap();

    repo.create_branch("alice", None).unwrap();
    repo.create_branch("bob", None).unwrap();

    repo.switch_branch("alice").unwrap();
    repo.add("x.txt", b"one\nTWO\n", None).unwrap();
    repo.commit("alice edits", None, None).unwrap();

    repo.switch_branch("bob").unwrap();
    repo.add("y.txt", b"hi", None).unwrap();
    repo.commit("bob adds", None, None).unwrap();

    repo.switch_branch("alice").unwrap();
    let outcome = repo.merge("bob").unwrap();
    assert!(matches!(outcome, MergeOutcome::ThreeWay { .. }));
    assert_eq!(repo.get_file("x.txt", None).unwrap(), b"one\nTWO\n");
    assert_eq!(repo.get_file("y.txt", None).unwrap(), b"hi");

    let rerun = repo.merge("bob").unwrap();
    assert!(matches!(rerun, MergeOutcome::UpToDate));
}

#[test]
fn s5_both_modified_conflict_leaves_branch_ref_untouched() {
    let mut repo = repo();
    repo.add("x.txt", b"A\n", None).unwrap();
    repo.commit("base", None, None).unwrap();

    repo.create_branch("l", None).unwrap();
    repo.create_branch("r", None).unwrap();

    repo.switch_branch("l").unwrap();
    repo.add("x.txt", b"B\n", None).unwrap();
    repo.commit("l edits", None, None).unwrap();
    let l_head_before = repo.resolve_ref("HEAD").unwrap().unwrap();

    repo.switch_branch("r").unwrap();
    repo.add("x.txt", b"C\n", None).unwrap();
    repo.commit("r edits", None, None).unwrap();

    repo.switch_branch("l").unwrap();
    let outcome = repo.merge("r").unwrap();
    match outcome {
        MergeOutcome::Conflict { conflicts } => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].file, "x.txt");
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let l_head_after = repo.resolve_ref("HEAD").unwrap().unwrap();
    assert_eq!(l_head_before, l_head_after);
}

#[test]
fn s6_differential_export_import_skips_on_reimport() {
    let mut p = repo();
    p.add("shared.txt", b"shared base", None).unwrap();
    p.commit("base", None, None).unwrap();

    p.create_branch("feature", None).unwrap();
    p.switch_branch("feature").unwrap();
    p.add("only_on_feature.txt", b"feature-only content", None).unwrap();
    p.commit("feature work", None, None).unwrap();

    let image = p.export_branch("feature").unwrap();

    let mut q = repo();
    q.add("shared.txt", b"shared base", None).unwrap();
    q.commit("base", None, None).unwrap();

    let first_import = q.import_branch(&image, false).unwrap();
    assert!(first_import.objects_imported > 0);
    assert_eq!(first_import.objects_skipped, 0);

    assert!(q.list_branches().unwrap().contains(&"feature".to_string()));
    q.switch_branch("feature").unwrap();
    assert_eq!(
        q.get_file("only_on_feature.txt", None).unwrap(),
        b"feature-only content"
    );

    let second_import = q.import_branch(&image, true).unwrap();
    assert_eq!(second_import.objects_imported, 0);
}

#[test]
fn empty_repository_boundary_behaviours() {
    let mut repo = repo();
    assert!(repo.log(10).unwrap().is_empty());
    let status = repo.status().unwrap();
    assert!(status.head.is_none());
    assert!(matches!(repo.commit("nope", None, None), Err(_)));
}

#[test]
fn single_commit_repository_head_tilde_one_resolves_to_none() {
    let mut repo = repo();
    repo.add("a.txt", b"v1", None).unwrap();
    repo.commit("one", None, None).unwrap();
    assert_eq!(repo.resolve_ref("HEAD~1").unwrap(), None);
}
