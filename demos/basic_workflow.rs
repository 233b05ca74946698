//! Minimal end-to-end walkthrough: init a repository, stage and commit a file, branch, and
//! inspect history. Run with `cargo run --example basic_workflow` once wired into a binary
//! target, or adapt into an integration test.

use versant::{RepoConfig, Repository, ResetMode};

fn main() -> versant::Result<()> {
    tracing_subscriber::fmt::init();

    let mut repo = Repository::open_in_memory(RepoConfig::default())?;

    repo.add("README.md", b"# hello\n", None)?;
    let commit = repo.commit("initial commit", Some("Ada Lovelace"), Some("ada@example.com"))?;
    println!("created commit {}", commit.commit_hash);

    repo.create_branch("feature/notes", None)?;
    repo.switch_branch("feature/notes")?;
    repo.add("NOTES.md", b"work in progress\n", None)?;
    repo.commit("add notes", None, None)?;

    repo.switch_branch("main")?;
    match repo.merge("feature/notes")? {
        versant::MergeOutcome::FastForward { commit_hash } => {
            println!("fast-forwarded to {commit_hash}");
        }
        other => println!("merge result: {other:?}"),
    }

    repo.reset(ResetMode::Mixed, None)?;
    let status = repo.status()?;
    println!("status: {status:?}");

    Ok(())
}
