/// Scanner and chunker integration tests against a real `git` binary
use anyhow::Result;
use delta_indexer::config::GitConfig;
use delta_indexer::git::{GitCommandRunner, GitCommands, Scanner};
use delta_indexer::glob_utils::compile_patterns;
use delta_indexer::indexer::{ChunkContext, chunk_file};
use delta_indexer::types::ChunkerConfig;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args([
            "-c",
            "user.name=Delta Test",
            "-c",
            "user.email=delta@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        status.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&status.stderr)
    );
}

fn write(dir: &Path, path: &str, content: &str) {
    let full = dir.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, content).unwrap();
}

/// Repository on `main` with three committed files
fn init_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    write(dir.path(), "src/lib.rs", "pub fn one() -> u32 {\n    1\n}\n");
    write(dir.path(), "src/old.rs", "pub fn old() {}\n");
    write(dir.path(), "docs/read me.md", "# Notes\n\nSpaces in the path.\n");
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "initial"]);
    dir
}

async fn scanner_for(dir: &TempDir) -> Result<Scanner<GitCommandRunner>> {
    let runner = GitCommandRunner::discover(dir.path()).await?;
    Ok(Scanner::new(
        Arc::new(runner),
        &GitConfig::default(),
        compile_patterns(&[])?,
    ))
}

#[tokio::test]
async fn test_full_scan_lists_tracked_files_with_blob_hashes() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let dir = init_repo();
    let scanner = scanner_for(&dir).await?;

    let outcome = scanner.scan().await?;

    assert_eq!(outcome.branch.as_deref(), Some("main"));
    assert!(outcome.is_base_branch);
    let mut paths: Vec<&str> = outcome.files.iter().map(|f| f.file_path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec!["docs/read me.md", "src/lib.rs", "src/old.rs"]);

    // The index hash matches what hash-object computes for the clean file
    let lib = outcome
        .files
        .iter()
        .find(|f| f.file_path == "src/lib.rs")
        .unwrap();
    assert_eq!(lib.file_hash, scanner.git().hash_object("src/lib.rs").await?);
    assert_eq!(lib.file_hash.len(), 40);
    Ok(())
}

#[tokio::test]
async fn test_delta_scan_on_feature_branch() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let dir = init_repo();
    git(dir.path(), &["checkout", "-q", "-b", "feature/login"]);
    write(dir.path(), "src/lib.rs", "pub fn one() -> u32 {\n    2\n}\n");
    write(dir.path(), "src/login.rs", "pub fn login() {}\n");
    git(dir.path(), &["rm", "-q", "src/old.rs"]);
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "login"]);

    let outcome = scanner_for(&dir).await?.scan().await?;

    assert_eq!(outcome.branch.as_deref(), Some("feature/login"));
    assert_eq!(outcome.base_branch.as_deref(), Some("main"));
    assert!(!outcome.is_base_branch);
    let paths: Vec<&str> = outcome.files.iter().map(|f| f.file_path.as_str()).collect();
    assert_eq!(paths, vec!["src/lib.rs", "src/login.rs"]);
    assert!(outcome.files.iter().all(|f| f.branch == "feature/login"));
    assert_eq!(outcome.deleted, vec!["src/old.rs"]);
    Ok(())
}

#[tokio::test]
async fn test_rename_reports_old_path_deleted() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let dir = init_repo();
    git(dir.path(), &["checkout", "-q", "-b", "rename"]);
    git(dir.path(), &["mv", "docs/read me.md", "docs/notes.md"]);
    git(dir.path(), &["commit", "-q", "-m", "rename"]);

    let outcome = scanner_for(&dir).await?.scan().await?;

    let paths: Vec<&str> = outcome.files.iter().map(|f| f.file_path.as_str()).collect();
    assert_eq!(paths, vec!["docs/notes.md"]);
    assert_eq!(outcome.deleted, vec!["docs/read me.md"]);
    Ok(())
}

#[tokio::test]
async fn test_detached_head_scans_nothing() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let dir = init_repo();
    git(dir.path(), &["checkout", "-q", "--detach", "HEAD"]);

    let scanner = scanner_for(&dir).await?;
    assert!(scanner.is_detached().await?);

    let outcome = scanner.scan().await?;
    assert!(outcome.is_detached);
    assert!(outcome.files.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_base_branch_falls_back_to_candidates() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let dir = TempDir::new()?;
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/master"]);
    write(dir.path(), "a.txt", "a\n");
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "initial"]);

    let scanner = scanner_for(&dir).await?;
    assert_eq!(scanner.resolve_base_branch().await?, "master");
    assert!(scanner.scan().await?.is_base_branch);
    Ok(())
}

#[tokio::test]
async fn test_discover_outside_repository_fails() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let dir = TempDir::new()?;
    // Guard against a temp dir that happens to sit inside a repository
    if Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(dir.path())
        .output()?
        .status
        .success()
    {
        return Ok(());
    }

    let result = GitCommandRunner::discover(dir.path()).await;
    assert!(matches!(
        result,
        Err(delta_indexer::IndexerError::Git(
            delta_indexer::error::GitError::RepoNotFound(_)
        ))
    ));
    Ok(())
}

#[tokio::test]
async fn test_chunk_ids_stable_across_branches_only_when_branch_matches() -> Result<()> {
    if !git_available() {
        eprintln!("git not available, skipping");
        return Ok(());
    }
    let dir = init_repo();
    let runner = GitCommandRunner::discover(dir.path()).await?;
    let content = std::fs::read_to_string(runner.repo_root().join("src/lib.rs"))?;
    let hash = runner.hash_object("src/lib.rs").await?;
    let config = ChunkerConfig {
        min_chunk_chars: 5,
        ..ChunkerConfig::default()
    };

    let on = |branch: &str| {
        chunk_file(
            &ChunkContext {
                file_path: "src/lib.rs",
                file_hash: &hash,
                organization_id: "acme",
                project_id: "web",
                git_branch: branch,
                is_base_branch: branch == "main",
            },
            &content,
            &config,
        )
    };

    let main_a = on("main");
    let main_b = on("main");
    let feature = on("feature");

    assert_eq!(main_a.len(), 1);
    assert_eq!(main_a[0].id, main_b[0].id);
    assert_ne!(main_a[0].id, feature[0].id);
    assert_eq!(main_a[0].chunk_hash, feature[0].chunk_hash);
    assert_eq!(main_a[0].file_hash, hash);
    Ok(())
}
