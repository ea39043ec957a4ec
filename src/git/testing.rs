//! In-memory git double for unit tests

use crate::error::{GitError, Result};
use crate::git::runner::GitCommands;
use crate::types::{GitDiff, LsFilesEntry};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
struct FakeState {
    branch: Option<String>,
    commit: Option<String>,
    tracked: Vec<(String, String)>,
    diff: GitDiff,
    refs: HashSet<String>,
    origin_head: Option<String>,
    failing_lookups: HashSet<String>,
    fail_bulk: bool,
    bulk_listings: usize,
}

pub(crate) struct FakeGit {
    root: PathBuf,
    state: Mutex<FakeState>,
}

impl FakeGit {
    pub(crate) fn on_branch(branch: &str) -> Self {
        let fake = Self {
            root: PathBuf::from("/nonexistent-repo"),
            state: Mutex::new(FakeState::default()),
        };
        fake.set_branch(Some(branch));
        fake.set_commit("c0");
        fake
    }

    pub(crate) fn detached() -> Self {
        let fake = Self::on_branch("unused");
        fake.set_branch(None);
        fake
    }

    pub(crate) fn with_root(mut self, root: &Path) -> Self {
        self.root = root.to_path_buf();
        self
    }

    pub(crate) fn with_tracked(self, path: &str, hash: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .tracked
            .push((path.to_string(), hash.to_string()));
        self
    }

    pub(crate) fn with_diff(self, diff: GitDiff) -> Self {
        self.state.lock().unwrap().diff = diff;
        self
    }

    pub(crate) fn with_refs(self, refs: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .refs
            .extend(refs.iter().map(|r| r.to_string()));
        self
    }

    pub(crate) fn with_origin_head(self, branch: &str) -> Self {
        self.state.lock().unwrap().origin_head = Some(branch.to_string());
        self
    }

    pub(crate) fn failing_lookup(self, path: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_lookups
            .insert(path.to_string());
        self
    }

    pub(crate) fn failing_bulk_listing(self) -> Self {
        self.state.lock().unwrap().fail_bulk = true;
        self
    }

    pub(crate) fn set_branch(&self, branch: Option<&str>) {
        self.state.lock().unwrap().branch = branch.map(str::to_string);
    }

    pub(crate) fn set_commit(&self, commit: &str) {
        self.state.lock().unwrap().commit = Some(commit.to_string());
    }

    pub(crate) fn set_tracked_hash(&self, path: &str, hash: &str) {
        let mut state = self.state.lock().unwrap();
        match state.tracked.iter_mut().find(|(p, _)| p == path) {
            Some(entry) => entry.1 = hash.to_string(),
            None => state.tracked.push((path.to_string(), hash.to_string())),
        }
    }

    pub(crate) fn bulk_listings(&self) -> usize {
        self.state.lock().unwrap().bulk_listings
    }

    fn entry(path: &str, hash: &str) -> LsFilesEntry {
        LsFilesEntry {
            mode: "100644".to_string(),
            hash: hash.to_string(),
            stage: "0".to_string(),
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl GitCommands for FakeGit {
    fn repo_root(&self) -> &Path {
        &self.root
    }

    async fn ls_files_stage(&self, path: Option<&str>) -> Result<Vec<LsFilesEntry>> {
        let mut state = self.state.lock().unwrap();
        match path {
            None => {
                state.bulk_listings += 1;
                if state.fail_bulk {
                    return Err(GitError::CommandFailed {
                        command: "ls-files -s".to_string(),
                        stderr: "fatal: index file corrupt".to_string(),
                    }
                    .into());
                }
                Ok(state
                    .tracked
                    .iter()
                    .map(|(p, h)| Self::entry(p, h))
                    .collect())
            }
            Some(path) => {
                if state.failing_lookups.contains(path) {
                    return Err(GitError::CommandFailed {
                        command: format!("ls-files -s -- {}", path),
                        stderr: "fatal: simulated".to_string(),
                    }
                    .into());
                }
                Ok(state
                    .tracked
                    .iter()
                    .filter(|(p, _)| p == path)
                    .map(|(p, h)| Self::entry(p, h))
                    .collect())
            }
        }
    }

    async fn diff_name_status(&self, _base_ref: &str) -> Result<GitDiff> {
        Ok(self.state.lock().unwrap().diff.clone())
    }

    async fn rev_parse_verify(&self, reference: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().refs.contains(reference))
    }

    async fn origin_default_branch(&self) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().origin_head.clone())
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().branch.clone())
    }

    async fn head_commit(&self) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().commit.clone())
    }

    async fn hash_object(&self, path: &str) -> Result<String> {
        Ok(format!("worktree-{}", path))
    }

    async fn git_dir(&self) -> Result<PathBuf> {
        Ok(self.root.join(".git"))
    }
}
