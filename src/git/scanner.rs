use crate::config::GitConfig;
use crate::error::{GitError, Result};
use crate::git::runner::GitCommands;
use crate::glob_utils::matches_any;
use crate::types::{ScanOutcome, ScannedFile};
use globset::GlobSet;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Last-resort base branch when nothing else resolves
pub const FALLBACK_BASE_BRANCH: &str = "main";

/// Decides which files a branch needs indexed
///
/// The base branch gets a full listing of tracked files; any other branch only
/// gets the files that differ from the base branch.
pub struct Scanner<G: GitCommands> {
    git: Arc<G>,
    base_branch_override: Option<String>,
    base_branch_candidates: Vec<String>,
    exclude: GlobSet,
    resolved_base: RwLock<Option<String>>,
}

impl<G: GitCommands> Scanner<G> {
    pub fn new(git: Arc<G>, git_config: &GitConfig, exclude: GlobSet) -> Self {
        Self {
            git,
            base_branch_override: git_config.base_branch.clone(),
            base_branch_candidates: git_config.base_branch_candidates.clone(),
            exclude,
            resolved_base: RwLock::new(None),
        }
    }

    pub fn git(&self) -> &Arc<G> {
        &self.git
    }

    /// Current branch, or `None` on a detached HEAD
    pub async fn current_branch(&self) -> Result<Option<String>> {
        self.git.current_branch().await
    }

    pub async fn is_detached(&self) -> Result<bool> {
        Ok(self.current_branch().await?.is_none())
    }

    /// Resolve the base branch: override, origin/HEAD, first existing
    /// candidate, then `main`. The answer is cached for the scanner's lifetime.
    pub async fn resolve_base_branch(&self) -> Result<String> {
        if let Some(branch) = self.resolved_base.read().await.as_ref() {
            return Ok(branch.clone());
        }

        let resolved = self.lookup_base_branch().await?;
        tracing::debug!("Resolved base branch: {}", resolved);
        *self.resolved_base.write().await = Some(resolved.clone());
        Ok(resolved)
    }

    async fn lookup_base_branch(&self) -> Result<String> {
        if let Some(branch) = &self.base_branch_override {
            return Ok(branch.clone());
        }

        match self.git.origin_default_branch().await {
            Ok(Some(branch)) => return Ok(branch),
            Ok(None) => {}
            Err(e) => tracing::debug!("origin/HEAD lookup failed: {}", e),
        }

        for candidate in &self.base_branch_candidates {
            match self.git.rev_parse_verify(candidate).await {
                Ok(true) => return Ok(candidate.clone()),
                Ok(false) => {}
                Err(e) => tracing::debug!("rev-parse {} failed: {}", candidate, e),
            }
        }

        Ok(FALLBACK_BASE_BRANCH.to_string())
    }

    /// Whether `branch` is the base branch, compared case-insensitively
    pub async fn is_base_branch(&self, branch: &str) -> Result<bool> {
        Ok(branch.eq_ignore_ascii_case(&self.resolve_base_branch().await?))
    }

    /// Scan whatever branch is checked out; a detached HEAD yields nothing
    pub async fn scan(&self) -> Result<ScanOutcome> {
        match self.current_branch().await? {
            Some(branch) => self.scan_branch(&branch).await,
            None => {
                tracing::info!("HEAD is detached, skipping scan");
                Ok(ScanOutcome::detached())
            }
        }
    }

    /// Scan `branch`: full listing on the base branch, diff otherwise
    pub async fn scan_branch(&self, branch: &str) -> Result<ScanOutcome> {
        if self.is_detached().await? {
            tracing::info!("HEAD is detached, skipping scan");
            return Ok(ScanOutcome::detached());
        }

        let base_branch = self.resolve_base_branch().await?;
        let is_base_branch = branch.eq_ignore_ascii_case(&base_branch);

        let (files, deleted) = if is_base_branch {
            (self.full_scan(branch).await?, Vec::new())
        } else {
            self.delta_scan(branch, &base_branch).await?
        };

        tracing::info!(
            "Scanned branch '{}' ({} scan against '{}'): {} files, {} deleted",
            branch,
            if is_base_branch { "full" } else { "delta" },
            base_branch,
            files.len(),
            deleted.len()
        );

        Ok(ScanOutcome {
            branch: Some(branch.to_string()),
            base_branch: Some(base_branch),
            is_base_branch,
            is_detached: false,
            files,
            deleted,
        })
    }

    /// Every tracked file; a failing `ls-files` aborts the scan
    async fn full_scan(&self, branch: &str) -> Result<Vec<ScannedFile>> {
        let entries = self.git.ls_files_stage(None).await?;
        let mut seen = HashSet::new();

        Ok(entries
            .into_iter()
            .filter(|entry| !self.is_excluded(&entry.path))
            // Conflicted paths appear once per stage
            .filter(|entry| seen.insert(entry.path.clone()))
            .map(|entry| ScannedFile {
                file_path: entry.path,
                file_hash: entry.hash,
                branch: branch.to_string(),
            })
            .collect())
    }

    /// Added and modified files relative to the base branch, looked up one by
    /// one; a failed lookup skips that file only
    async fn delta_scan(
        &self,
        branch: &str,
        base_branch: &str,
    ) -> Result<(Vec<ScannedFile>, Vec<String>)> {
        let diff = self.git.diff_name_status(base_branch).await?;
        let mut files = Vec::new();

        for path in diff.changed_paths() {
            if self.is_excluded(&path) {
                continue;
            }

            match self.lookup(&path, branch).await {
                Ok(file) => files.push(file),
                Err(e) => tracing::warn!("Failed to look up '{}', skipping: {}", path, e),
            }
        }

        let deleted = diff
            .deleted
            .into_iter()
            .filter(|path| !self.is_excluded(path))
            .collect();

        Ok((files, deleted))
    }

    /// Index entry of one changed path
    async fn lookup(&self, path: &str, branch: &str) -> Result<ScannedFile> {
        let entry = self
            .git
            .ls_files_stage(Some(path))
            .await?
            .into_iter()
            .find(|e| e.path == path)
            .ok_or_else(|| GitError::PathNotTracked(path.to_string()))?;

        Ok(ScannedFile {
            file_path: entry.path,
            file_hash: entry.hash,
            branch: branch.to_string(),
        })
    }

    /// Whether `path` matches an exclude pattern
    pub fn is_excluded(&self, path: &str) -> bool {
        let excluded = matches_any(path, &self.exclude);
        if excluded {
            tracing::debug!("Excluded by pattern: {}", path);
        }
        excluded
    }
}
