use crate::error::{GitError, Result};
use crate::types::{GitDiff, LsFilesEntry};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// The git queries the scanner and watcher depend on
///
/// Implemented by [`GitCommandRunner`] for a real repository; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait GitCommands: Send + Sync {
    /// Repository working-tree root
    fn repo_root(&self) -> &Path;

    /// `git ls-files -s [<path>]`
    async fn ls_files_stage(&self, path: Option<&str>) -> Result<Vec<LsFilesEntry>>;

    /// `git diff --name-status <base_ref>`
    async fn diff_name_status(&self, base_ref: &str) -> Result<GitDiff>;

    /// `git rev-parse --verify <reference>`; false when the ref does not resolve
    async fn rev_parse_verify(&self, reference: &str) -> Result<bool>;

    /// Branch `refs/remotes/origin/HEAD` points at, without the remote prefix
    async fn origin_default_branch(&self) -> Result<Option<String>>;

    /// `git branch --show-current`; `None` on a detached HEAD
    async fn current_branch(&self) -> Result<Option<String>>;

    /// Commit HEAD points at, `None` in a repository without commits
    async fn head_commit(&self) -> Result<Option<String>>;

    /// Blob hash git would assign to the working-tree file
    async fn hash_object(&self, path: &str) -> Result<String>;

    /// Location of the git directory (`.git` or a worktree's private dir)
    async fn git_dir(&self) -> Result<PathBuf>;
}

/// Thin wrapper that shells out to the `git` executable
#[derive(Debug, Clone)]
pub struct GitCommandRunner {
    repo_root: PathBuf,
}

impl GitCommandRunner {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Find the repository containing `path` (walks up like git does)
    pub async fn discover(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let probe = Self::new(path);
        let top = probe
            .run_checked(&["rev-parse", "--show-toplevel"])
            .await
            .map_err(|_| GitError::RepoNotFound(path.display().to_string()))?;

        let root = PathBuf::from(top.trim());
        tracing::info!("Opened git repository at: {}", root.display());
        Ok(Self::new(root))
    }

    async fn output(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("git")
            .arg("-c")
            .arg("core.quotepath=off")
            .args(args)
            .current_dir(&self.repo_root)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GitError::Spawn(e.to_string()).into())
    }

    /// Run git and return stdout, failing on a non-zero exit
    async fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        String::from_utf8(output.stdout)
            .map_err(|e| GitError::Parse(format!("non UTF-8 output: {}", e)).into())
    }

    /// Run git and return stdout, or `None` when it exits non-zero
    async fn run_optional(&self, args: &[&str]) -> Result<Option<String>> {
        let output = self.output(args).await?;
        if !output.status.success() {
            tracing::debug!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

#[async_trait]
impl GitCommands for GitCommandRunner {
    fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    async fn ls_files_stage(&self, path: Option<&str>) -> Result<Vec<LsFilesEntry>> {
        let output = match path {
            Some(path) => self.run_checked(&["ls-files", "-s", "--", path]).await?,
            None => self.run_checked(&["ls-files", "-s"]).await?,
        };
        parse_ls_files(&output)
    }

    async fn diff_name_status(&self, base_ref: &str) -> Result<GitDiff> {
        let output = self
            .run_checked(&["diff", "--name-status", base_ref])
            .await?;
        Ok(parse_name_status(&output))
    }

    async fn rev_parse_verify(&self, reference: &str) -> Result<bool> {
        Ok(self
            .run_optional(&["rev-parse", "--verify", "--quiet", reference])
            .await?
            .is_some())
    }

    async fn origin_default_branch(&self) -> Result<Option<String>> {
        let output = self
            .run_optional(&["symbolic-ref", "refs/remotes/origin/HEAD"])
            .await?;
        Ok(output.and_then(|out| {
            let trimmed = out.trim();
            trimmed
                .strip_prefix("refs/remotes/origin/")
                .filter(|branch| !branch.is_empty())
                .map(str::to_string)
        }))
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        let output = self.run_checked(&["branch", "--show-current"]).await?;
        let branch = output.trim();
        Ok((!branch.is_empty()).then(|| branch.to_string()))
    }

    async fn head_commit(&self) -> Result<Option<String>> {
        let output = self
            .run_optional(&["rev-parse", "--verify", "--quiet", "HEAD"])
            .await?;
        Ok(output
            .map(|out| out.trim().to_string())
            .filter(|hash| !hash.is_empty()))
    }

    async fn hash_object(&self, path: &str) -> Result<String> {
        let output = self.run_checked(&["hash-object", "--", path]).await?;
        let hash = output.trim();
        if hash.is_empty() {
            return Err(GitError::Parse(format!("empty hash-object output for {}", path)).into());
        }
        Ok(hash.to_string())
    }

    async fn git_dir(&self) -> Result<PathBuf> {
        let output = self.run_checked(&["rev-parse", "--git-dir"]).await?;
        let dir = PathBuf::from(output.trim());
        Ok(if dir.is_absolute() {
            dir
        } else {
            self.repo_root.join(dir)
        })
    }
}

/// Undo git's C-style quoting of a path.
///
/// `core.quotepath=off` only stops octal escapes for non-ASCII bytes; paths
/// containing `"`, `\`, tabs or newlines still come back quoted. Unquoted
/// paths are returned as they are.
pub fn unquote_path(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return raw.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => bytes.push(b'\n'),
            Some('t') => bytes.push(b'\t'),
            Some('r') => bytes.push(b'\r'),
            Some('a') => bytes.push(0x07),
            Some('b') => bytes.push(0x08),
            Some('f') => bytes.push(0x0c),
            Some('v') => bytes.push(0x0b),
            Some(d @ '0'..='7') => {
                let mut value = d.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                bytes.push(value as u8);
            }
            Some(other) => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Parse one `<mode> <hash> <stage>\t<path>` line.
///
/// Only the first three fields are split off; the rest of the line is the
/// path, spaces included.
pub fn parse_ls_files_line(line: &str) -> std::result::Result<LsFilesEntry, GitError> {
    let mut parts = line.splitn(4, char::is_whitespace);
    let mode = parts.next().filter(|s| !s.is_empty());
    let hash = parts.next().filter(|s| !s.is_empty());
    let stage = parts.next().filter(|s| !s.is_empty());
    let path = parts.next().map(str::trim_start).filter(|s| !s.is_empty());

    match (mode, hash, stage, path) {
        (Some(mode), Some(hash), Some(stage), Some(path)) => Ok(LsFilesEntry {
            mode: mode.to_string(),
            hash: hash.to_string(),
            stage: stage.to_string(),
            path: unquote_path(path),
        }),
        _ => Err(GitError::Parse(format!("malformed ls-files line: {:?}", line))),
    }
}

/// Parse full `git ls-files -s` output, ignoring blank lines
pub fn parse_ls_files(output: &str) -> Result<Vec<LsFilesEntry>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_ls_files_line(line).map_err(Into::into))
        .collect()
}

/// Parse `git diff --name-status` output into added/modified/deleted paths.
///
/// A rename drops the old path and adds the new one; a copy only adds.
pub fn parse_name_status(output: &str) -> GitDiff {
    let mut diff = GitDiff::default();

    for line in output.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        let Some(status) = fields.first().and_then(|s| s.chars().next()) else {
            continue;
        };

        match (status, fields.as_slice()) {
            ('A', [_, path]) => diff.added.push(unquote_path(path)),
            ('M' | 'T' | 'U', [_, path]) => diff.modified.push(unquote_path(path)),
            ('D', [_, path]) => diff.deleted.push(unquote_path(path)),
            ('R', [_, old, new]) => {
                diff.deleted.push(unquote_path(old));
                diff.added.push(unquote_path(new));
            }
            ('C', [_, _, new]) => diff.added.push(unquote_path(new)),
            _ => tracing::debug!("Ignoring diff line: {:?}", line),
        }
    }

    diff
}
