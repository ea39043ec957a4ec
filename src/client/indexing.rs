use super::IndexerInner;
use crate::api::IndexApi;
use crate::auth::AuthToken;
use crate::error::{ApiError, IndexerError, Result};
use crate::git::{GitCommands, GitSnapshot, RescanTrigger};
use crate::indexer::{ChunkContext, FileInfo, FileLoad};
use crate::types::{
    ChunkDescriptor, DeleteFilesRequest, FileChangeEvent, FileChangeKind, IndexReport,
    IndexerStatus, IndexingConfig, ServerManifest, UpsertFileParams,
};
use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Where an uploaded file lands on the server
struct UploadTarget<'a> {
    session: &'a IndexingConfig,
    token: &'a AuthToken,
    cancel: &'a CancellationToken,
    git_branch: &'a str,
    is_base_branch: bool,
}

/// Errors that make every further request pointless
fn is_fatal(error: &IndexerError) -> bool {
    matches!(
        error,
        IndexerError::Api(ApiError::Auth(_) | ApiError::MissingBaseUrl | ApiError::Cancelled)
    )
}

impl<G: GitCommands, A: IndexApi> IndexerInner<G, A> {
    /// One scan-and-upload pass over the checked-out branch
    pub(crate) async fn index_pass(&self, session: &IndexingConfig) -> Result<IndexReport> {
        let start = Instant::now();
        self.set_state(|state| {
            state.status = IndexerStatus::Scanning;
            state.message = "Scanning repository".to_string();
            state.error = None;
        });

        let outcome = self.scanner.scan().await?;
        let mut report = IndexReport {
            branch: outcome.branch.clone(),
            files_scanned: outcome.files.len(),
            ..IndexReport::default()
        };

        let Some(branch) = outcome.branch.as_deref() else {
            self.replace_deleted_files(Vec::new()).await;
            self.mark_watching(&report);
            return Ok(report);
        };

        let token = self.tokens.token().await?;
        let cancel = self.cancel_token();
        let manifest = if session.fetch_manifest {
            self.fetch_manifest(session, branch, &token, &cancel).await
        } else {
            None
        };

        let target = UploadTarget {
            session,
            token: &token,
            cancel: &cancel,
            git_branch: branch,
            is_base_branch: outcome.is_base_branch,
        };

        let mut attempted = 0usize;
        let mut network_failures = 0usize;

        for file in &outcome.files {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled.into());
            }

            if manifest
                .as_ref()
                .is_some_and(|m| m.has_file_hash(&file.file_path, &file.file_hash))
            {
                tracing::debug!("Unchanged on server, skipping: {}", file.file_path);
                report.files_skipped += 1;
                continue;
            }

            match self
                .upload_file(&target, &file.file_path, &file.file_hash)
                .await
            {
                Ok(Some(chunks)) => {
                    attempted += 1;
                    report.files_uploaded += 1;
                    report.chunks_uploaded += chunks;
                }
                Ok(None) => report.files_skipped += 1,
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    attempted += 1;
                    if e.is_network_failure() {
                        network_failures += 1;
                    }
                    tracing::warn!("Failed to index {}: {}", file.file_path, e);
                    report.errors.push(format!("{}: {}", file.file_path, e));
                }
            }
        }

        // The service is unreachable, not merely rejecting some files
        if attempted > 0
            && network_failures == attempted
            && let Some(last) = report.errors.last()
        {
            return Err(IndexerError::other(format!(
                "All {} uploads failed, last error: {}",
                attempted, last
            )));
        }

        if !outcome.is_base_branch && !outcome.deleted.is_empty() {
            let request = DeleteFilesRequest {
                organization_id: session.organization_id.clone(),
                project_id: session.project_id.clone(),
                git_branch: branch.to_string(),
                file_paths: outcome.deleted.clone(),
            };
            match self
                .api
                .delete_files(&request, &token, Some(&cancel))
                .await
            {
                Ok(()) => report.files_deleted = request.file_paths.len(),
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    tracing::warn!("Failed to report deleted files: {}", e);
                    report.errors.push(format!("delete-files: {}", e));
                }
            }
        }
        self.replace_deleted_files(outcome.deleted).await;

        tracing::info!(
            "Indexed branch '{}' in {:?}: {} uploaded ({} chunks), {} skipped, {} deleted, {} errors",
            branch,
            start.elapsed(),
            report.files_uploaded,
            report.chunks_uploaded,
            report.files_skipped,
            report.files_deleted,
            report.errors.len()
        );

        self.set_state(|state| state.manifest = manifest);
        self.mark_watching(&report);
        Ok(report)
    }

    /// Manifest for `branch`, or `None` (upload everything) if it cannot be fetched
    async fn fetch_manifest(
        &self,
        session: &IndexingConfig,
        branch: &str,
        token: &AuthToken,
        cancel: &CancellationToken,
    ) -> Option<ServerManifest> {
        match self
            .api
            .get_server_manifest(
                &session.organization_id,
                &session.project_id,
                branch,
                token,
                Some(cancel),
            )
            .await
        {
            Ok(manifest) => {
                tracing::debug!(
                    "Server manifest for {}: {} files, {} chunks",
                    branch,
                    manifest.files.len(),
                    manifest.total_chunks()
                );
                Some(manifest)
            }
            Err(e) => {
                tracing::warn!("Could not fetch manifest for {}, uploading all files: {}", branch, e);
                None
            }
        }
    }

    /// Chunk and upload one file; `None` when the file is not indexable
    async fn upload_file(
        &self,
        target: &UploadTarget<'_>,
        file_path: &str,
        file_hash: &str,
    ) -> Result<Option<usize>> {
        let info = match FileInfo::load(
            self.git.repo_root(),
            file_path,
            self.config.indexing.max_file_size,
        )? {
            FileLoad::Loaded(info) => info,
            FileLoad::Skipped(reason) => {
                tracing::warn!("Skipping {}: {}", file_path, reason);
                return Ok(None);
            }
        };

        let ctx = ChunkContext {
            file_path,
            file_hash,
            organization_id: &target.session.organization_id,
            project_id: &target.session.project_id,
            git_branch: target.git_branch,
            is_base_branch: target.is_base_branch,
        };
        let chunks = self.chunker.chunk_file(&ctx, &info.content);
        let chunk_count = chunks.len();

        let params = UpsertFileParams {
            organization_id: target.session.organization_id.clone(),
            project_id: target.session.project_id.clone(),
            file_path: file_path.to_string(),
            file_hash: file_hash.to_string(),
            git_branch: target.git_branch.to_string(),
            is_base_branch: target.is_base_branch,
            content: info.content,
            chunks: chunks.iter().map(ChunkDescriptor::from).collect(),
        };
        self.api
            .upsert_file(&params, target.token, Some(target.cancel))
            .await?;

        tracing::debug!("Uploaded {} ({} chunks)", file_path, chunk_count);
        Ok(Some(chunk_count))
    }

    pub(crate) async fn index_file_change(
        &self,
        session: &IndexingConfig,
        event: &FileChangeEvent,
    ) -> Result<()> {
        let Some(file_path) = relative_to_repo(self.git.repo_root(), &event.file_path) else {
            tracing::debug!("Ignoring change outside the repository: {}", event.file_path);
            return Ok(());
        };
        if self.scanner.is_excluded(&file_path) {
            return Ok(());
        }

        let Some(branch) = self.scanner.current_branch().await? else {
            tracing::debug!("HEAD is detached, ignoring change to {}", file_path);
            return Ok(());
        };
        let is_base_branch = self.scanner.is_base_branch(&branch).await?;

        let token = self.tokens.token().await?;
        let cancel = self.cancel_token();

        match event.kind {
            FileChangeKind::Created | FileChangeKind::Changed => {
                let file_hash = self.git.hash_object(&file_path).await?;
                let target = UploadTarget {
                    session,
                    token: &token,
                    cancel: &cancel,
                    git_branch: &branch,
                    is_base_branch,
                };
                if let Some(chunks) = self.upload_file(&target, &file_path, &file_hash).await? {
                    self.forget_deleted_file(&file_path).await;
                    tracing::info!("Re-indexed {} ({} chunks)", file_path, chunks);
                }
            }
            FileChangeKind::Deleted => {
                let request = DeleteFilesRequest {
                    organization_id: session.organization_id.clone(),
                    project_id: session.project_id.clone(),
                    git_branch: branch.clone(),
                    file_paths: vec![file_path.clone()],
                };
                self.api
                    .delete_files(&request, &token, Some(&cancel))
                    .await?;
                if !is_base_branch {
                    self.note_deleted_file(&file_path).await;
                }
                tracing::info!("Removed {} from the {} index", file_path, branch);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<G: GitCommands + 'static, A: IndexApi + 'static> RescanTrigger for IndexerInner<G, A> {
    async fn rescan(&self, snapshot: &GitSnapshot) -> Result<()> {
        let Some(session) = self.session().await else {
            return Ok(());
        };

        tracing::info!(
            "Git state changed to {}@{}, rescanning",
            snapshot.branch.as_deref().unwrap_or("(detached)"),
            snapshot.commit.as_deref().unwrap_or("?")
        );
        match self.index_pass(&session).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }
}

/// Repository-relative, `/`-separated path; `None` for paths outside `root`
pub(crate) fn relative_to_repo(root: &Path, file_path: &str) -> Option<String> {
    let path = Path::new(file_path);
    let relative = if path.is_absolute() {
        path.strip_prefix(root).ok()?
    } else {
        path
    };

    let normalized = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    (!normalized.is_empty()).then_some(normalized)
}
