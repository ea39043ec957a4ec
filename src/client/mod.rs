//! Indexing orchestrator
//!
//! [`Indexer`] wires the scanner, the git state watcher and the index API
//! together and owns the one piece of mutable state the engine has, the
//! [`IndexerState`] record, which it publishes on a `watch` channel.

mod indexing;

use crate::api::{ApiClient, IndexApi};
use crate::auth::TokenProvider;
use crate::config::Config;
use crate::error::{IndexerError, Result};
use crate::git::{GitCommandRunner, GitCommands, GitStateWatcher, Scanner};
use crate::glob_utils::compile_patterns;
use crate::indexer::CodeChunker;
use crate::types::{
    FileChangeEvent, IndexReport, IndexerState, IndexerStatus, IndexingConfig, SearchQuery,
    SearchRequest, SearchResult,
};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, watch};
use tokio_util::sync::CancellationToken;

/// Shared between the public handle and the watcher's rescan callback
pub(crate) struct IndexerInner<G: GitCommands, A: IndexApi> {
    pub(crate) git: Arc<G>,
    pub(crate) scanner: Scanner<G>,
    pub(crate) api: Arc<A>,
    pub(crate) tokens: Arc<dyn TokenProvider>,
    pub(crate) chunker: CodeChunker,
    pub(crate) config: Arc<Config>,
    state: watch::Sender<IndexerState>,
    // Parameters of the running session, reused by rescans
    session: RwLock<Option<IndexingConfig>>,
    // Paths deleted on the current branch according to the last delta scan
    deleted_files: RwLock<Vec<String>>,
    cancel: std::sync::Mutex<CancellationToken>,
}

/// Branch-aware delta indexer for one repository
///
/// # Example
///
/// ```no_run
/// use delta_indexer::auth::{AuthToken, StaticTokenProvider};
/// use delta_indexer::config::Config;
/// use delta_indexer::types::{IndexingConfig, SearchQuery};
/// use delta_indexer::Indexer;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let tokens = Arc::new(StaticTokenProvider::new(
///         AuthToken::new("secret").with_api_url("https://index.example.com"),
///     ));
///     let indexer = Indexer::open(".", Config::default(), tokens).await?;
///
///     let session = IndexingConfig {
///         organization_id: "acme".to_string(),
///         project_id: "web".to_string(),
///         fetch_manifest: true,
///     };
///     let report = indexer.start_indexing(session.clone()).await?;
///     println!("Uploaded {} files", report.files_uploaded);
///
///     let hits = indexer.search(&SearchQuery::new("parse config"), &session).await?;
///     println!("{} hits", hits.len());
///
///     indexer.stop().await;
///     Ok(())
/// }
/// ```
pub struct Indexer<G: GitCommands + 'static, A: IndexApi + 'static> {
    inner: Arc<IndexerInner<G, A>>,
    watcher: Mutex<Option<GitStateWatcher<G>>>,
}

impl Indexer<GitCommandRunner, ApiClient> {
    /// Indexer for the repository containing `path`, talking HTTP
    pub async fn open(
        path: impl AsRef<Path>,
        config: Config,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let git = Arc::new(GitCommandRunner::discover(path).await?);
        let api = Arc::new(ApiClient::new(&config.api)?);
        Self::new(git, api, tokens, config)
    }
}

impl<G: GitCommands + 'static, A: IndexApi + 'static> Indexer<G, A> {
    pub fn new(
        git: Arc<G>,
        api: Arc<A>,
        tokens: Arc<dyn TokenProvider>,
        config: Config,
    ) -> Result<Self> {
        config.validate()?;
        let exclude = compile_patterns(&config.indexing.exclude_patterns)?;
        let scanner = Scanner::new(git.clone(), &config.git, exclude);
        let chunker = CodeChunker::new(config.chunker.clone());
        let (state, _) = watch::channel(IndexerState {
            message: "Idle".to_string(),
            ..IndexerState::default()
        });

        Ok(Self {
            inner: Arc::new(IndexerInner {
                git,
                scanner,
                api,
                tokens,
                chunker,
                config: Arc::new(config),
                state,
                session: RwLock::new(None),
                deleted_files: RwLock::new(Vec::new()),
                cancel: std::sync::Mutex::new(CancellationToken::new()),
            }),
            watcher: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn repo_root(&self) -> &Path {
        self.inner.git.repo_root()
    }

    /// Snapshot of the current state
    pub fn get_state(&self) -> IndexerState {
        self.inner.state.borrow().clone()
    }

    /// Receive every state transition from now on
    pub fn subscribe_state(&self) -> watch::Receiver<IndexerState> {
        self.inner.state.subscribe()
    }

    /// Scan, upload what the server lacks, then watch for branch switches
    /// and commits.
    ///
    /// A fatal error moves the state to `error` and is returned; nothing is
    /// retried automatically.
    pub async fn start_indexing(&self, session: IndexingConfig) -> Result<IndexReport> {
        self.detach_watcher().await;
        *self.inner.session.write().await = Some(session.clone());

        let report = match self.inner.index_pass(&session).await {
            Ok(report) => report,
            Err(e) => {
                self.inner.fail(&e);
                return Err(e);
            }
        };

        let watcher = GitStateWatcher::new(
            self.inner.git.clone(),
            self.inner.clone(),
            self.inner.config.git.debounce(),
        );
        if let Err(e) = watcher.start().await {
            self.inner.fail(&e);
            return Err(e);
        }
        *self.watcher.lock().await = Some(watcher);

        Ok(report)
    }

    /// Branch-preferenced search: hits from the current branch's delta index
    /// win, the base branch fills in, and files deleted locally are excluded
    pub async fn search(
        &self,
        query: &SearchQuery,
        session: &IndexingConfig,
    ) -> Result<Vec<SearchResult>> {
        query.validate()?;

        let base_branch = self.inner.scanner.resolve_base_branch().await?;
        let current = self.inner.scanner.current_branch().await?;
        let (prefer_branch, fallback_branch) = branch_preference(current, &base_branch);

        let request = SearchRequest {
            query: query.query.clone(),
            organization_id: session.organization_id.clone(),
            project_id: session.project_id.clone(),
            prefer_branch,
            fallback_branch,
            exclude_files: self.inner.deleted_files.read().await.clone(),
            limit: query.limit,
        };

        let token = self.inner.tokens.token().await?;
        let cancel = self.inner.cancel_token();
        let results = self
            .inner
            .api
            .search_code(&request, &token, Some(&cancel))
            .await?;

        tracing::info!(
            "Search '{}' returned {} results (prefer {}, fallback {:?})",
            request.query,
            results.len(),
            request.prefer_branch,
            request.fallback_branch
        );
        Ok(results)
    }

    /// Re-index or drop one file after an editor save or delete
    pub async fn handle_file_change(&self, event: FileChangeEvent) -> Result<()> {
        let Some(session) = self.inner.session.read().await.clone() else {
            tracing::debug!("No indexing session, ignoring change to {}", event.file_path);
            return Ok(());
        };
        self.inner.index_file_change(&session, &event).await
    }

    /// Stop watching, abort in-flight requests and return to idle
    pub async fn stop(&self) {
        self.detach_watcher().await;
        self.inner.cancel_in_flight();
        *self.inner.session.write().await = None;
        self.inner.set_state(|state| {
            state.status = IndexerStatus::Idle;
            state.message = "Stopped".to_string();
        });
        tracing::info!("Indexer stopped");
    }

    async fn detach_watcher(&self) {
        if let Some(watcher) = self.watcher.lock().await.take() {
            watcher.dispose();
        }
    }
}

impl<G: GitCommands, A: IndexApi> IndexerInner<G, A> {
    pub(crate) fn set_state(&self, update: impl FnOnce(&mut IndexerState)) {
        self.state.send_modify(update);
    }

    pub(crate) fn fail(&self, error: &IndexerError) {
        tracing::error!("Indexing failed: {}", error);
        let message = error.to_user_string();
        self.set_state(|state| {
            state.status = IndexerStatus::Error;
            state.message = "Indexing failed".to_string();
            state.error = Some(message);
        });
    }

    pub(crate) fn mark_watching(&self, report: &IndexReport) {
        let message = match &report.branch {
            Some(branch) => format!("Watching {}", branch),
            None => "HEAD detached, waiting for a branch".to_string(),
        };
        let files = report.files_scanned;
        let chunks = report.chunks_uploaded;
        let branch = report.branch.clone();
        self.set_state(|state| {
            state.status = IndexerStatus::Watching;
            state.message = message;
            state.git_branch = branch;
            state.last_sync_time = Some(Utc::now());
            state.total_files = Some(files);
            state.total_chunks = Some(chunks);
            state.error = None;
        });
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .map(|token| token.clone())
            .unwrap_or_default()
    }

    fn cancel_in_flight(&self) {
        if let Ok(mut token) = self.cancel.lock() {
            token.cancel();
            *token = CancellationToken::new();
        }
    }

    pub(crate) async fn session(&self) -> Option<IndexingConfig> {
        self.session.read().await.clone()
    }

    pub(crate) async fn replace_deleted_files(&self, deleted: Vec<String>) {
        *self.deleted_files.write().await = deleted;
    }

    pub(crate) async fn note_deleted_file(&self, path: &str) {
        let mut deleted = self.deleted_files.write().await;
        if !deleted.iter().any(|p| p == path) {
            deleted.push(path.to_string());
        }
    }

    pub(crate) async fn forget_deleted_file(&self, path: &str) {
        self.deleted_files.write().await.retain(|p| p != path);
    }
}

/// Current branch first, base branch as fallback; a detached HEAD or the
/// base branch itself searches the base branch alone
fn branch_preference(current: Option<String>, base_branch: &str) -> (String, Option<String>) {
    match current {
        Some(branch) if !branch.eq_ignore_ascii_case(base_branch) => {
            (branch, Some(base_branch.to_string()))
        }
        _ => (base_branch.to_string(), None),
    }
}
