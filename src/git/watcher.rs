use crate::error::{Result, WatchError};
use crate::git::runner::GitCommands;
use async_trait::async_trait;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Branch and commit the working tree is on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitSnapshot {
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub is_detached: bool,
}

impl GitSnapshot {
    fn same_position(&self, other: &GitSnapshot) -> bool {
        self.branch == other.branch && self.commit == other.commit
    }
}

/// Notifications fanned out to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitStateEvent {
    /// Branch or commit moved and the rescan completed
    Changed {
        previous: Option<GitSnapshot>,
        current: GitSnapshot,
    },
    /// HEAD became detached; indexing is suspended
    Detached,
    /// Branch or commit moved but the rescan failed
    RescanFailed { message: String },
}

/// Called when the watcher sees the repository move to a new branch or commit
#[async_trait]
pub trait RescanTrigger: Send + Sync {
    async fn rescan(&self, snapshot: &GitSnapshot) -> Result<()>;
}

struct WatcherInner<G: GitCommands> {
    git: Arc<G>,
    trigger: Arc<dyn RescanTrigger>,
    debounce: Duration,
    snapshot: Mutex<Option<GitSnapshot>>,
    processing: AtomicBool,
    // Set once a rescan fails; only a fresh watcher resumes rescanning
    halted: AtomicBool,
    events_tx: Mutex<Option<broadcast::Sender<GitStateEvent>>>,
}

struct Running {
    _watchers: Vec<RecommendedWatcher>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Watches `HEAD`, `refs/heads/**` and `packed-refs` and triggers a rescan
/// when the checked-out branch or commit changes
///
/// Bursts of writes collapse into one check after the debounce window, and a
/// change that arrives while a rescan is running is dropped rather than
/// queued; the next notification reconciles to the latest state. A failed
/// rescan halts the watcher: later changes are ignored until a new watcher is
/// started.
pub struct GitStateWatcher<G: GitCommands + 'static> {
    inner: Arc<WatcherInner<G>>,
    running: Mutex<Option<Running>>,
}

/// Resets the reentrancy flag however `handle_git_change` exits
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<G: GitCommands + 'static> GitStateWatcher<G> {
    pub fn new(git: Arc<G>, trigger: Arc<dyn RescanTrigger>, debounce: Duration) -> Self {
        let (events_tx, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(WatcherInner {
                git,
                trigger,
                debounce,
                snapshot: Mutex::new(None),
                processing: AtomicBool::new(false),
                halted: AtomicBool::new(false),
                events_tx: Mutex::new(Some(events_tx)),
            }),
            running: Mutex::new(None),
        }
    }

    /// Capture the initial snapshot and start watching git internals
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        self.inner.prime().await?;

        let git_dir = self.inner.git.git_dir().await?;
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let watchers = install_watchers(&git_dir, notify_tx)?;

        let (shutdown, task) = self.spawn_loop(notify_rx);
        self.store_running(Running {
            _watchers: watchers,
            shutdown,
            task,
        });

        tracing::info!("Watching git state in {}", git_dir.display());
        Ok(())
    }

    fn spawn_loop(&self, notify_rx: mpsc::UnboundedReceiver<()>) -> (CancellationToken, JoinHandle<()>) {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_event_loop(
            self.inner.clone(),
            notify_rx,
            shutdown.clone(),
        ));
        (shutdown, task)
    }

    fn store_running(&self, running: Running) {
        if let Ok(mut slot) = self.running.lock() {
            *slot = Some(running);
        }
    }

    /// Whether a failed rescan stopped this watcher from triggering more
    pub fn is_halted(&self) -> bool {
        self.inner.halted.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Last recorded snapshot; `None` while detached or before `start`
    pub fn snapshot(&self) -> Option<GitSnapshot> {
        self.inner.current_snapshot()
    }

    /// Subscribe to state events; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> broadcast::Receiver<GitStateEvent> {
        match self.inner.events_tx.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(tx) => tx.subscribe(),
                None => closed_receiver(),
            },
            Err(_) => closed_receiver(),
        }
    }

    /// Re-read git state and rescan if the branch or commit moved.
    ///
    /// Returns `true` when a rescan ran. Returns `false` immediately when
    /// another change is still being processed or the watcher has halted.
    pub async fn handle_git_change(&self) -> bool {
        self.inner.handle_git_change().await
    }

    /// Stop watching, release watcher handles and drop all subscribers
    pub fn dispose(&self) {
        let running = self.running.lock().ok().and_then(|mut slot| slot.take());
        if let Some(running) = running {
            running.shutdown.cancel();
            running.task.abort();
        }
        if let Ok(mut tx) = self.inner.events_tx.lock() {
            tx.take();
        }
        tracing::debug!("Git state watcher disposed");
    }
}

impl<G: GitCommands + 'static> Drop for GitStateWatcher<G> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.running.lock()
            && let Some(running) = slot.take()
        {
            running.shutdown.cancel();
            running.task.abort();
        }
    }
}

impl<G: GitCommands> WatcherInner<G> {
    async fn capture(&self) -> Result<GitSnapshot> {
        match self.git.current_branch().await? {
            Some(branch) => Ok(GitSnapshot {
                branch: Some(branch),
                commit: self.git.head_commit().await?,
                is_detached: false,
            }),
            None => Ok(GitSnapshot {
                branch: None,
                commit: self.git.head_commit().await?,
                is_detached: true,
            }),
        }
    }

    async fn prime(&self) -> Result<()> {
        let snapshot = self.capture().await?;
        if snapshot.is_detached {
            tracing::info!("HEAD is detached; indexing suspended until a branch is checked out");
            self.set_snapshot(None);
        } else {
            self.set_snapshot(Some(snapshot));
        }
        Ok(())
    }

    fn current_snapshot(&self) -> Option<GitSnapshot> {
        self.snapshot.lock().ok().and_then(|s| s.clone())
    }

    fn set_snapshot(&self, snapshot: Option<GitSnapshot>) {
        if let Ok(mut slot) = self.snapshot.lock() {
            *slot = snapshot;
        }
    }

    fn publish(&self, event: GitStateEvent) {
        if let Ok(guard) = self.events_tx.lock()
            && let Some(tx) = guard.as_ref()
        {
            // No subscribers is fine
            let _ = tx.send(event);
        }
    }

    async fn handle_git_change(&self) -> bool {
        if self.processing.swap(true, Ordering::SeqCst) {
            tracing::debug!("Git change already being processed, dropping notification");
            return false;
        }
        let _guard = ProcessingGuard(&self.processing);

        if self.halted.load(Ordering::SeqCst) {
            tracing::debug!("Watcher halted after a failed rescan, ignoring git change");
            return false;
        }

        let current = match self.capture().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Failed to read git state: {}", e);
                return false;
            }
        };

        if current.is_detached {
            if self.current_snapshot().is_some() {
                tracing::info!("HEAD became detached; indexing suspended");
                self.publish(GitStateEvent::Detached);
            }
            self.set_snapshot(None);
            return false;
        }

        let previous = self.current_snapshot();
        if previous
            .as_ref()
            .is_some_and(|prev| prev.same_position(&current))
        {
            tracing::debug!("Git state unchanged");
            return false;
        }

        tracing::info!(
            "Git state changed: {:?}@{:?} -> {:?}@{:?}",
            previous.as_ref().and_then(|p| p.branch.as_deref()),
            previous.as_ref().and_then(|p| p.commit.as_deref()),
            current.branch.as_deref(),
            current.commit.as_deref()
        );

        match self.trigger.rescan(&current).await {
            Ok(()) => {
                self.set_snapshot(Some(current.clone()));
                self.publish(GitStateEvent::Changed { previous, current });
            }
            Err(e) => {
                tracing::warn!("Rescan after git change failed, halting watcher: {}", e);
                self.halted.store(true, Ordering::SeqCst);
                self.publish(GitStateEvent::RescanFailed {
                    message: e.to_user_string(),
                });
            }
        }
        true
    }
}

fn closed_receiver() -> broadcast::Receiver<GitStateEvent> {
    let (_, rx) = broadcast::channel(1);
    rx
}

/// One debounced check per burst of notifications
async fn run_event_loop<G: GitCommands>(
    inner: Arc<WatcherInner<G>>,
    mut notify_rx: mpsc::UnboundedReceiver<()>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = notify_rx.recv() => {
                if msg.is_none() {
                    break;
                }
                if !settle(&mut notify_rx, inner.debounce, &shutdown).await {
                    break;
                }
                inner.handle_git_change().await;
                if inner.halted.load(Ordering::SeqCst) {
                    break;
                }
                // Writes made while the rescan ran are dropped, not queued
                while notify_rx.try_recv().is_ok() {}
            }
        }
    }
    tracing::debug!("Git state event loop stopped");
}

/// Wait until no notification has arrived for `window`; false on shutdown
async fn settle(
    notify_rx: &mut mpsc::UnboundedReceiver<()>,
    window: Duration,
    shutdown: &CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return false,
            _ = tokio::time::sleep(window) => return true,
            msg = notify_rx.recv() => {
                if msg.is_none() {
                    return false;
                }
            }
        }
    }
}

/// Whether a filesystem event path is one that records branch or commit state
fn is_git_state_path(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some("HEAD") | Some("packed-refs") => true,
        _ => {
            let components: Vec<_> = path
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            components
                .windows(2)
                .any(|pair| pair[0] == "refs" && pair[1] == "heads")
        }
    }
}

fn is_relevant(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_)) && event.paths.iter().any(|p| is_git_state_path(p))
}

/// `HEAD` and `packed-refs` are replaced via rename, so the git dir itself is
/// watched (non-recursively) and filtered by name
fn install_watchers(
    git_dir: &Path,
    notify_tx: mpsc::UnboundedSender<()>,
) -> Result<Vec<RecommendedWatcher>> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) if is_relevant(&event) => {
                let _ = notify_tx.send(());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Git watcher error: {}", e),
        },
        NotifyConfig::default(),
    )
    .map_err(|e| WatchError::InitFailed(e.to_string()))?;

    watcher
        .watch(git_dir, RecursiveMode::NonRecursive)
        .map_err(|e| WatchError::WatchFailed {
            path: git_dir.display().to_string(),
            reason: e.to_string(),
        })?;

    let heads = git_dir.join("refs").join("heads");
    if heads.exists() {
        watcher
            .watch(&heads, RecursiveMode::Recursive)
            .map_err(|e| WatchError::WatchFailed {
                path: heads.display().to_string(),
                reason: e.to_string(),
            })?;
    }

    Ok(vec![watcher])
}
