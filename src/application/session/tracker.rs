//! Per-file thread tracking.
//!
//! A [`SessionFileTracker`] owns the resolved comment threads of one file of a
//! pull request. Readers get an immutable [`FileSnapshot`]; every refresh
//! builds a new snapshot and swaps it in whole.

use super::SessionContext;
use super::rebuild::RebuildSignal;
use crate::application::review::{build_comment_threads, merge_comment, update_comment_threads};
use crate::domain::{CommentThread, DiffChunk, ReviewComment, ThreadId};
use crate::infra::diff::parse_diff;
use crate::infra::editor::{AnchorId, LiveDocument};
use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Resolving,
    Resolved,
}

/// Notifications for renderers of a tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// Threads were rebuilt from scratch; redraw everything
    Rebuilt,
    /// Only these 0-based lines need redrawing
    LinesChanged(Vec<usize>),
}

/// Everything known about one file at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSnapshot {
    /// Base commit of the pull request
    pub base_sha: Option<String>,
    /// Commit the content corresponds to; `None` when it matches no pushed commit
    pub commit_sha: Option<String>,
    pub diff: Vec<DiffChunk>,
    pub threads: Vec<CommentThread>,
    /// Document anchors pinning resolved threads
    pub anchors: HashMap<ThreadId, AnchorId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshKind {
    Full,
    Incremental,
}

struct Computed {
    base_sha: String,
    commit_sha: Option<String>,
    diff: Vec<DiffChunk>,
}

pub struct SessionFileTracker {
    relative_path: String,
    context: Arc<SessionContext>,
    document: RwLock<Option<Arc<dyn LiveDocument>>>,
    snapshot: RwLock<Arc<FileSnapshot>>,
    state: Mutex<TrackerState>,
    /// Set when a full rebuild was discarded or failed; the next refresh must be full.
    full_rebuild_pending: Mutex<bool>,
    refresh_lock: tokio::sync::Mutex<()>,
    signal: Arc<RebuildSignal>,
    events: broadcast::Sender<FileEvent>,
    /// Cancels the live refresh worker; `None` until a document is attached
    worker: Mutex<Option<CancellationToken>>,
}

impl SessionFileTracker {
    pub(crate) fn new(relative_path: String, context: Arc<SessionContext>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let signal = Arc::new(RebuildSignal::new(context.rebuild_quiet));
        Arc::new(Self {
            relative_path,
            context,
            document: RwLock::new(None),
            snapshot: RwLock::new(Arc::new(FileSnapshot::default())),
            state: Mutex::new(TrackerState::Uninitialized),
            full_rebuild_pending: Mutex::new(false),
            refresh_lock: tokio::sync::Mutex::new(()),
            signal,
            events,
            worker: Mutex::new(None),
        })
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn snapshot(&self) -> Arc<FileSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn threads(&self) -> Vec<CommentThread> {
        self.snapshot.read().threads.clone()
    }

    pub fn diff(&self) -> Vec<DiffChunk> {
        self.snapshot.read().diff.clone()
    }

    pub fn base_sha(&self) -> Option<String> {
        self.snapshot.read().base_sha.clone()
    }

    pub fn commit_sha(&self) -> Option<String> {
        self.snapshot.read().commit_sha.clone()
    }

    pub fn state(&self) -> TrackerState {
        *self.state.lock()
    }

    pub fn is_live(&self) -> bool {
        self.document.read().is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent> {
        self.events.subscribe()
    }

    fn document(&self) -> Option<Arc<dyn LiveDocument>> {
        self.document.read().clone()
    }

    fn emit(&self, event: FileEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Bind a live document and re-resolve against its content.
    pub(crate) async fn attach_document(self: &Arc<Self>, document: Arc<dyn LiveDocument>) {
        self.release_anchors();
        *self.document.write() = Some(document);
        self.start_worker();
        self.rebuild().await;
    }

    /// Unbind the live document; the file is resolved against the head commit again.
    pub(crate) async fn detach_document(&self) {
        self.release_anchors();
        *self.document.write() = None;
        self.signal.take_pending();
        self.rebuild().await;
    }

    /// Spawn the live refresh worker unless one is running. A tracker that
    /// was closed gets a fresh worker.
    fn start_worker(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|cancel| !cancel.is_cancelled()) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::warn!(
                "no async runtime, live refresh disabled for {}",
                self.relative_path
            );
            return;
        };
        let cancel = CancellationToken::new();
        handle.spawn(run_worker(
            Arc::downgrade(self),
            self.signal.clone(),
            cancel.clone(),
        ));
        *worker = Some(cancel);
    }

    fn stop_worker(&self) {
        if let Some(cancel) = self.worker.lock().take() {
            cancel.cancel();
        }
    }

    fn needs_full_refresh(&self) -> bool {
        self.state() == TrackerState::Uninitialized || *self.full_rebuild_pending.lock()
    }

    /// Resolve the file unless that already happened. A file whose last
    /// refresh failed is resolved again.
    pub async fn ensure_resolved(&self) {
        if self.state() == TrackerState::Resolved && !*self.full_rebuild_pending.lock() {
            return;
        }
        let _guard = self.refresh_lock.lock().await;
        if self.needs_full_refresh() {
            self.refresh_locked(RefreshKind::Full).await;
        }
    }

    /// Recompute the diff and resolve every comment from scratch.
    pub async fn rebuild(&self) {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked(RefreshKind::Full).await;
    }

    /// Recompute the diff and re-resolve the existing threads.
    pub async fn update(&self) {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked(RefreshKind::Incremental).await;
    }

    async fn refresh_locked(&self, requested: RefreshKind) {
        let kind = if self.needs_full_refresh() {
            RefreshKind::Full
        } else {
            requested
        };

        let previous_state = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, TrackerState::Resolving)
        };

        let document = self.document();
        let version = document.as_ref().map(|document| document.version());

        let computed = match self.compute(document.as_ref()).await {
            Ok(computed) => computed,
            Err(err) => {
                log::warn!("Failed to refresh {}: {err:#}", self.relative_path);
                self.publish_empty();
                *self.full_rebuild_pending.lock() = true;
                *self.state.lock() = TrackerState::Resolved;
                return;
            }
        };

        let pull_request = self.context.pull_request();
        let mut snapshot = self.snapshot.write();

        let current_version = document.as_ref().map(|document| document.version());
        if current_version != version {
            log::debug!(
                "discarding refresh of {}, document changed from {version:?} to {current_version:?}",
                self.relative_path
            );
            if kind == RefreshKind::Full {
                *self.full_rebuild_pending.lock() = true;
            }
            *self.state.lock() = match previous_state {
                TrackerState::Resolving => TrackerState::Resolved,
                other => other,
            };
            return;
        }

        let (threads, changed) = match kind {
            RefreshKind::Full => (
                build_comment_threads(&pull_request, &self.relative_path, &computed.diff),
                None,
            ),
            RefreshKind::Incremental => {
                let mut threads = snapshot.threads.clone();
                let changed = update_comment_threads(&mut threads, &computed.diff);
                (threads, Some(changed))
            }
        };

        let mut next = FileSnapshot {
            base_sha: Some(computed.base_sha),
            commit_sha: computed.commit_sha,
            diff: computed.diff,
            threads,
            anchors: HashMap::new(),
        };
        if let Some(document) = &document {
            release_all(document.as_ref(), &snapshot.anchors);
            next.anchors = track_threads(document.as_ref(), &next.threads);
        }
        *snapshot = Arc::new(next);
        drop(snapshot);

        *self.full_rebuild_pending.lock() = false;
        *self.state.lock() = TrackerState::Resolved;

        match changed {
            None => self.emit(FileEvent::Rebuilt),
            Some(lines) if !lines.is_empty() => self.emit(FileEvent::LinesChanged(lines)),
            Some(_) => {}
        }
    }

    async fn compute(&self, document: Option<&Arc<dyn LiveDocument>>) -> Result<Computed> {
        let pull_request = self.context.pull_request();
        let merge_base = self.context.merge_base(&pull_request).await?;
        let git = &self.context.git;
        let repository = &self.context.repository;

        let (diff_text, commit_sha) = match document {
            Some(document) => {
                let contents = document.contents();
                let diff = git
                    .diff_contents(
                        repository,
                        &merge_base,
                        &pull_request.head.sha,
                        &self.relative_path,
                        &contents,
                    )
                    .await?;
                let commit_sha = if git
                    .is_unmodified_and_pushed(repository, &self.relative_path, &contents)
                    .await?
                {
                    Some(git.tip_sha(repository).await?)
                } else {
                    None
                };
                (diff, commit_sha)
            }
            None => {
                let diff = git
                    .diff(
                        repository,
                        &merge_base,
                        &pull_request.head.sha,
                        &self.relative_path,
                    )
                    .await?;
                (diff, Some(pull_request.head.sha.clone()))
            }
        };

        Ok(Computed {
            base_sha: pull_request.base.sha.clone(),
            commit_sha,
            diff: parse_diff(&diff_text)?,
        })
    }

    fn publish_empty(&self) {
        let document = self.document();
        let mut snapshot = self.snapshot.write();
        if let Some(document) = &document {
            release_all(document.as_ref(), &snapshot.anchors);
        }
        *snapshot = Arc::new(FileSnapshot::default());
        drop(snapshot);
        self.emit(FileEvent::Rebuilt);
    }

    /// React to an edit of the live document.
    ///
    /// Threads whose anchor moved are moved right away and marked stale, then
    /// a debounced refresh is requested to re-resolve them properly.
    pub fn buffer_changed(&self) {
        let Some(document) = self.document() else {
            return;
        };

        let mut changed = BTreeSet::new();
        {
            let mut guard = self.snapshot.write();
            let moved: Vec<(usize, usize)> = guard
                .threads
                .iter()
                .enumerate()
                .filter_map(|(index, thread)| {
                    let anchor = guard.anchors.get(&thread.id)?;
                    let line = document.anchor_line(*anchor)?;
                    (thread.line_number != Some(line)).then_some((index, line))
                })
                .collect();

            if !moved.is_empty() {
                let snapshot = Arc::make_mut(&mut guard);
                for (index, line) in moved {
                    let thread = &mut snapshot.threads[index];
                    changed.extend(thread.line_number);
                    changed.insert(line);
                    thread.line_number = Some(line);
                    thread.is_stale = true;
                }
            }
        }

        if !changed.is_empty() {
            self.emit(FileEvent::LinesChanged(changed.into_iter().collect()));
        }
        self.signal.signal(document.version());
    }

    /// Add a freshly posted comment without waiting for a rebuild.
    pub fn merge_comment(&self, comment: ReviewComment) {
        if self.state() == TrackerState::Uninitialized {
            return;
        }

        let document = self.document();
        let line = {
            let mut guard = self.snapshot.write();
            let snapshot = Arc::make_mut(&mut guard);
            let line = merge_comment(
                &mut snapshot.threads,
                comment,
                &self.relative_path,
                &snapshot.diff,
            );
            if let Some(document) = &document {
                for thread in &snapshot.threads {
                    if let Some(thread_line) = thread.line_number
                        && !snapshot.anchors.contains_key(&thread.id)
                    {
                        snapshot
                            .anchors
                            .insert(thread.id, document.track_line(thread_line));
                    }
                }
            }
            line
        };

        if let Some(line) = line {
            self.emit(FileEvent::LinesChanged(vec![line]));
        }
    }

    fn release_anchors(&self) {
        let Some(document) = self.document() else {
            return;
        };
        let mut guard = self.snapshot.write();
        if guard.anchors.is_empty() {
            return;
        }
        release_all(document.as_ref(), &guard.anchors);
        Arc::make_mut(&mut guard).anchors.clear();
    }

    /// Stop live refreshes and release every document anchor.
    pub fn close(&self) {
        self.stop_worker();
        self.signal.take_pending();
        self.release_anchors();
    }
}

impl Drop for SessionFileTracker {
    fn drop(&mut self) {
        self.stop_worker();
        self.release_anchors();
    }
}

impl std::fmt::Debug for SessionFileTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFileTracker")
            .field("relative_path", &self.relative_path)
            .field("state", &self.state())
            .field("live", &self.is_live())
            .finish()
    }
}

fn track_threads(document: &dyn LiveDocument, threads: &[CommentThread]) -> HashMap<ThreadId, AnchorId> {
    threads
        .iter()
        .filter_map(|thread| Some((thread.id, document.track_line(thread.line_number?))))
        .collect()
}

fn release_all(document: &dyn LiveDocument, anchors: &HashMap<ThreadId, AnchorId>) {
    for anchor in anchors.values() {
        document.release_anchor(*anchor);
    }
}

async fn run_worker(
    tracker: Weak<SessionFileTracker>,
    signal: Arc<RebuildSignal>,
    cancel: CancellationToken,
) {
    loop {
        let version = tokio::select! {
            _ = cancel.cancelled() => break,
            version = signal.next() => version,
        };

        let Some(tracker) = tracker.upgrade() else {
            break;
        };
        log::debug!(
            "refreshing {} for document version {version}",
            tracker.relative_path
        );
        tracker.update().await;
    }
}
