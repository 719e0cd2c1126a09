//! Pull request review sessions.
//!
//! A [`Session`] is the live view of one pull request inside a local
//! checkout: the current pull request model, one [`SessionFileTracker`] per
//! file anyone asked about, and the operations that post new comments.

pub mod rebuild;
pub mod registry;
pub mod tracker;

pub use rebuild::RebuildSignal;
pub use registry::SessionRegistry;
pub use tracker::{FileEvent, FileSnapshot, SessionFileTracker, TrackerState};

use crate::domain::{
    Account, CommentId, LocalRepository, PullRequest, ReviewComment, SessionError, SessionKey,
    normalize_repo_path,
};
use crate::infra::editor::LiveDocument;
use crate::infra::vcs::{GitBackend, PostCommentRequest, PostReplyRequest, ReviewCommentApi};
use anyhow::Result;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// External services a session talks to.
#[derive(Clone)]
pub struct SessionServices {
    pub git: Arc<dyn GitBackend>,
    pub comments: Arc<dyn ReviewCommentApi>,
}

/// Everything needed to open a session.
pub struct SessionInput {
    pub services: SessionServices,
    /// Signed-in user posting comments
    pub user: Account,
    pub pull_request: PullRequest,
    pub repository: LocalRepository,
    /// Owner of the repository comments are posted to (the fork owner)
    pub repository_owner: String,
    /// Whether the pull request branch is checked out locally
    pub is_checked_out: bool,
    /// Quiet window before live edits trigger a refresh
    pub rebuild_quiet: Duration,
}

#[derive(Debug, Clone)]
struct MergeBaseEntry {
    base_sha: String,
    head_sha: String,
    merge_base: String,
}

/// State shared between a session and its file trackers.
pub(crate) struct SessionContext {
    pub(crate) git: Arc<dyn GitBackend>,
    pub(crate) repository: LocalRepository,
    pub(crate) rebuild_quiet: Duration,
    pull_request: watch::Receiver<Arc<PullRequest>>,
    merge_base: tokio::sync::Mutex<Option<MergeBaseEntry>>,
}

impl SessionContext {
    pub(crate) fn pull_request(&self) -> Arc<PullRequest> {
        self.pull_request.borrow().clone()
    }

    /// Merge base of `pull_request`, cached per base/head pair.
    pub(crate) async fn merge_base(&self, pull_request: &PullRequest) -> Result<String> {
        let mut cached = self.merge_base.lock().await;
        if let Some(entry) = cached.as_ref()
            && entry.base_sha == pull_request.base.sha
            && entry.head_sha == pull_request.head.sha
        {
            return Ok(entry.merge_base.clone());
        }

        let merge_base = self.git.merge_base(&self.repository, pull_request).await?;
        *cached = Some(MergeBaseEntry {
            base_sha: pull_request.base.sha.clone(),
            head_sha: pull_request.head.sha.clone(),
            merge_base: merge_base.clone(),
        });
        Ok(merge_base)
    }
}

struct SessionInner {
    context: Arc<SessionContext>,
    comments: Arc<dyn ReviewCommentApi>,
    user: Account,
    repository_owner: String,
    is_checked_out: AtomicBool,
    pull_request_tx: watch::Sender<Arc<PullRequest>>,
    files: Mutex<HashMap<String, Arc<SessionFileTracker>>>,
}

/// A live review session for one pull request. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(input: SessionInput) -> Self {
        let (pull_request_tx, pull_request_rx) = watch::channel(Arc::new(input.pull_request));
        let context = Arc::new(SessionContext {
            git: input.services.git,
            repository: input.repository,
            rebuild_quiet: input.rebuild_quiet,
            pull_request: pull_request_rx,
            merge_base: tokio::sync::Mutex::new(None),
        });

        let session = Self {
            inner: Arc::new(SessionInner {
                context,
                comments: input.services.comments,
                user: input.user,
                repository_owner: input.repository_owner,
                is_checked_out: AtomicBool::new(input.is_checked_out),
                pull_request_tx,
                files: Mutex::new(HashMap::new()),
            }),
        };
        log::info!("opened review session {}", session.key());
        session
    }

    pub fn key(&self) -> SessionKey {
        self.pull_request().session_key()
    }

    /// The current pull request model.
    pub fn pull_request(&self) -> Arc<PullRequest> {
        self.inner.pull_request_tx.borrow().clone()
    }

    /// Follow pull request model replacements.
    pub fn watch_pull_request(&self) -> watch::Receiver<Arc<PullRequest>> {
        self.inner.pull_request_tx.subscribe()
    }

    pub fn user(&self) -> &Account {
        &self.inner.user
    }

    pub fn repository(&self) -> &LocalRepository {
        &self.inner.context.repository
    }

    pub fn repository_owner(&self) -> &str {
        &self.inner.repository_owner
    }

    pub fn is_checked_out(&self) -> bool {
        self.inner.is_checked_out.load(Ordering::SeqCst)
    }

    pub fn set_checked_out(&self, checked_out: bool) {
        self.inner.is_checked_out.store(checked_out, Ordering::SeqCst);
    }

    /// Number of handles to this session, the registry's included.
    pub(crate) fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    fn tracker_for(&self, relative_path: &str) -> Arc<SessionFileTracker> {
        let path = normalize_repo_path(relative_path);
        let mut files = self.inner.files.lock();
        files
            .entry(path.clone())
            .or_insert_with(|| SessionFileTracker::new(path, self.inner.context.clone()))
            .clone()
    }

    fn tracked(&self, relative_path: &str) -> Option<Arc<SessionFileTracker>> {
        self.inner
            .files
            .lock()
            .get(&normalize_repo_path(relative_path))
            .cloned()
    }

    fn trackers(&self) -> Vec<Arc<SessionFileTracker>> {
        self.inner.files.lock().values().cloned().collect()
    }

    /// The tracker for `relative_path`, resolved before it is returned.
    pub async fn get_file(&self, relative_path: &str) -> Arc<SessionFileTracker> {
        let tracker = self.tracker_for(relative_path);
        tracker.ensure_resolved().await;
        tracker
    }

    /// Trackers for every changed file plus any other file already tracked.
    pub async fn get_all_files(&self) -> Vec<Arc<SessionFileTracker>> {
        let pull_request = self.pull_request();
        let mut paths: Vec<String> = pull_request
            .changed_files
            .iter()
            .map(|file| normalize_repo_path(&file.file_name))
            .collect();
        let mut extra: Vec<String> = self
            .inner
            .files
            .lock()
            .keys()
            .filter(|path| !paths.contains(*path))
            .cloned()
            .collect();
        extra.sort();
        paths.extend(extra);

        let trackers: Vec<_> = paths.iter().map(|path| self.tracker_for(path)).collect();
        join_all(trackers.iter().map(|tracker| tracker.ensure_resolved())).await;
        trackers
    }

    /// Start tracking an editor buffer for `relative_path`.
    pub async fn open_document(
        &self,
        relative_path: &str,
        document: Arc<dyn LiveDocument>,
    ) -> Arc<SessionFileTracker> {
        let tracker = self.tracker_for(relative_path);
        tracker.attach_document(document).await;
        tracker
    }

    /// Stop tracking the editor buffer for `relative_path`.
    pub async fn close_document(&self, relative_path: &str) {
        if let Some(tracker) = self.tracked(relative_path) {
            tracker.detach_document().await;
        }
    }

    pub async fn merge_base(&self) -> Result<String, SessionError> {
        let pull_request = self.pull_request();
        Ok(self.inner.context.merge_base(&pull_request).await?)
    }

    /// Post a new review comment at `position` of the diff against `commit_id`.
    pub async fn post_review_comment(
        &self,
        body: &str,
        commit_id: &str,
        path: &str,
        position: u32,
    ) -> Result<ReviewComment, SessionError> {
        let request = PostCommentRequest {
            repository_owner: self.inner.repository_owner.clone(),
            repository_name: self.repository().name.clone(),
            user: self.inner.user.clone(),
            number: self.pull_request().number,
            body: body.to_string(),
            commit_id: commit_id.to_string(),
            path: normalize_repo_path(path),
            position,
        };

        let comment = self
            .inner
            .comments
            .post_review_comment(request)
            .await
            .map_err(SessionError::PostFailed)?;
        self.add_comment(comment.clone());
        Ok(comment)
    }

    /// Reply to an existing review comment.
    pub async fn post_reply(
        &self,
        body: &str,
        in_reply_to: CommentId,
    ) -> Result<ReviewComment, SessionError> {
        let request = PostReplyRequest {
            repository_owner: self.inner.repository_owner.clone(),
            repository_name: self.repository().name.clone(),
            user: self.inner.user.clone(),
            number: self.pull_request().number,
            body: body.to_string(),
            in_reply_to,
        };

        let mut comment = self
            .inner
            .comments
            .post_reply(request)
            .await
            .map_err(SessionError::PostFailed)?;

        if let Some(parent) = self
            .pull_request()
            .review_comments
            .iter()
            .find(|candidate| candidate.id == in_reply_to)
        {
            if comment.path.is_empty() {
                comment.path = parent.path.clone();
            }
            if comment.diff_hunk.is_empty() {
                comment.diff_hunk = parent.diff_hunk.clone();
            }
            if comment.original_position.is_none() {
                comment.original_position = parent.original_position;
            }
        }

        self.add_comment(comment.clone());
        Ok(comment)
    }

    fn add_comment(&self, comment: ReviewComment) {
        self.inner.pull_request_tx.send_modify(|pull_request| {
            Arc::make_mut(pull_request)
                .review_comments
                .push(comment.clone());
        });

        if let Some(tracker) = self.tracked(&comment.path) {
            tracker.merge_comment(comment);
        }
    }

    /// Replace the pull request model and rebuild every tracked file.
    pub async fn update(&self, pull_request: PullRequest) {
        log::info!(
            "updating session {} ({} review comments)",
            self.key(),
            pull_request.review_comments.len()
        );
        self.inner.pull_request_tx.send_replace(Arc::new(pull_request));

        let trackers = self.trackers();
        join_all(trackers.iter().map(|tracker| tracker.rebuild())).await;
    }

    /// Stop every tracker's live refreshes.
    pub fn close(&self) {
        for tracker in self.trackers() {
            tracker.close();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key())
            .field("repository_owner", &self.inner.repository_owner)
            .field("files", &self.inner.files.lock().len())
            .finish()
    }
}
