//! In-memory collaborators for driving sessions without a real repository or
//! hosting service. Used by tests and by offline tooling.

use super::traits::{GitBackend, PostCommentRequest, PostReplyRequest, ReviewCommentApi};
use crate::domain::{CommentId, LocalRepository, PullRequest, ReviewComment};
use crate::infra::diff::{DEFAULT_CONTEXT_LINES, unified_diff_bytes};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct RepositoryState {
    commits: HashSet<String>,
    files: HashMap<(String, String), Vec<u8>>,
    merge_base: Option<String>,
    tip: String,
    diff_delay: Option<Duration>,
}

/// A fake repository: file contents keyed by commit and path.
#[derive(Debug)]
pub struct MemoryRepository {
    state: RwLock<RepositoryState>,
    pushed: AtomicBool,
    fail: AtomicBool,
    diff_calls: AtomicUsize,
    context_lines: usize,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RepositoryState {
                tip: "HEAD_SHA".to_string(),
                ..RepositoryState::default()
            }),
            pushed: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            diff_calls: AtomicUsize::new(0),
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }

    /// Record `contents` as the content of `path` at commit `sha`.
    pub fn add_file(&self, sha: &str, path: &str, contents: &str) {
        let mut state = self.state.write();
        state.commits.insert(sha.to_string());
        state
            .files
            .insert((sha.to_string(), path.to_string()), contents.as_bytes().to_vec());
    }

    /// Register a commit without any files.
    pub fn add_commit(&self, sha: &str) {
        self.state.write().commits.insert(sha.to_string());
    }

    /// Merge base reported for every pull request (`"MERGE_BASE"` when unset).
    pub fn set_merge_base(&self, sha: &str) {
        self.state.write().merge_base = Some(sha.to_string());
    }

    pub fn set_tip(&self, sha: &str) {
        self.state.write().tip = sha.to_string();
    }

    pub fn set_pushed(&self, pushed: bool) {
        self.pushed.store(pushed, Ordering::SeqCst);
    }

    /// Make every diff request fail until reset.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Delay each diff computation, to widen race windows in tests.
    pub fn set_diff_delay(&self, delay: Option<Duration>) {
        self.state.write().diff_delay = delay;
    }

    /// Number of diffs computed so far.
    pub fn diff_calls(&self) -> usize {
        self.diff_calls.load(Ordering::SeqCst)
    }

    fn file(&self, sha: &str, path: &str) -> Option<Vec<u8>> {
        self.state
            .read()
            .files
            .get(&(sha.to_string(), path.to_string()))
            .cloned()
    }

    fn has_commit(&self, sha: &str) -> bool {
        self.state.read().commits.contains(sha)
    }

    async fn begin_diff(&self) -> Result<()> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.read().diff_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("diff unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl GitBackend for MemoryRepository {
    async fn diff(
        &self,
        _repository: &LocalRepository,
        base_sha: &str,
        head_sha: &str,
        path: &str,
    ) -> Result<String> {
        self.begin_diff().await?;
        if !self.has_commit(base_sha) || !self.has_commit(head_sha) {
            return Ok(String::new());
        }
        let old = self.file(base_sha, path).unwrap_or_default();
        let new = self.file(head_sha, path).unwrap_or_default();
        Ok(unified_diff_bytes(&old, &new, self.context_lines))
    }

    async fn diff_contents(
        &self,
        _repository: &LocalRepository,
        base_sha: &str,
        _head_sha: &str,
        path: &str,
        contents: &[u8],
    ) -> Result<String> {
        self.begin_diff().await?;
        if !self.has_commit(base_sha) {
            return Ok(String::new());
        }
        let old = self.file(base_sha, path).unwrap_or_default();
        Ok(unified_diff_bytes(&old, contents, self.context_lines))
    }

    async fn extract_file(
        &self,
        _repository: &LocalRepository,
        sha: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.file(sha, path))
    }

    async fn merge_base(
        &self,
        _repository: &LocalRepository,
        _pull_request: &PullRequest,
    ) -> Result<String> {
        Ok(self
            .state
            .read()
            .merge_base
            .clone()
            .unwrap_or_else(|| "MERGE_BASE".to_string()))
    }

    async fn tip_sha(&self, _repository: &LocalRepository) -> Result<String> {
        Ok(self.state.read().tip.clone())
    }

    async fn is_unmodified_and_pushed(
        &self,
        _repository: &LocalRepository,
        path: &str,
        contents: &[u8],
    ) -> Result<bool> {
        if !self.pushed.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let tip = self.state.read().tip.clone();
        Ok(self.file(&tip, path).as_deref() == Some(contents))
    }
}

/// Records posted comments and answers with synthesized ones.
#[derive(Debug)]
pub struct MemoryCommentApi {
    comments: RwLock<Vec<PostCommentRequest>>,
    replies: RwLock<Vec<PostReplyRequest>>,
    next_id: AtomicU64,
    fail: AtomicBool,
}

impl Default for MemoryCommentApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCommentApi {
    pub fn new() -> Self {
        Self::starting_at(1000)
    }

    pub fn starting_at(first_id: CommentId) -> Self {
        Self {
            comments: RwLock::new(Vec::new()),
            replies: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(first_id),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn posted_comments(&self) -> Vec<PostCommentRequest> {
        self.comments.read().clone()
    }

    pub fn posted_replies(&self) -> Vec<PostReplyRequest> {
        self.replies.read().clone()
    }

    fn check(&self) -> Result<CommentId> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("comment service unavailable"));
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ReviewCommentApi for MemoryCommentApi {
    async fn post_review_comment(&self, request: PostCommentRequest) -> Result<ReviewComment> {
        let id = self.check()?;
        let comment = ReviewComment {
            id,
            path: request.path.clone(),
            author: request.user.login.clone(),
            body: request.body.clone(),
            diff_hunk: String::new(),
            position: Some(request.position),
            original_position: Some(request.position),
            commit_id: request.commit_id.clone(),
            original_commit_id: request.commit_id.clone(),
            in_reply_to: None,
            created_at: String::new(),
        };
        self.comments.write().push(request);
        Ok(comment)
    }

    async fn post_reply(&self, request: PostReplyRequest) -> Result<ReviewComment> {
        let id = self.check()?;
        let comment = ReviewComment {
            id,
            path: String::new(),
            author: request.user.login.clone(),
            body: request.body.clone(),
            diff_hunk: String::new(),
            position: None,
            original_position: None,
            commit_id: String::new(),
            original_commit_id: String::new(),
            in_reply_to: Some(request.in_reply_to),
            created_at: String::new(),
        };
        self.replies.write().push(request);
        Ok(comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Account;
    use std::path::PathBuf;

    fn repository() -> LocalRepository {
        LocalRepository {
            name: "repo".into(),
            owner: "owner".into(),
            clone_url: "https://github.com/owner/repo".into(),
            local_path: PathBuf::from("/repo"),
        }
    }

    #[tokio::test]
    async fn test_diff_between_known_commits() {
        let repo = MemoryRepository::new();
        repo.add_file("BASE", "a.txt", "one\ntwo\n");
        repo.add_file("HEAD", "a.txt", "one\n2\n");
        let diff = repo.diff(&repository(), "BASE", "HEAD", "a.txt").await.unwrap();
        assert!(diff.contains("-two"));
        assert!(diff.contains("+2"));
        assert_eq!(repo.diff_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_commit_gives_empty_diff() {
        let repo = MemoryRepository::new();
        repo.add_file("HEAD", "a.txt", "one\n");
        let diff = repo.diff(&repository(), "NOPE", "HEAD", "a.txt").await.unwrap();
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn test_failing_repository_errors() {
        let repo = MemoryRepository::new();
        repo.set_failing(true);
        assert!(repo.diff(&repository(), "A", "B", "a").await.is_err());
    }

    #[tokio::test]
    async fn test_unmodified_and_pushed_compares_tip_content() {
        let repo = MemoryRepository::new();
        repo.add_file("HEAD_SHA", "a.txt", "same\n");
        assert!(repo
            .is_unmodified_and_pushed(&repository(), "a.txt", b"same\n")
            .await
            .unwrap());
        assert!(!repo
            .is_unmodified_and_pushed(&repository(), "a.txt", b"edited\n")
            .await
            .unwrap());
        repo.set_pushed(false);
        assert!(!repo
            .is_unmodified_and_pushed(&repository(), "a.txt", b"same\n")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_comment_api_records_and_fails() {
        let api = MemoryCommentApi::starting_at(7);
        let request = PostCommentRequest {
            repository_owner: "fork".into(),
            repository_name: "repo".into(),
            user: Account {
                login: "me".into(),
            },
            number: 5,
            body: "hi".into(),
            commit_id: "HEAD_SHA".into(),
            path: "a.txt".into(),
            position: 3,
        };
        let comment = api.post_review_comment(request.clone()).await.unwrap();
        assert_eq!(comment.id, 7);
        assert_eq!(comment.author, "me");
        assert_eq!(api.posted_comments(), vec![request.clone()]);

        api.set_failing(true);
        assert!(api.post_review_comment(request).await.is_err());
        assert_eq!(api.posted_comments().len(), 1);
    }
}
