use crate::domain::{Account, CommentId, LocalRepository, PullRequest, ReviewComment};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Read access to the local repository a pull request is checked out in.
///
/// Diffs are returned as raw unified diff text for a single file. When one of
/// the endpoint commits does not exist locally the diff is empty rather than
/// an error, so sessions degrade to "no threads" instead of failing.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Diff of `path` between two commits.
    async fn diff(
        &self,
        repository: &LocalRepository,
        base_sha: &str,
        head_sha: &str,
        path: &str,
    ) -> Result<String>;

    /// Diff of `path` between `base_sha` and arbitrary content (an editor buffer).
    async fn diff_contents(
        &self,
        repository: &LocalRepository,
        base_sha: &str,
        head_sha: &str,
        path: &str,
        contents: &[u8],
    ) -> Result<String>;

    /// Content of `path` at `sha`, `None` if either does not exist.
    async fn extract_file(
        &self,
        repository: &LocalRepository,
        sha: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>>;

    /// Merge base of the pull request's base and head commits.
    async fn merge_base(
        &self,
        repository: &LocalRepository,
        pull_request: &PullRequest,
    ) -> Result<String>;

    /// SHA of the checked out commit.
    async fn tip_sha(&self, repository: &LocalRepository) -> Result<String>;

    /// True when `contents` equals `path` at the checked out commit and that
    /// commit exists on a remote branch.
    async fn is_unmodified_and_pushed(
        &self,
        repository: &LocalRepository,
        path: &str,
        contents: &[u8],
    ) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCommentRequest {
    /// Owner of the repository the pull request's head lives in
    pub repository_owner: String,
    pub repository_name: String,
    pub user: Account,
    pub number: u32,
    pub body: String,
    pub commit_id: String,
    pub path: String,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReplyRequest {
    pub repository_owner: String,
    pub repository_name: String,
    pub user: Account,
    pub number: u32,
    pub body: String,
    pub in_reply_to: CommentId,
}

/// Write access to review comments on the hosting service.
#[async_trait]
pub trait ReviewCommentApi: Send + Sync {
    async fn post_review_comment(&self, request: PostCommentRequest) -> Result<ReviewComment>;
    async fn post_reply(&self, request: PostReplyRequest) -> Result<ReviewComment>;
}
