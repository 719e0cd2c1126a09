use super::diff::DiffLine;
use super::pull_request::{CommentId, ReviewComment};
use serde::{Deserialize, Serialize};

/// Threads are identified by the id of their root comment
pub type ThreadId = CommentId;

/// A group of review comments shown at one line of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentThread {
    pub id: ThreadId,
    /// Path of the file relative to the repository root
    pub relative_path: String,
    /// Commit the root comment was originally left on
    pub original_commit_sha: String,
    /// Position of the root comment in its original diff
    pub original_position: Option<u32>,
    /// Trailing lines of the root comment's diff hunk, last line first.
    ///
    /// This is the anchor re-matched against every new diff.
    pub diff_match: Vec<DiffLine>,
    /// 0-based line in the current file content; `None` when the anchor matched nothing
    pub line_number: Option<usize>,
    /// The thread was moved by an edit and has not been re-resolved yet
    pub is_stale: bool,
    /// Comments in posting order, root first
    pub comments: Vec<ReviewComment>,
}

impl CommentThread {
    pub fn is_resolved(&self) -> bool {
        self.line_number.is_some()
    }

    pub fn contains_comment(&self, id: CommentId) -> bool {
        self.comments.iter().any(|comment| comment.id == id)
    }

    /// Line number in the `-1 = unresolved` convention used by glyph renderers.
    pub fn display_line(&self) -> i64 {
        self.line_number.map_or(-1, |line| line as i64)
    }
}
