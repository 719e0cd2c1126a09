//! Mapping review comments onto lines of the current file content.
//!
//! A comment is anchored by the trailing lines of its diff hunk. Resolving it
//! means finding those lines again in a fresh diff of the file and reading the
//! line number on the file side of the match.

use crate::domain::{CommentThread, DiffChunk, DiffError, DiffLine, PullRequest, ReviewComment};
use crate::infra::diff::{match_line, parse_diff};
use std::collections::BTreeSet;

/// Number of trailing hunk lines kept as a thread's anchor
pub const DIFF_MATCH_LINES: usize = 5;

/// Anchor lines of a comment's diff hunk: the last chunk's trailing lines, last line first.
pub fn anchor_from_hunk(diff_hunk: &str) -> Result<Vec<DiffLine>, DiffError> {
    let chunks = parse_diff(diff_hunk)?;
    Ok(chunks
        .last()
        .map(|chunk| {
            chunk
                .lines
                .iter()
                .rev()
                .take(DIFF_MATCH_LINES)
                .cloned()
                .collect()
        })
        .unwrap_or_default())
}

/// Anchor built from the lines of `diff` ending at diff position `position`.
fn position_anchor(position: u32, diff: &[DiffChunk]) -> Vec<DiffLine> {
    let position = position as usize;
    diff.iter()
        .find_map(|chunk| {
            let index = chunk
                .lines
                .iter()
                .position(|line| line.diff_line_number == position)?;
            Some(
                chunk.lines[..=index]
                    .iter()
                    .rev()
                    .take(DIFF_MATCH_LINES)
                    .cloned()
                    .collect(),
            )
        })
        .unwrap_or_default()
}

/// The anchor of `comment`, last line first.
///
/// Comments fresh from the posting API may come back without a hunk; those
/// are anchored on their position in `diff` instead.
pub fn comment_anchor(comment: &ReviewComment, diff: &[DiffChunk]) -> Vec<DiffLine> {
    if comment.diff_hunk.trim().is_empty() {
        return comment
            .original_position
            .map(|position| position_anchor(position, diff))
            .unwrap_or_default();
    }
    anchor_from_hunk(&comment.diff_hunk).unwrap_or_else(|err| {
        log::warn!("Unparseable diff hunk on comment {}: {err}", comment.id);
        Vec::new()
    })
}

/// 0-based line of the file that `anchor` points at in `diff`.
pub fn resolve_line(diff: &[DiffChunk], anchor: &[DiffLine]) -> Option<usize> {
    match_line(diff, anchor)?.file_line_number()?.checked_sub(1)
}

fn place_comment(
    threads: &mut Vec<CommentThread>,
    comment: ReviewComment,
    anchor: Vec<DiffLine>,
    line: Option<usize>,
    relative_path: &str,
) -> Option<usize> {
    if let Some(line) = line
        && let Some(thread) = threads
            .iter_mut()
            .find(|thread| thread.line_number == Some(line))
    {
        thread.comments.push(comment);
        return Some(line);
    }

    threads.push(CommentThread {
        id: comment.id,
        relative_path: relative_path.to_string(),
        original_commit_sha: comment.original_commit_id.clone(),
        original_position: comment.original_position,
        diff_match: anchor,
        line_number: line,
        is_stale: false,
        comments: vec![comment],
    });
    line
}

/// Resolve every review comment on `relative_path` against `diff`.
///
/// Comments resolving to the same line share a thread, rooted at the first
/// of them. Each unresolved comment gets a thread of its own.
pub fn build_comment_threads(
    pull_request: &PullRequest,
    relative_path: &str,
    diff: &[DiffChunk],
) -> Vec<CommentThread> {
    let mut threads = Vec::new();

    for comment in pull_request
        .comments_for_path(relative_path)
        .filter(|comment| comment.original_position.is_some())
    {
        let anchor = comment_anchor(comment, diff);
        let line = resolve_line(diff, &anchor);
        place_comment(&mut threads, comment.clone(), anchor, line, relative_path);
    }

    log::debug!(
        "resolved {} threads for {relative_path} ({} unresolved)",
        threads.len(),
        threads.iter().filter(|thread| !thread.is_resolved()).count()
    );
    threads
}

/// Re-resolve existing threads against a new diff.
///
/// Returns every line that needs redrawing: both old and new line of a moved
/// thread and the line of a thread whose stale flag was cleared. Running it
/// twice with the same diff reports nothing the second time.
pub fn update_comment_threads(threads: &mut [CommentThread], diff: &[DiffChunk]) -> Vec<usize> {
    let mut changed = BTreeSet::new();

    for thread in threads.iter_mut() {
        let line = resolve_line(diff, &thread.diff_match);

        if line != thread.line_number {
            changed.extend(thread.line_number);
            changed.extend(line);
            thread.line_number = line;
            thread.is_stale = false;
        } else if thread.is_stale {
            changed.extend(thread.line_number);
            thread.is_stale = false;
        }
    }

    changed.into_iter().collect()
}

/// Add a newly posted comment to `threads`.
///
/// Replies join the thread holding their parent. Other comments are resolved
/// and grouped the same way [`build_comment_threads`] does. Returns the line
/// to redraw, `None` when nothing visible changed.
pub fn merge_comment(
    threads: &mut Vec<CommentThread>,
    comment: ReviewComment,
    relative_path: &str,
    diff: &[DiffChunk],
) -> Option<usize> {
    if threads
        .iter()
        .any(|thread| thread.contains_comment(comment.id))
    {
        return None;
    }

    if let Some(parent) = comment.in_reply_to
        && let Some(thread) = threads
            .iter_mut()
            .find(|thread| thread.contains_comment(parent))
    {
        thread.comments.push(comment);
        return thread.line_number;
    }

    if comment.original_position.is_none() {
        return None;
    }
    let anchor = comment_anchor(&comment, diff);
    let line = resolve_line(diff, &anchor);
    place_comment(threads, comment, anchor, line, relative_path)
}
