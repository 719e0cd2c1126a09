//! Editor buffer seam.
//!
//! The session engine never touches files that are open in an editor
//! directly. It reads the buffer through [`LiveDocument`] and pins comment
//! lines with tracking anchors that the buffer keeps up to date as text is
//! inserted or removed.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Handle to a line anchor created by [`LiveDocument::track_line`]
pub type AnchorId = u64;

/// An open, editable document.
pub trait LiveDocument: Send + Sync {
    /// Absolute path of the document on disk
    fn file_path(&self) -> &Path;

    /// Current buffer content
    fn contents(&self) -> Vec<u8>;

    /// Monotonic edit counter; changes whenever the content changes
    fn version(&self) -> u64;

    /// Pin `line` (0-based) so later edits above it move the anchor with the text.
    fn track_line(&self, line: usize) -> AnchorId;

    /// Current line of an anchor, `None` once released
    fn anchor_line(&self, anchor: AnchorId) -> Option<usize>;

    fn release_anchor(&self, anchor: AnchorId);
}

#[derive(Debug, Default)]
struct DocumentState {
    lines: Vec<String>,
    trailing_newline: bool,
    version: u64,
    anchors: HashMap<AnchorId, usize>,
    next_anchor: AnchorId,
}

impl DocumentState {
    fn from_text(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            trailing_newline: text.ends_with('\n'),
            ..Self::default()
        }
    }

    fn last_line(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }
}

/// In-memory line buffer implementing [`LiveDocument`].
///
/// Anchors use positive tracking: inserting at or above an anchored line
/// pushes it down, deleting lines above pulls it up and deleting the anchored
/// line itself collapses the anchor onto the start of the deleted range.
#[derive(Debug)]
pub struct TextDocument {
    path: PathBuf,
    state: Mutex<DocumentState>,
}

impl TextDocument {
    pub fn new(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(DocumentState::from_text(text)),
        }
    }

    pub fn text(&self) -> String {
        let state = self.state.lock();
        let mut text = state.lines.join("\n");
        if state.trailing_newline && !state.lines.is_empty() {
            text.push('\n');
        }
        text
    }

    pub fn line_count(&self) -> usize {
        self.state.lock().lines.len()
    }

    /// Insert `lines` before line `at` (clamped to the end of the buffer).
    pub fn insert_lines(&self, at: usize, lines: &[&str]) {
        if lines.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        let at = at.min(state.lines.len());
        let count = lines.len();
        state
            .lines
            .splice(at..at, lines.iter().map(|line| line.to_string()));
        for line in state.anchors.values_mut() {
            if *line >= at {
                *line += count;
            }
        }
        state.version += 1;
    }

    /// Remove `count` lines starting at `start`.
    pub fn delete_lines(&self, start: usize, count: usize) {
        let mut state = self.state.lock();
        let end = start.saturating_add(count).min(state.lines.len());
        if start >= end {
            return;
        }
        state.lines.drain(start..end);
        let removed = end - start;
        for line in state.anchors.values_mut() {
            if *line >= end {
                *line -= removed;
            } else if *line >= start {
                *line = start;
            }
        }
        let last = state.last_line();
        for line in state.anchors.values_mut() {
            *line = (*line).min(last);
        }
        state.version += 1;
    }

    /// Replace the text of one line; anchors stay where they are.
    pub fn replace_line(&self, line: usize, text: &str) {
        let mut state = self.state.lock();
        if let Some(slot) = state.lines.get_mut(line) {
            *slot = text.to_string();
            state.version += 1;
        }
    }

    /// Replace the whole buffer, clamping anchors to the new length.
    pub fn set_text(&self, text: &str) {
        let mut state = self.state.lock();
        let replacement = DocumentState::from_text(text);
        state.lines = replacement.lines;
        state.trailing_newline = replacement.trailing_newline;
        let last = state.last_line();
        for line in state.anchors.values_mut() {
            *line = (*line).min(last);
        }
        state.version += 1;
    }

    pub fn anchor_count(&self) -> usize {
        self.state.lock().anchors.len()
    }
}

impl LiveDocument for TextDocument {
    fn file_path(&self) -> &Path {
        &self.path
    }

    fn contents(&self) -> Vec<u8> {
        self.text().into_bytes()
    }

    fn version(&self) -> u64 {
        self.state.lock().version
    }

    fn track_line(&self, line: usize) -> AnchorId {
        let mut state = self.state.lock();
        let id = state.next_anchor;
        state.next_anchor += 1;
        state.anchors.insert(id, line);
        id
    }

    fn anchor_line(&self, anchor: AnchorId) -> Option<usize> {
        self.state.lock().anchors.get(&anchor).copied()
    }

    fn release_anchor(&self, anchor: AnchorId) {
        self.state.lock().anchors.remove(&anchor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> TextDocument {
        TextDocument::new("/repo/file.cs", "Line 1\nLine 2\nLine 3\nLine 4\n")
    }

    #[test]
    fn test_text_round_trip_keeps_trailing_newline() {
        let doc = document();
        assert_eq!(doc.text(), "Line 1\nLine 2\nLine 3\nLine 4\n");
        assert_eq!(doc.line_count(), 4);
        assert_eq!(TextDocument::new("x", "a\nb").text(), "a\nb");
    }

    #[test]
    fn test_insert_above_anchor_shifts_it() {
        let doc = document();
        let anchor = doc.track_line(2);
        doc.insert_lines(0, &["new 1", "new 2"]);
        assert_eq!(doc.anchor_line(anchor), Some(4));
        assert_eq!(doc.version(), 1);
        assert!(doc.text().starts_with("new 1\nnew 2\nLine 1"));
    }

    #[test]
    fn test_insert_below_anchor_keeps_it() {
        let doc = document();
        let anchor = doc.track_line(1);
        doc.insert_lines(3, &["tail"]);
        assert_eq!(doc.anchor_line(anchor), Some(1));
    }

    #[test]
    fn test_delete_moves_and_collapses_anchors() {
        let doc = document();
        let below = doc.track_line(3);
        let inside = doc.track_line(1);
        doc.delete_lines(0, 2);
        assert_eq!(doc.anchor_line(below), Some(1));
        assert_eq!(doc.anchor_line(inside), Some(0));
        assert_eq!(doc.line_count(), 2);
    }

    #[test]
    fn test_replace_line_bumps_version_only() {
        let doc = document();
        let anchor = doc.track_line(2);
        doc.replace_line(2, "Line 3 edited");
        assert_eq!(doc.anchor_line(anchor), Some(2));
        assert_eq!(doc.version(), 1);
        doc.replace_line(99, "ignored");
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn test_set_text_clamps_anchors() {
        let doc = document();
        let anchor = doc.track_line(3);
        doc.set_text("only\n");
        assert_eq!(doc.anchor_line(anchor), Some(0));
        assert_eq!(doc.contents(), b"only\n".to_vec());
    }

    #[test]
    fn test_released_anchor_is_gone() {
        let doc = document();
        let anchor = doc.track_line(0);
        doc.release_anchor(anchor);
        assert_eq!(doc.anchor_line(anchor), None);
        assert_eq!(doc.anchor_count(), 0);
    }
}
