use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change a diff line represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffChangeType {
    /// Unchanged line present on both sides (` ` prefix)
    Context,
    /// Line only present in the new file (`+` prefix)
    Added,
    /// Line only present in the old file (`-` prefix)
    Deleted,
}

impl DiffChangeType {
    /// The one-character prefix used for this change in unified diff text.
    pub fn prefix(self) -> char {
        match self {
            Self::Context => ' ',
            Self::Added => '+',
            Self::Deleted => '-',
        }
    }
}

impl fmt::Display for DiffChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context => write!(f, "context"),
            Self::Added => write!(f, "added"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// A single classified line of a parsed diff.
///
/// `content` keeps the raw line, prefix character included, so lines from two
/// different parses can be compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    /// Change classification
    pub change: DiffChangeType,
    /// 1-based line in the old file; `None` for added lines
    pub old_line_number: Option<usize>,
    /// 1-based line in the new file; `None` for deleted lines
    pub new_line_number: Option<usize>,
    /// 0-based running position counted from the first chunk header of the diff
    pub diff_line_number: usize,
    /// Raw line text including the prefix character
    pub content: String,
}

impl DiffLine {
    /// Line number on the side the line belongs to, preferring the new file.
    pub fn file_line_number(&self) -> Option<usize> {
        self.new_line_number.or(self.old_line_number)
    }
}

impl fmt::Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// One `@@ -a,b +c,d @@` region of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffChunk {
    /// Starting line in the old file, as given by the header
    pub old_start: usize,
    /// Starting line in the new file, as given by the header
    pub new_start: usize,
    /// Running diff line counter at the header line
    pub diff_line_start: usize,
    /// Content lines in order of appearance
    pub lines: Vec<DiffLine>,
}

impl DiffChunk {
    pub fn new(old_start: usize, new_start: usize, diff_line_start: usize) -> Self {
        Self {
            old_start,
            new_start,
            diff_line_start,
            lines: Vec::new(),
        }
    }
}

impl fmt::Display for DiffChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line.content)?;
        }
        Ok(())
    }
}
