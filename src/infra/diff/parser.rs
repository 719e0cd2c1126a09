//! Streaming parser for single-file unified diff fragments.
//!
//! The parser is lazy: [`parse_fragment`] returns an iterator that yields one
//! [`DiffChunk`] per `@@` header as soon as the next header (or end of input)
//! is reached. Numbering follows the hosting service's notion of diff position:
//! the running counter starts at 0 on the first header and advances on every
//! line after it, headers and `\` control lines included.

use crate::domain::{DiffChangeType, DiffChunk, DiffError, DiffLine};
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::Lines;

static CHUNK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@\s+-(\d+),?\d*\s+\+(\d+),?\d*\s@@").expect("chunk header regex is valid")
});

/// Classification of a raw line inside a chunk.
enum LineKind {
    Change(DiffChangeType),
    /// `\ No newline at end of file` and friends
    Control,
}

fn classify(line: &str) -> Result<LineKind, DiffError> {
    match line.chars().next() {
        // Tools that strip trailing whitespace turn blank context lines into empty lines.
        None | Some(' ') => Ok(LineKind::Change(DiffChangeType::Context)),
        Some('+') => Ok(LineKind::Change(DiffChangeType::Added)),
        Some('-') => Ok(LineKind::Change(DiffChangeType::Deleted)),
        Some('\\') => Ok(LineKind::Control),
        Some(other) => Err(DiffError::InvalidDiffLineChar(other)),
    }
}

fn parse_start(value: &str, header: &str) -> Result<usize, DiffError> {
    value
        .parse()
        .map_err(|_| DiffError::InvalidChunkHeader(header.to_string()))
}

/// Lazy iterator over the chunks of a diff fragment.
///
/// Cloning the iterator before it is consumed restarts parsing from the same
/// position. After an error has been yielded the iterator is exhausted.
#[derive(Debug, Clone)]
pub struct DiffChunks<'a> {
    lines: Lines<'a>,
    pending: Option<DiffChunk>,
    diff_line: Option<usize>,
    old_line: usize,
    new_line: usize,
    finished: bool,
}

impl<'a> DiffChunks<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            pending: None,
            diff_line: None,
            old_line: 0,
            new_line: 0,
            finished: false,
        }
    }

    fn fail(&mut self, err: DiffError) -> Option<Result<DiffChunk, DiffError>> {
        self.finished = true;
        self.pending = None;
        Some(Err(err))
    }
}

impl Iterator for DiffChunks<'_> {
    type Item = Result<DiffChunk, DiffError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while let Some(line) = self.lines.next() {
            let mut completed = None;

            if let Some(caps) = CHUNK_HEADER.captures(line) {
                let old_start = match parse_start(&caps[1], line) {
                    Ok(value) => value,
                    Err(err) => return self.fail(err),
                };
                let new_start = match parse_start(&caps[2], line) {
                    Ok(value) => value,
                    Err(err) => return self.fail(err),
                };
                let diff_line_start = *self.diff_line.get_or_insert(0);

                self.old_line = old_start;
                self.new_line = new_start;
                completed = self.pending.replace(DiffChunk::new(
                    old_start,
                    new_start,
                    diff_line_start,
                ));
            } else if let Some(chunk) = self.pending.as_mut() {
                let change = match classify(line) {
                    Ok(LineKind::Change(change)) => change,
                    Ok(LineKind::Control) => {
                        self.advance_diff_line();
                        continue;
                    }
                    Err(err) => return self.fail(err),
                };

                chunk.lines.push(DiffLine {
                    change,
                    old_line_number: (change != DiffChangeType::Added).then_some(self.old_line),
                    new_line_number: (change != DiffChangeType::Deleted).then_some(self.new_line),
                    diff_line_number: self.diff_line.unwrap_or_default(),
                    content: line.to_string(),
                });

                match change {
                    DiffChangeType::Context => {
                        self.old_line += 1;
                        self.new_line += 1;
                    }
                    DiffChangeType::Deleted => self.old_line += 1,
                    DiffChangeType::Added => self.new_line += 1,
                }
            }

            self.advance_diff_line();

            if let Some(chunk) = completed {
                return Some(Ok(chunk));
            }
        }

        self.finished = true;
        self.pending.take().map(Ok)
    }
}

impl DiffChunks<'_> {
    fn advance_diff_line(&mut self) {
        if let Some(counter) = self.diff_line.as_mut() {
            *counter += 1;
        }
    }
}

/// Parse the unified diff text of one file lazily.
pub fn parse_fragment(text: &str) -> DiffChunks<'_> {
    DiffChunks::new(text)
}

/// Parse the unified diff text of one file, stopping at the first malformed line.
pub fn parse_diff(text: &str) -> Result<Vec<DiffChunk>, DiffError> {
    parse_fragment(text).collect()
}
