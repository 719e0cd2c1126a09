use similar::TextDiff;

/// Default number of context lines around each change, as `git diff` uses.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Render a unified diff between two versions of one file.
///
/// Only chunk headers and content lines are produced (no `---`/`+++` file
/// header), which is the fragment shape review comments are anchored to.
/// Identical inputs produce an empty string.
pub fn unified_diff(old: &str, new: &str, context_lines: usize) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(context_lines)
        .to_string()
}

/// Same as [`unified_diff`] for raw bytes; invalid UTF-8 is replaced.
pub fn unified_diff_bytes(old: &[u8], new: &[u8], context_lines: usize) -> String {
    let old = String::from_utf8_lossy(old);
    let new = String::from_utf8_lossy(new);
    unified_diff(&old, &new, context_lines)
}
