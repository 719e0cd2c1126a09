use crate::domain::{DiffChunk, DiffLine};

/// Find the line in `diff` that a comment anchor points at.
///
/// `target` holds the trailing lines of the comment's hunk, last line first.
/// Each chunk is scanned backwards for the longest run equal to `target`; a
/// run that reaches the top of the chunk counts as a match even if it is
/// shorter than `target`. The first chunk with a match wins.
pub fn match_line<'a>(diff: &'a [DiffChunk], target: &[DiffLine]) -> Option<&'a DiffLine> {
    if target.is_empty() {
        return None;
    }

    for chunk in diff {
        let lines = &chunk.lines;
        let mut matches = 0usize;
        let mut i = lines.len() as isize - 1;

        while i >= 0 {
            let index = i as usize;
            if lines[index].content == target[matches].content {
                matches += 1;
                if matches == target.len() || index == 0 {
                    return lines.get(index + matches - 1);
                }
            } else {
                // Resume one line above where the failed partial match began.
                i += matches as isize;
                matches = 0;
            }
            i -= 1;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::diff::parser::parse_diff;

    const HEADER: &str = "@@ -1 +1 @@";

    /// Lines are separated by `.` to keep the cases readable.
    fn match_number(diff_lines: &str, match_lines: &str) -> Option<usize> {
        let diff = parse_diff(&format!("{HEADER}\n{}", diff_lines.replace('.', "\r\n"))).unwrap();
        let target_chunks =
            parse_diff(&format!("{HEADER}\n{}", match_lines.replace('.', "\r\n"))).unwrap();
        let target: Vec<DiffLine> = target_chunks[0].lines.iter().rev().cloned().collect();
        match_line(&diff, &target).map(|line| line.diff_line_number)
    }

    #[test]
    fn test_simple_matches() {
        assert_eq!(match_number(" 1", " 1"), Some(1));
        assert_eq!(match_number(" 1. 2", " 2"), Some(2));
        assert_eq!(match_number(" 1. 1", " 1"), Some(2));
        assert_eq!(match_number("+x", "-x"), None);
        assert_eq!(match_number("", " x"), None);
        assert_eq!(match_number(" x", ""), None);
    }

    #[test]
    fn test_context_matches() {
        assert_eq!(match_number(" 1. 2.", " 1. 2."), Some(2));
        assert_eq!(match_number(" 1. 2.", " 3. 2."), None);
        assert_eq!(match_number(" 2.", " 1. 2."), Some(1));
    }

    #[test]
    fn test_partial_match_backtracks() {
        assert_eq!(match_number("+a.+x.+x.", "+a.+x."), Some(2));
        assert_eq!(match_number("+a.+x.+x.", "+a.+x.+x."), Some(3));
        assert_eq!(match_number("+a.+x.+x.+b.+x.+x.", "+a.+x."), Some(2));
        assert_eq!(match_number("+a.+x.+x.+b.+x.+x.", "+b.+x."), Some(5));
        assert_eq!(match_number("+a.+b.+x", "+a.+x."), None);
    }

    #[test]
    fn test_matches_same_line_from_reparse() {
        for header in ["@@ -1 +1 @@", "@@ -10,3 +12,4 @@", "@@ -1,0 +1 @@ fn main() {"] {
            for line in [" 1", "+1", "-1", " ", "+", "-", "+    let x = 1;"] {
                let diff = format!("{header}\n{line}");
                let chunks = parse_diff(&diff).unwrap();
                let reparsed = parse_diff(&diff).unwrap();
                let target = vec![reparsed[0].lines[0].clone()];
                assert_eq!(
                    match_line(&chunks, &target),
                    Some(&chunks[0].lines[0]),
                    "{diff:?}"
                );
            }
        }
    }

    #[test]
    fn test_nothing_matches_from_nothing() {
        assert_eq!(match_line(&[], &[]), None);
        let chunks = parse_diff("@@ -1 +1 @@\n 1").unwrap();
        assert_eq!(match_line(&chunks, &[]), None);
    }

    #[test]
    fn test_first_matching_chunk_wins() {
        let diff = parse_diff("@@ -1 +1 @@\n a\n@@ -10 +10 @@\n a").unwrap();
        let target = vec![diff[1].lines[0].clone()];
        let found = match_line(&diff, &target).unwrap();
        assert_eq!(found.new_line_number, Some(1));
    }
}
