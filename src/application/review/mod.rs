//! Comment thread resolution policies.

pub mod resolver;

pub use resolver::{
    DIFF_MATCH_LINES, anchor_from_hunk, build_comment_threads, comment_anchor, merge_comment,
    resolve_line, update_comment_threads,
};
