//! Unified diff handling: parsing, anchor matching and generation.

pub mod matcher;
pub mod parser;
pub mod unified;

pub use matcher::match_line;
pub use parser::{DiffChunks, parse_diff, parse_fragment};
pub use unified::{DEFAULT_CONTEXT_LINES, unified_diff, unified_diff_bytes};
