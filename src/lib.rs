//! Diff-anchored tracking of pull request review comments.
//!
//! Review comments are attached to positions in a pull request diff. This
//! crate parses unified diffs, re-locates each comment in the current content
//! of a file (including unsaved editor buffers) and keeps those locations
//! correct while the file is being edited.

pub mod application;
pub mod domain;
pub mod infra;
