//! Application layer (use-cases, policies).
//!
//! Thread resolution policies and the session orchestration that binds them
//! to pull requests and editor buffers, independent of any UI.

pub mod review;
pub mod session;
