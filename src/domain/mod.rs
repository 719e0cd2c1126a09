//! Domain types for inline review tracking
//! Defines the diff model, pull request model and comment threads shared by every layer.

pub mod diff;
pub mod error;
pub mod pull_request;
pub mod thread;

pub use diff::*;
pub use error::*;
pub use pull_request::*;
pub use thread::*;
