//! Collaborators for repository access and the review comment service.

pub mod git;
pub mod github;
pub mod memory;
pub mod traits;

pub use git::LocalGit;
pub use github::{GhReviewApi, GitHubPrRef, parse_pr_ref};
pub use memory::{MemoryCommentApi, MemoryRepository};
pub use traits::{GitBackend, PostCommentRequest, PostReplyRequest, ReviewCommentApi};
