use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Unique identifier of a review comment on the hosting service
pub type CommentId = u64;

/// One side (base or head) of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitReference {
    /// Display label, e.g. `owner:branch`
    pub label: String,
    /// Branch name
    pub ref_name: String,
    /// Commit SHA the reference points at
    pub sha: String,
    /// Clone URL of the repository holding the reference
    pub repository_clone_url: String,
}

impl GitReference {
    /// Owner segment of the clone URL (`https://host/owner/repo` -> `owner`).
    pub fn owner(&self) -> Option<&str> {
        let trimmed = self
            .repository_clone_url
            .trim_end_matches('/')
            .trim_end_matches(".git");
        let mut segments = trimmed.rsplit(['/', ':']);
        let _repo = segments.next()?;
        segments.next().filter(|owner| !owner.is_empty())
    }
}

/// A file reported as changed by the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Path relative to the repository root, `/`-separated
    pub file_name: String,
}

/// A review comment anchored to a position in a pull request diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: CommentId,
    /// Path of the commented file relative to the repository root
    pub path: String,
    /// Author login
    pub author: String,
    /// Body text (markdown)
    pub body: String,
    /// Unified diff snippet ending at the commented line
    pub diff_hunk: String,
    /// Position in the diff against `commit_id`; `None` once outdated
    #[serde(default)]
    pub position: Option<u32>,
    /// Position in the diff against `original_commit_id`
    #[serde(default)]
    pub original_position: Option<u32>,
    /// Commit the comment currently appears on
    pub commit_id: String,
    /// Commit the comment was originally left on
    pub original_commit_id: String,
    /// Parent comment for replies
    #[serde(default)]
    pub in_reply_to: Option<CommentId>,
    /// Creation timestamp in RFC3339 format
    pub created_at: String,
}

/// Pull request model as delivered by the hosting service.
///
/// Two models with the same [`SessionKey`] belong to the same session, but
/// `PartialEq` compares every field, so a refreshed model is never mistaken
/// for the stale one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u32,
    pub title: String,
    pub base: GitReference,
    pub head: GitReference,
    #[serde(default)]
    pub changed_files: Vec<ChangedFile>,
    #[serde(default)]
    pub review_comments: Vec<ReviewComment>,
}

impl PullRequest {
    /// Review comments left on `relative_path`, tolerant of separator differences.
    pub fn comments_for_path<'a>(
        &'a self,
        relative_path: &str,
    ) -> impl Iterator<Item = &'a ReviewComment> + 'a {
        let wanted = normalize_repo_path(relative_path);
        self.review_comments
            .iter()
            .filter(move |comment| normalize_repo_path(&comment.path) == wanted)
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey {
            owner: self.base.owner().unwrap_or_default().to_string(),
            number: self.number,
        }
    }
}

/// Identity of a session: base repository owner plus pull request number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub owner: String,
    pub number: u32,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner, self.number)
    }
}

/// The signed-in user of the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Account {
    pub login: String,
}

/// A repository checked out on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRepository {
    pub name: String,
    pub owner: String,
    pub clone_url: String,
    pub local_path: PathBuf,
}

impl LocalRepository {
    /// Path of `absolute` relative to the working tree, `/`-separated.
    pub fn relative_path(&self, absolute: &Path) -> Option<String> {
        let relative = absolute.strip_prefix(&self.local_path).ok()?;
        let text = relative.to_string_lossy();
        if text.is_empty() {
            return None;
        }
        Some(normalize_repo_path(&text))
    }
}

/// Canonical form of a repository path: `/` separators, no leading `./`.
pub fn normalize_repo_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    unified.trim_start_matches("./").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(url: &str) -> GitReference {
        GitReference {
            label: "BASE".into(),
            ref_name: "master".into(),
            sha: "BASE_SHA".into(),
            repository_clone_url: url.into(),
        }
    }

    #[test]
    fn test_owner_from_clone_url() {
        assert_eq!(reference("https://foo.bar/owner/repo").owner(), Some("owner"));
        assert_eq!(
            reference("https://github.com/owner/repo.git").owner(),
            Some("owner")
        );
        assert_eq!(reference("git@github.com:owner/repo.git").owner(), Some("owner"));
        assert_eq!(reference("repo").owner(), None);
    }

    #[test]
    fn test_normalize_repo_path() {
        assert_eq!(normalize_repo_path("foo\\test.cs"), "foo/test.cs");
        assert_eq!(normalize_repo_path("./foo/test.cs"), "foo/test.cs");
        assert_eq!(normalize_repo_path("foo/test.cs"), "foo/test.cs");
    }

    #[test]
    fn test_relative_path_inside_repository() {
        let repo = LocalRepository {
            name: "repo".into(),
            owner: "owner".into(),
            clone_url: "https://github.com/owner/repo".into(),
            local_path: PathBuf::from("/work/repo"),
        };
        assert_eq!(
            repo.relative_path(Path::new("/work/repo/src/lib.rs")),
            Some("src/lib.rs".to_string())
        );
        assert_eq!(repo.relative_path(Path::new("/work/repo")), None);
        assert_eq!(repo.relative_path(Path::new("/elsewhere/lib.rs")), None);
    }
}
