use super::traits::GitBackend;
use crate::domain::{LocalRepository, PullRequest};
use crate::infra::diff::{DEFAULT_CONTEXT_LINES, unified_diff_bytes};
use crate::infra::shell;
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

static REMOTE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[/:]([^/:\s]+)/([^/\s]+?)(?:\.git)?/?$").expect("remote url regex")
});

/// [`GitBackend`] over the `git` command line.
#[derive(Debug, Clone)]
pub struct LocalGit {
    git_path: PathBuf,
    context_lines: usize,
}

impl LocalGit {
    /// Locate `git`, honouring an explicit override.
    pub fn new(configured: Option<&str>, context_lines: usize) -> Result<Self> {
        let git_path = shell::resolve_tool(configured, "git").context("resolve `git` path")?;
        Ok(Self {
            git_path,
            context_lines,
        })
    }

    pub fn with_path(git_path: PathBuf) -> Self {
        Self {
            git_path,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }

    async fn run(&self, repo_path: &Path, args: &[&str]) -> Result<Output> {
        Command::new(&self.git_path)
            .arg("-C")
            .arg(repo_path)
            .args(args)
            .output()
            .await
            .with_context(|| format!("run `git {}`", args.join(" ")))
    }

    async fn run_checked(&self, repo_path: &Path, args: &[&str]) -> Result<String> {
        let output = self.run(repo_path, args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(format!(
                "`git {}` failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout).context("decode git stdout")
    }

    async fn commit_exists(&self, repo_path: &Path, sha: &str) -> Result<bool> {
        let revision = format!("{sha}^{{commit}}");
        let output = self.run(repo_path, &["cat-file", "-e", &revision]).await?;
        Ok(output.status.success())
    }

    async fn show_file(&self, repo_path: &Path, sha: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let revision = format!("{sha}:{path}");
        let output = self.run(repo_path, &["show", &revision]).await?;
        Ok(output.status.success().then_some(output.stdout))
    }

    /// Remote URLs configured in the repository, in `git remote -v` order.
    pub async fn remotes(&self, repo_path: &Path) -> Vec<String> {
        let Ok(stdout) = self.run_checked(repo_path, &["remote", "-v"]).await else {
            return Vec::new();
        };

        let mut remotes = Vec::new();
        for line in stdout.lines() {
            if let Some(url) = line.split_whitespace().nth(1)
                && !remotes.iter().any(|existing| existing == url)
            {
                remotes.push(url.to_string());
            }
        }
        remotes
    }

    /// Describe the repository checked out at `path` from its `origin` remote.
    pub async fn open_repository(&self, path: &Path) -> Result<LocalRepository> {
        let top_level = self
            .run_checked(path, &["rev-parse", "--show-toplevel"])
            .await
            .context("locate repository root")?;
        let local_path = PathBuf::from(top_level.trim());

        let clone_url = self
            .run_checked(&local_path, &["remote", "get-url", "origin"])
            .await
            .context("read `origin` remote")?
            .trim()
            .to_string();
        let (owner, name) = parse_remote_url(&clone_url)
            .with_context(|| format!("unrecognised remote url {clone_url}"))?;

        Ok(LocalRepository {
            name,
            owner,
            clone_url,
            local_path,
        })
    }
}

/// `(owner, name)` of an https or scp-style remote URL.
pub fn parse_remote_url(url: &str) -> Option<(String, String)> {
    let caps = REMOTE_URL_RE.captures(url.trim())?;
    Some((caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str().to_string()))
}

#[async_trait]
impl GitBackend for LocalGit {
    async fn diff(
        &self,
        repository: &LocalRepository,
        base_sha: &str,
        head_sha: &str,
        path: &str,
    ) -> Result<String> {
        let repo_path = &repository.local_path;
        if !self.commit_exists(repo_path, base_sha).await?
            || !self.commit_exists(repo_path, head_sha).await?
        {
            log::debug!("diff skipped, missing commit {base_sha}..{head_sha}");
            return Ok(String::new());
        }

        let unified = format!("--unified={}", self.context_lines);
        self.run_checked(
            repo_path,
            &["diff", "--no-color", "--no-ext-diff", &unified, base_sha, head_sha, "--", path],
        )
        .await
    }

    async fn diff_contents(
        &self,
        repository: &LocalRepository,
        base_sha: &str,
        _head_sha: &str,
        path: &str,
        contents: &[u8],
    ) -> Result<String> {
        let repo_path = &repository.local_path;
        if !self.commit_exists(repo_path, base_sha).await? {
            log::debug!("diff skipped, missing base commit {base_sha}");
            return Ok(String::new());
        }

        let old = self
            .show_file(repo_path, base_sha, path)
            .await?
            .unwrap_or_default();
        Ok(unified_diff_bytes(&old, contents, self.context_lines))
    }

    async fn extract_file(
        &self,
        repository: &LocalRepository,
        sha: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>> {
        self.show_file(&repository.local_path, sha, path).await
    }

    async fn merge_base(
        &self,
        repository: &LocalRepository,
        pull_request: &PullRequest,
    ) -> Result<String> {
        let stdout = self
            .run_checked(
                &repository.local_path,
                &["merge-base", &pull_request.base.sha, &pull_request.head.sha],
            )
            .await
            .with_context(|| format!("merge base of pull request #{}", pull_request.number))?;
        Ok(stdout.trim().to_string())
    }

    async fn tip_sha(&self, repository: &LocalRepository) -> Result<String> {
        let stdout = self
            .run_checked(&repository.local_path, &["rev-parse", "HEAD"])
            .await?;
        Ok(stdout.trim().to_string())
    }

    async fn is_unmodified_and_pushed(
        &self,
        repository: &LocalRepository,
        path: &str,
        contents: &[u8],
    ) -> Result<bool> {
        let tip = self.tip_sha(repository).await?;
        let committed = self.show_file(&repository.local_path, &tip, path).await?;
        if committed.as_deref() != Some(contents) {
            return Ok(false);
        }

        let branches = self
            .run_checked(&repository.local_path, &["branch", "-r", "--contains", &tip])
            .await?;
        Ok(!branches.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GitReference;
    use tempfile::tempdir;

    fn git(dir: &Path, args: &[&str]) -> bool {
        std::process::Command::new("git")
            .args(["-c", "user.email=test@example.com", "-c", "user.name=Test"])
            .args(args)
            .current_dir(dir)
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn rev_parse(dir: &Path, rev: &str) -> String {
        let output = std::process::Command::new("git")
            .args(["rev-parse", rev])
            .current_dir(dir)
            .output()
            .unwrap();
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    fn local_git() -> Option<LocalGit> {
        shell::find_bin("git").map(LocalGit::with_path)
    }

    fn repository(path: &Path) -> LocalRepository {
        LocalRepository {
            name: "repo".into(),
            owner: "owner".into(),
            clone_url: "https://github.com/owner/repo.git".into(),
            local_path: path.to_path_buf(),
        }
    }

    #[test]
    fn test_parse_remote_url() {
        assert_eq!(
            parse_remote_url("https://github.com/owner/repo.git"),
            Some(("owner".into(), "repo".into()))
        );
        assert_eq!(
            parse_remote_url("git@github.com:owner/repo.git"),
            Some(("owner".into(), "repo".into()))
        );
        assert_eq!(
            parse_remote_url("https://github.com/owner/repo"),
            Some(("owner".into(), "repo".into()))
        );
        assert_eq!(parse_remote_url("repo"), None);
    }

    #[tokio::test]
    async fn test_remotes_empty_outside_repository() {
        let Some(git_backend) = local_git() else {
            return;
        };
        let dir = tempdir().unwrap();
        assert!(git_backend.remotes(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_diff_merge_base_and_tip() {
        let Some(git_backend) = local_git() else {
            return;
        };
        let dir = tempdir().unwrap();
        let path = dir.path();
        if !git(path, &["init", "-q"]) {
            return;
        }
        git(path, &["remote", "add", "origin", "https://github.com/owner/repo.git"]);

        std::fs::write(path.join("file.txt"), "Line 1\nLine 2\nLine 3\nLine 4\n").unwrap();
        assert!(git(path, &["add", "."]));
        assert!(git(path, &["commit", "-q", "-m", "base"]));
        let base = rev_parse(path, "HEAD");

        std::fs::write(path.join("file.txt"), "Line 1\nLine 2\nLine 3 changed\nLine 4\n").unwrap();
        assert!(git(path, &["commit", "-q", "-am", "head"]));
        let head = rev_parse(path, "HEAD");

        let repo = repository(path);
        let diff = git_backend.diff(&repo, &base, &head, "file.txt").await.unwrap();
        assert!(diff.contains("+Line 3 changed"));

        let buffer = b"Line 1\nLine 2\nLine 3 changed\nLine 4\nLine 5\n";
        let live = git_backend
            .diff_contents(&repo, &base, &head, "file.txt", buffer)
            .await
            .unwrap();
        assert!(live.contains("+Line 5"));

        let missing = git_backend
            .diff(&repo, "0123456789abcdef0123456789abcdef01234567", &head, "file.txt")
            .await
            .unwrap();
        assert!(missing.is_empty());

        assert_eq!(git_backend.tip_sha(&repo).await.unwrap(), head);

        let pull_request = PullRequest {
            number: 1,
            title: "test".into(),
            base: GitReference {
                label: "base".into(),
                ref_name: "main".into(),
                sha: base.clone(),
                repository_clone_url: repo.clone_url.clone(),
            },
            head: GitReference {
                label: "head".into(),
                ref_name: "feature".into(),
                sha: head.clone(),
                repository_clone_url: repo.clone_url.clone(),
            },
            changed_files: Vec::new(),
            review_comments: Vec::new(),
        };
        assert_eq!(git_backend.merge_base(&repo, &pull_request).await.unwrap(), base);

        let extracted = git_backend.extract_file(&repo, &base, "file.txt").await.unwrap();
        assert_eq!(extracted.as_deref(), Some(&b"Line 1\nLine 2\nLine 3\nLine 4\n"[..]));
        assert_eq!(
            git_backend.extract_file(&repo, &base, "nope.txt").await.unwrap(),
            None
        );

        // Nothing has been pushed to a remote branch.
        let committed = b"Line 1\nLine 2\nLine 3 changed\nLine 4\n";
        assert!(!git_backend
            .is_unmodified_and_pushed(&repo, "file.txt", committed)
            .await
            .unwrap());

        let opened = git_backend.open_repository(path).await.unwrap();
        assert_eq!(opened.owner, "owner");
        assert_eq!(opened.name, "repo");
        assert_eq!(
            git_backend.remotes(path).await,
            vec!["https://github.com/owner/repo.git".to_string()]
        );
    }
}
