use super::traits::{PostCommentRequest, PostReplyRequest, ReviewCommentApi};
use crate::domain::{
    Account, ChangedFile, GitReference, PullRequest, ReviewComment, normalize_repo_path,
};
use crate::infra::shell;
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubPrRef {
    pub owner: String,
    pub repo: String,
    pub number: u32,
    pub url: String,
}

static GH_PR_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.)?github\.com/([^/]+)/([^/]+)/pull/(\d+)")
        .expect("github pr url regex")
});
static GH_OWNER_REPO_NUM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^/\s]+)/([^#\s]+)#(\d+)$").expect("github owner/repo#num regex")
});

pub fn parse_pr_ref(input: &str) -> Option<GitHubPrRef> {
    let trimmed = input.trim();
    let caps = GH_PR_URL_RE
        .captures(trimmed)
        .or_else(|| GH_OWNER_REPO_NUM_RE.captures(trimmed))?;

    let owner = caps.get(1)?.as_str().to_string();
    let repo = caps.get(2)?.as_str().to_string();
    let number: u32 = caps.get(3)?.as_str().parse().ok()?;
    let url = format!("https://github.com/{owner}/{repo}/pull/{number}");
    Some(GitHubPrRef {
        owner,
        repo,
        number,
        url,
    })
}

#[derive(Debug, Deserialize)]
struct GhUserJson {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhReviewCommentJson {
    id: u64,
    path: String,
    body: String,
    user: Option<GhUserJson>,
    #[serde(default)]
    diff_hunk: String,
    position: Option<u32>,
    original_position: Option<u32>,
    #[serde(default)]
    commit_id: String,
    #[serde(default)]
    original_commit_id: String,
    in_reply_to_id: Option<u64>,
    #[serde(default)]
    created_at: String,
}

impl From<GhReviewCommentJson> for ReviewComment {
    fn from(json: GhReviewCommentJson) -> Self {
        ReviewComment {
            id: json.id,
            path: json.path,
            author: json.user.map(|user| user.login).unwrap_or_default(),
            body: json.body,
            diff_hunk: json.diff_hunk,
            position: json.position,
            original_position: json.original_position,
            commit_id: json.commit_id,
            original_commit_id: json.original_commit_id,
            in_reply_to: json.in_reply_to_id,
            created_at: json.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhOwnerJson {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhRepositoryJson {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhFileJson {
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPrViewJson {
    number: u32,
    title: String,
    base_ref_name: String,
    base_ref_oid: String,
    head_ref_name: String,
    head_ref_oid: String,
    head_repository: Option<GhRepositoryJson>,
    head_repository_owner: Option<GhOwnerJson>,
    #[serde(default)]
    files: Vec<GhFileJson>,
}

/// Parse `gh api --paginate` output, which concatenates one JSON array per page.
fn parse_paginated_comments(json: &str) -> Result<Vec<ReviewComment>> {
    let mut comments = Vec::new();
    for page in serde_json::Deserializer::from_str(json).into_iter::<Vec<GhReviewCommentJson>>() {
        let page = page.context("parse review comments page")?;
        comments.extend(page.into_iter().map(ReviewComment::from));
    }
    Ok(comments)
}

fn build_pull_request(
    pr: &GitHubPrRef,
    view: GhPrViewJson,
    review_comments: Vec<ReviewComment>,
) -> PullRequest {
    let base_url = format!("https://github.com/{}/{}", pr.owner, pr.repo);
    let head_owner = view
        .head_repository_owner
        .map(|owner| owner.login)
        .unwrap_or_else(|| pr.owner.clone());
    let head_repo = view
        .head_repository
        .map(|repo| repo.name)
        .unwrap_or_else(|| pr.repo.clone());

    PullRequest {
        number: view.number,
        title: view.title,
        base: GitReference {
            label: format!("{}:{}", pr.owner, view.base_ref_name),
            ref_name: view.base_ref_name,
            sha: view.base_ref_oid,
            repository_clone_url: base_url,
        },
        head: GitReference {
            label: format!("{head_owner}:{}", view.head_ref_name),
            ref_name: view.head_ref_name,
            sha: view.head_ref_oid,
            repository_clone_url: format!("https://github.com/{head_owner}/{head_repo}"),
        },
        changed_files: view
            .files
            .into_iter()
            .map(|file| ChangedFile {
                file_name: normalize_repo_path(&file.path),
            })
            .collect(),
        review_comments,
    }
}

/// Review comment access through the GitHub CLI.
#[derive(Debug, Clone)]
pub struct GhReviewApi {
    gh_path: PathBuf,
}

impl GhReviewApi {
    pub fn new(configured: Option<&str>) -> Result<Self> {
        let gh_path = shell::resolve_tool(configured, "gh").context("resolve `gh` path")?;
        Ok(Self { gh_path })
    }

    async fn run(&self, args: &[&str], what: &str) -> Result<String> {
        let output = Command::new(&self.gh_path)
            .args(args)
            .output()
            .await
            .with_context(|| format!("run `gh {what}`"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(format!("`gh {what}` failed: {stderr}")));
        }

        String::from_utf8(output.stdout).with_context(|| format!("decode `gh {what}` stdout"))
    }

    async fn post(&self, endpoint: &str, payload: serde_json::Value) -> Result<ReviewComment> {
        let mut child = Command::new(&self.gh_path)
            .args([
                "api",
                endpoint,
                "--method",
                "POST",
                "-H",
                "Accept: application/vnd.github+json",
                "--input",
                "-",
            ])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .context("spawn `gh api` for review comment")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.to_string().as_bytes())
                .await
                .context("write payload to gh stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("run `gh api` to create review comment")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(format!("`gh api` failed: {stderr}")));
        }

        let json = String::from_utf8(output.stdout).context("decode `gh api` stdout")?;
        let parsed: GhReviewCommentJson =
            serde_json::from_str(&json).context("parse `gh api` response json")?;
        Ok(parsed.into())
    }

    /// The signed-in user.
    pub async fn current_user(&self) -> Result<Account> {
        let json = self.run(&["api", "user"], "api user").await?;
        let user: GhUserJson = serde_json::from_str(&json).context("parse `gh api user` json")?;
        Ok(Account { login: user.login })
    }

    /// Pull request metadata, changed files and every review comment.
    pub async fn fetch_pull_request(&self, pr: &GitHubPrRef) -> Result<PullRequest> {
        let view_json = self
            .run(
                &[
                    "pr",
                    "view",
                    pr.url.as_str(),
                    "--json",
                    "number,title,baseRefName,baseRefOid,headRefName,headRefOid,headRepository,headRepositoryOwner,files",
                ],
                "pr view",
            )
            .await?;
        let view: GhPrViewJson =
            serde_json::from_str(&view_json).context("parse `gh pr view` json")?;

        let endpoint = format!("repos/{}/{}/pulls/{}/comments", pr.owner, pr.repo, pr.number);
        let comments_json = self
            .run(&["api", "--paginate", &endpoint], "api pulls comments")
            .await?;
        let comments = parse_paginated_comments(&comments_json)?;

        log::info!(
            "fetched pull request #{} with {} review comments",
            view.number,
            comments.len()
        );
        Ok(build_pull_request(pr, view, comments))
    }
}

#[async_trait]
impl ReviewCommentApi for GhReviewApi {
    async fn post_review_comment(&self, request: PostCommentRequest) -> Result<ReviewComment> {
        let payload = serde_json::json!({
            "body": request.body,
            "commit_id": request.commit_id,
            "path": normalize_repo_path(&request.path),
            "position": request.position,
        });
        let endpoint = format!(
            "repos/{}/{}/pulls/{}/comments",
            request.repository_owner, request.repository_name, request.number
        );
        self.post(&endpoint, payload).await
    }

    async fn post_reply(&self, request: PostReplyRequest) -> Result<ReviewComment> {
        let payload = serde_json::json!({ "body": request.body });
        let endpoint = format!(
            "repos/{}/{}/pulls/{}/comments/{}/replies",
            request.repository_owner,
            request.repository_name,
            request.number,
            request.in_reply_to
        );
        self.post(&endpoint, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pr_ref_valid_url() {
        let res = parse_pr_ref("https://github.com/octo/widgets/pull/123").expect("should parse");
        assert_eq!(res.owner, "octo");
        assert_eq!(res.repo, "widgets");
        assert_eq!(res.number, 123);
        assert_eq!(res.url, "https://github.com/octo/widgets/pull/123");
    }

    #[test]
    fn test_parse_pr_ref_valid_short_ref() {
        let res = parse_pr_ref("octo/widgets#123").expect("should parse");
        assert_eq!(res.owner, "octo");
        assert_eq!(res.repo, "widgets");
        assert_eq!(res.number, 123);
    }

    #[test]
    fn test_parse_pr_ref_invalid() {
        assert!(parse_pr_ref("invalid").is_none());
        assert!(parse_pr_ref("https://google.com").is_none());
        assert!(parse_pr_ref("owner/repo").is_none());
    }

    #[test]
    fn test_parse_paginated_comments_across_pages() {
        let json = r#"[{"id":1,"path":"src\\a.rs","body":"first","user":{"login":"alice"},
            "diff_hunk":"@@ -1 +1 @@\n+a","position":1,"original_position":1,
            "commit_id":"HEAD","original_commit_id":"HEAD","created_at":"2024-01-01T00:00:00Z"}]
            [{"id":2,"path":"src/a.rs","body":"reply","user":null,"diff_hunk":"",
            "position":null,"original_position":1,"commit_id":"HEAD",
            "original_commit_id":"HEAD","in_reply_to_id":1}]"#;
        let comments = parse_paginated_comments(json).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].author, "alice");
        assert_eq!(comments[0].position, Some(1));
        assert_eq!(comments[1].author, "");
        assert_eq!(comments[1].position, None);
        assert_eq!(comments[1].in_reply_to, Some(1));
    }

    #[test]
    fn test_build_pull_request_from_fork() {
        let pr = parse_pr_ref("upstream/widgets#7").unwrap();
        let view: GhPrViewJson = serde_json::from_str(
            r#"{"number":7,"title":"Add","baseRefName":"main","baseRefOid":"BASE_SHA",
            "headRefName":"feature","headRefOid":"HEAD_SHA",
            "headRepository":{"id":"R","name":"widgets-fork"},
            "headRepositoryOwner":{"id":"U","login":"fork"},
            "files":[{"path":"./src/lib.rs","additions":1,"deletions":0}]}"#,
        )
        .unwrap();
        let pull_request = build_pull_request(&pr, view, Vec::new());
        assert_eq!(pull_request.base.owner(), Some("upstream"));
        assert_eq!(pull_request.head.owner(), Some("fork"));
        assert_eq!(pull_request.head.sha, "HEAD_SHA");
        assert_eq!(pull_request.changed_files[0].file_name, "src/lib.rs");
    }
}
