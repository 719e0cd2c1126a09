//! `inline-reviews` command line entry point.
//!
//! Resolves pull request review comments against a local checkout and prints
//! where each thread lands in the current files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use inline_reviews::application::review::anchor_from_hunk;
use inline_reviews::application::session::{SessionFileTracker, SessionRegistry, SessionServices};
use inline_reviews::domain::CommentThread;
use inline_reviews::infra::app_config::load_config;
use inline_reviews::infra::diff::{match_line, parse_diff};
use inline_reviews::infra::vcs::{GhReviewApi, GitBackend, LocalGit, parse_pr_ref};

#[derive(Parser, Debug)]
#[command(name = "inline-reviews")]
#[command(version)]
#[command(about = "Locate pull request review comments in your working tree", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find where a comment's diff hunk lands in a diff (offline)
    Locate {
        /// Unified diff of one file
        #[arg(long)]
        diff: PathBuf,
        /// Diff hunk the comment was left on
        #[arg(long)]
        hunk: PathBuf,
    },

    /// Print the comment threads of a pull request, resolved against a checkout
    Threads {
        /// PR reference (owner/repo#number or URL)
        #[arg(long)]
        pr: String,
        /// Repository checkout (defaults to the current directory)
        #[arg(long)]
        repo: Option<PathBuf>,
        /// Only these files (defaults to every changed file)
        #[arg(long = "path")]
        paths: Vec<String>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match args.command {
        Commands::Locate { diff, hunk } => locate(&diff, &hunk),
        Commands::Threads {
            pr,
            repo,
            paths,
            json,
        } => threads(&pr, repo, &paths, json).await,
    }
}

fn locate(diff_path: &Path, hunk_path: &Path) -> Result<()> {
    let diff_text = std::fs::read_to_string(diff_path)
        .with_context(|| format!("read diff {}", diff_path.display()))?;
    let hunk_text = std::fs::read_to_string(hunk_path)
        .with_context(|| format!("read hunk {}", hunk_path.display()))?;

    let diff = parse_diff(&diff_text).context("parse diff")?;
    let anchor = anchor_from_hunk(&hunk_text).context("parse hunk")?;

    match match_line(&diff, &anchor) {
        Some(line) => {
            let file_line = line
                .file_line_number()
                .map(|number| number.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "diff line {} (file line {file_line}): {}",
                line.diff_line_number, line.content
            );
        }
        None => println!("no match"),
    }
    Ok(())
}

async fn threads(pr: &str, repo: Option<PathBuf>, paths: &[String], json: bool) -> Result<()> {
    let config = load_config();
    let pr_ref = parse_pr_ref(pr).with_context(|| format!("invalid PR reference {pr}"))?;

    let git = Arc::new(LocalGit::new(
        config.git_path.as_deref(),
        config.diff_context_lines,
    )?);
    let gh = Arc::new(GhReviewApi::new(config.gh_path.as_deref())?);

    let repo_path = match repo {
        Some(path) => path,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let repository = git.open_repository(&repo_path).await?;
    let pull_request = gh.fetch_pull_request(&pr_ref).await?;
    let user = gh.current_user().await?;
    let head_owner = pull_request
        .head
        .owner()
        .unwrap_or(pr_ref.owner.as_str())
        .to_string();
    let is_checked_out = git.tip_sha(&repository).await.ok().as_deref()
        == Some(pull_request.head.sha.as_str());

    let registry = SessionRegistry::new(
        SessionServices {
            git: git.clone(),
            comments: gh.clone(),
        },
        config.session_cache_size,
        config.rebuild_quiet(),
    );
    registry.repository_changed(Some(repository));
    let session = registry
        .get_session(pull_request, user, &head_owner, is_checked_out)
        .await?;

    let trackers: Vec<Arc<SessionFileTracker>> = if paths.is_empty() {
        session.get_all_files().await
    } else {
        let mut trackers = Vec::new();
        for path in paths {
            trackers.push(session.get_file(path).await);
        }
        trackers
    };

    if json {
        let files: Vec<_> = trackers
            .iter()
            .map(|tracker| {
                serde_json::json!({
                    "path": tracker.relative_path(),
                    "commit_sha": tracker.commit_sha(),
                    "threads": tracker.threads(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&files)?);
    } else {
        for tracker in &trackers {
            print_file(tracker);
        }
    }

    session.close();
    Ok(())
}

fn print_file(tracker: &SessionFileTracker) {
    let threads = tracker.threads();
    if threads.is_empty() {
        return;
    }
    println!("{}", tracker.relative_path());
    for thread in &threads {
        println!("  {}", describe_thread(thread));
    }
}

fn describe_thread(thread: &CommentThread) -> String {
    let line = thread
        .line_number
        .map(|line| format!("line {}", line + 1))
        .unwrap_or_else(|| "outdated".to_string());
    let stale = if thread.is_stale { " (stale)" } else { "" };
    let first_line = thread
        .comments
        .first()
        .and_then(|comment| comment.body.lines().next())
        .unwrap_or_default();
    format!(
        "{line}{stale}: {} comment(s), {first_line}",
        thread.comments.len()
    )
}
