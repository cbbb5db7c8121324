use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use serde::Deserialize;

use canopy_data::PullRequestStatus;

/// Fetches the pull request for a branch. `Ok(None)` means no PR exists.
///
/// Implementations block; the poll cycle runs them on the blocking pool.
pub trait PullRequestFetcher: Send + Sync {
    fn fetch_status(&self, repository_root: &Path, branch: &str)
        -> Result<Option<PullRequestStatus>>;
}

/// `PullRequestFetcher` backed by the GitHub CLI (`gh`).
#[derive(Debug, Clone, Copy, Default)]
pub struct GhCli;

const PR_FIELDS: &str = "number,state,url,reviewDecision,mergeable,mergeStateStatus";

impl PullRequestFetcher for GhCli {
    fn fetch_status(
        &self,
        repository_root: &Path,
        branch: &str,
    ) -> Result<Option<PullRequestStatus>> {
        let output = Command::new("gh")
            .current_dir(repository_root)
            .args(["pr", "view", branch, "--json", PR_FIELDS])
            .output()
            .context("Failed to run gh pr view")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_no_pull_request_error(&stderr) {
                return Ok(None);
            }
            anyhow::bail!("gh pr view failed: {}", stderr.trim());
        }

        let stdout = String::from_utf8(output.stdout)?;
        parse_pull_request_json(&stdout).map(Some)
    }
}

fn is_no_pull_request_error(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("no pull requests found")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPullRequest {
    number: u64,
    state: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    review_decision: Option<String>,
    #[serde(default)]
    mergeable: Option<String>,
    #[serde(default)]
    merge_state_status: Option<String>,
}

/// Parse the JSON printed by `gh pr view --json <PR_FIELDS>`.
pub fn parse_pull_request_json(json: &str) -> Result<PullRequestStatus> {
    let raw: GhPullRequest =
        serde_json::from_str(json).context("Failed to parse gh pr view JSON")?;

    let mergeable = match raw.mergeable.as_deref() {
        Some("MERGEABLE") => Some(true),
        Some("CONFLICTING") => Some(false),
        _ => None,
    };

    Ok(PullRequestStatus {
        number: raw.number,
        state: raw.state.to_ascii_uppercase(),
        url: non_empty(raw.url),
        review_decision: non_empty(raw.review_decision),
        mergeable,
        merge_state_status: non_empty(raw.merge_state_status),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
