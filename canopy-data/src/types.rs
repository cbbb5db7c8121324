use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A git worktree tracked by the watcher.
///
/// `id` is stable across refreshes (the working directory path). Worktrees
/// are never mutated in place; a changed set is sent as a whole new list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Worktree {
    pub id: String,
    pub name: String,
    pub detail: String,
    pub working_directory: PathBuf,
    pub repository_root: PathBuf,
}

impl Worktree {
    /// Build a worktree whose id is the working directory path.
    pub fn new(
        name: impl Into<String>,
        detail: impl Into<String>,
        working_directory: PathBuf,
        repository_root: PathBuf,
    ) -> Self {
        Self {
            id: working_directory.to_string_lossy().into_owned(),
            name: name.into(),
            detail: detail.into(),
            working_directory,
            repository_root,
        }
    }
}

/// Local git state of a working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitState {
    /// `None` when HEAD is detached.
    pub branch: Option<String>,
    pub is_dirty: bool,
    pub ahead: u32,
    pub behind: u32,
}

/// Remote pull request status for a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestStatus {
    pub number: u64,
    /// Upper-cased GitHub state: `OPEN`, `CLOSED` or `MERGED`.
    pub state: String,
    pub url: Option<String>,
    pub review_decision: Option<String>,
    /// `None` while GitHub is still computing mergeability.
    pub mergeable: Option<bool>,
    pub merge_state_status: Option<String>,
}

/// Latest known state of one worktree.
///
/// Compared by full equality; an equal snapshot never produces an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeInfoSnapshot {
    pub branch: Option<String>,
    pub is_dirty: bool,
    pub ahead: u32,
    pub behind: u32,
    pub pull_request_number: Option<u64>,
    pub pull_request_state: Option<String>,
    pub pull_request_url: Option<String>,
    pub pull_request_review_decision: Option<String>,
    pub pull_request_mergeable: Option<bool>,
    pub pull_request_merge_state_status: Option<String>,
}

impl WorktreeInfoSnapshot {
    /// Compose a snapshot from local git state and an optional PR status.
    pub fn compose(git: GitState, pull_request: Option<&PullRequestStatus>) -> Self {
        let mut snapshot = Self {
            branch: git.branch,
            is_dirty: git.is_dirty,
            ahead: git.ahead,
            behind: git.behind,
            ..Self::default()
        };
        if let Some(pr) = pull_request {
            snapshot.apply_pull_request(pr);
        }
        snapshot
    }

    /// PR fields of this snapshot, if a pull request is known.
    pub fn pull_request(&self) -> Option<PullRequestStatus> {
        let number = self.pull_request_number?;
        Some(PullRequestStatus {
            number,
            state: self.pull_request_state.clone().unwrap_or_default(),
            url: self.pull_request_url.clone(),
            review_decision: self.pull_request_review_decision.clone(),
            mergeable: self.pull_request_mergeable,
            merge_state_status: self.pull_request_merge_state_status.clone(),
        })
    }

    fn apply_pull_request(&mut self, pr: &PullRequestStatus) {
        self.pull_request_number = Some(pr.number);
        self.pull_request_state = Some(pr.state.clone());
        self.pull_request_url = pr.url.clone();
        self.pull_request_review_decision = pr.review_decision.clone();
        self.pull_request_mergeable = pr.mergeable;
        self.pull_request_merge_state_status = pr.merge_state_status.clone();
    }
}
