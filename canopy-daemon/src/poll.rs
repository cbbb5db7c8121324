//! One refresh of one worktree.
//!
//! A cycle reads local git state, optionally fetches the pull request, and
//! compares the composed snapshot with the previous one. Polling often is
//! cheap for subscribers: an equal snapshot is reported as `Unchanged` and
//! never turns into an event.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::debug;

use canopy_data::{GitState, PullRequestStatus, Worktree, WorktreeInfoSnapshot};

use crate::git::{GitCli, GitStateReader};
use crate::github::{GhCli, PullRequestFetcher};
use crate::schedule::Cadence;

/// The collaborators a cycle reads from.
#[derive(Clone)]
pub struct Sources {
    pub git: Arc<dyn GitStateReader>,
    pub pull_requests: Arc<dyn PullRequestFetcher>,
}

impl Sources {
    pub fn new(git: Arc<dyn GitStateReader>, pull_requests: Arc<dyn PullRequestFetcher>) -> Self {
        Self { git, pull_requests }
    }
}

impl Default for Sources {
    fn default() -> Self {
        Self::new(Arc::new(GitCli), Arc::new(GhCli))
    }
}

/// Everything a cycle needs, captured by the scheduler at tick time.
#[derive(Debug, Clone)]
pub struct CycleInput {
    pub worktree: Worktree,
    pub cadence: Cadence,
    /// The change detector reported activity since the last tick.
    pub files_changed: bool,
    /// A background interval has passed since the last full refresh.
    pub refresh_due: bool,
    /// A background interval has passed since the last PR fetch.
    pub remote_due: bool,
    pub pull_requests_enabled: bool,
    pub previous: Option<WorktreeInfoSnapshot>,
    /// Bound on each collaborator call.
    pub timeout: Duration,
}

impl CycleInput {
    /// Whether git state must be read this cycle.
    ///
    /// Background ticks always refresh. The selected worktree refreshes on
    /// activity, when it has no snapshot yet, or when a refresh is due.
    pub fn needs_refresh(&self) -> bool {
        match self.cadence {
            Cadence::Background => true,
            Cadence::Selected => self.files_changed || self.previous.is_none() || self.refresh_due,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    /// Nothing was read this cycle.
    Skipped,
    /// Git state could not be read; the stored snapshot is kept.
    Unavailable(String),
    /// Read succeeded and matched the previous snapshot.
    Unchanged,
    Updated(WorktreeInfoSnapshot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub files_changed: bool,
    pub refresh: Refresh,
    /// The PR fetcher was called (successfully or not).
    pub fetched_pull_request: bool,
}

/// Blocking reads still running after their cycle timed out.
///
/// The worktree must not start another cycle until this settles, or a hung
/// `git` or `gh` would pile up threads on the blocking pool.
pub struct Overrun {
    handle: JoinHandle<Result<Reading>>,
}

impl Overrun {
    /// Wait for the stalled reads to finish. Their result is discarded.
    pub async fn settle(self) {
        let _ = self.handle.await;
    }
}

pub struct CycleRun {
    pub outcome: CycleOutcome,
    pub overrun: Option<Overrun>,
}

/// What the blocking half of a cycle read from the collaborators.
struct Reading {
    git_state: GitState,
    pull_request: Option<PullRequestStatus>,
    fetched_pull_request: bool,
}

/// Run one cycle. Never fails: collaborator errors and timeouts degrade.
///
/// Every blocking read of the cycle runs in one blocking task bounded by
/// `input.timeout` as a whole.
pub async fn run_cycle(input: CycleInput, sources: &Sources) -> CycleRun {
    let mut outcome = CycleOutcome {
        files_changed: input.files_changed,
        refresh: Refresh::Skipped,
        fetched_pull_request: false,
    };

    if !input.needs_refresh() {
        return CycleRun {
            outcome,
            overrun: None,
        };
    }

    let timeout = input.timeout;
    let blocking_input = input.clone();
    let blocking_sources = sources.clone();
    let mut handle = tokio::task::spawn_blocking(move || {
        read_sources(&blocking_input, &blocking_sources)
    });

    let reading = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(reading))) => reading,
        Ok(Ok(Err(e))) => {
            outcome.refresh = Refresh::Unavailable(e.to_string());
            return CycleRun {
                outcome,
                overrun: None,
            };
        }
        Ok(Err(join_err)) => {
            outcome.refresh = Refresh::Unavailable(format!("poll task failed: {}", join_err));
            return CycleRun {
                outcome,
                overrun: None,
            };
        }
        Err(_) => {
            outcome.refresh = Refresh::Unavailable(format!("timed out after {:?}", timeout));
            return CycleRun {
                outcome,
                overrun: Some(Overrun { handle }),
            };
        }
    };

    outcome.fetched_pull_request = reading.fetched_pull_request;
    let snapshot = WorktreeInfoSnapshot::compose(reading.git_state, reading.pull_request.as_ref());
    outcome.refresh = if input.previous.as_ref() == Some(&snapshot) {
        Refresh::Unchanged
    } else {
        Refresh::Updated(snapshot)
    };
    CycleRun {
        outcome,
        overrun: None,
    }
}

fn read_sources(input: &CycleInput, sources: &Sources) -> Result<Reading> {
    let git_state = sources.git.read_state(&input.worktree.working_directory)?;

    let mut fetched_pull_request = false;
    let pull_request = if !input.pull_requests_enabled {
        None
    } else if let Some(branch) = git_state.branch.as_deref() {
        let branch_changed = input
            .previous
            .as_ref()
            .map_or(true, |prev| prev.branch.as_deref() != Some(branch));

        if input.remote_due || branch_changed {
            fetched_pull_request = true;
            match sources
                .pull_requests
                .fetch_status(&input.worktree.repository_root, branch)
            {
                Ok(pr) => pr,
                Err(e) => {
                    // Remote failures only blank the PR fields for this cycle
                    debug!(worktree = %input.worktree.id, error = %e, "pull request fetch failed");
                    None
                }
            }
        } else {
            input.previous.as_ref().and_then(|prev| prev.pull_request())
        }
    } else {
        None
    };

    Ok(Reading {
        git_state,
        pull_request,
        fetched_pull_request,
    })
}
