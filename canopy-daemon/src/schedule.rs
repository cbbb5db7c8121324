use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Which cadence a worktree is polled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Selected worktree: file changes, local git state and PR status.
    Selected,
    /// Every other worktree: git state and PR status, no file changes.
    Background,
}

/// Polling periods for each cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub focused: Duration,
    pub unfocused: Duration,
    pub background: Duration,
}

/// Cadence and period for a worktree, or `None` if it should not be polled.
///
/// Background worktrees are only polled while pull request tracking is on.
pub fn poll_schedule(
    intervals: &Intervals,
    focused: bool,
    is_selected: bool,
    pull_requests_enabled: bool,
) -> Option<(Cadence, Duration)> {
    if is_selected {
        let period = if focused {
            intervals.focused
        } else {
            intervals.unfocused
        };
        Some((Cadence::Selected, period))
    } else if pull_requests_enabled {
        Some((Cadence::Background, intervals.background))
    } else {
        None
    }
}

/// A timer fired for a worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tick {
    pub worktree_id: String,
    pub generation: u64,
}

/// Repeating timer for one worktree.
///
/// The period is fixed for the timer's lifetime; a new period means a new
/// timer with a new generation. Dropping the handle cancels the task.
pub(crate) struct PollTimer {
    pub cadence: Cadence,
    pub period: Duration,
    pub generation: u64,
    cancel: CancellationToken,
}

impl PollTimer {
    /// Start a timer whose first tick is one full period from now.
    pub fn start(
        worktree_id: String,
        cadence: Cadence,
        period: Duration,
        generation: u64,
        tx: mpsc::UnboundedSender<Tick>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let tick = Tick {
                            worktree_id: worktree_id.clone(),
                            generation,
                        };
                        if tx.send(tick).is_err() {
                            break; // Manager gone
                        }
                    }
                }
            }
        });

        Self {
            cadence,
            period,
            generation,
            cancel,
        }
    }

    pub fn matches(&self, cadence: Cadence, period: Duration) -> bool {
        self.cadence == cadence && self.period == period
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
