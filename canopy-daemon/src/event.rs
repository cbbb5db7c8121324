use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use canopy_data::{Worktree, WorktreeInfoSnapshot};

/// Input accepted by the watcher manager, applied in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replace the whole tracked set.
    SetWorktrees(Vec<Worktree>),
    /// Select a worktree by id. Unknown ids are accepted and take effect once tracked.
    SetSelectedWorktreeId(Option<String>),
    SetPullRequestTrackingEnabled(bool),
    SetFocused(bool),
    /// Cancel all timers, close every event stream and ignore later commands.
    Stop,
}

/// Output of the watcher manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Debounced filesystem activity; carries no new snapshot data.
    FilesChanged { worktree_id: String },
    /// A snapshot that differs from the previous one.
    InfoUpdated {
        worktree_id: String,
        snapshot: WorktreeInfoSnapshot,
    },
    /// User-facing alert derived from a snapshot transition.
    Notification {
        worktree_id: String,
        content: String,
    },
}

impl Event {
    pub fn worktree_id(&self) -> &str {
        match self {
            Event::FilesChanged { worktree_id }
            | Event::InfoUpdated { worktree_id, .. }
            | Event::Notification { worktree_id, .. } => worktree_id,
        }
    }
}

/// One subscription to the manager's events.
///
/// Receives only events emitted after it was created. Ends when the
/// manager stops.
pub struct EventStream {
    rx: broadcast::Receiver<Event>,
}

impl EventStream {
    pub(crate) fn new(rx: broadcast::Receiver<Event>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the manager has stopped.
    ///
    /// A subscriber that falls behind loses the oldest events rather than
    /// slowing the scheduler down.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Event> {
        futures::stream::unfold(self, |mut stream| async move {
            let next = stream.recv().await;
            next.map(|event| (event, stream))
        })
    }
}
