//! Canopy worktree watcher
//!
//! Keeps a live snapshot of branch, dirty state, ahead/behind counts and pull
//! request status for a set of git worktrees and streams changes to
//! subscribers. The selected worktree is polled quickly and reports debounced
//! file activity; every other worktree is polled slowly for pull request
//! changes only.

pub mod config;
pub mod event;
pub mod git;
pub mod github;
pub mod manager;
pub mod notification;
pub mod poll;
pub mod schedule;
pub mod watcher;

pub use event::{Command, Event, EventStream};
pub use manager::{WatcherOptions, WatcherStatus, WorktreeInfoWatcherManager};
pub use poll::Sources;
pub use schedule::Cadence;
