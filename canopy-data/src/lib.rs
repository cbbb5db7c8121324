//! Shared data layer for the Canopy worktree watcher
//!
//! Holds the worktree and snapshot model exchanged between the watcher and
//! its subscribers, and the settings store the daemon reads at startup.

pub mod error;
pub mod settings;
pub mod types;

pub use error::SettingsError;
pub use settings::{
    AppearanceMode, FileSettingsStorage, GlobalSettings, InMemorySettingsStorage,
    RepositorySettings, SettingsFile, SettingsStorage, SettingsStore,
};
pub use types::{GitState, PullRequestStatus, Worktree, WorktreeInfoSnapshot};
