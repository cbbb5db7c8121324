use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};

use canopy_daemon::config::WatcherConfig;
use canopy_daemon::git;
use canopy_daemon::{Command, Event, Sources, WorktreeInfoWatcherManager};
use canopy_data::{SettingsStore, Worktree};

const REDISCOVERY_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(
    name = "canopy-daemon",
    about = "Watches git worktrees and prints info changes as JSON lines"
)]
struct Cli {
    /// Path to config file (default: ~/.config/canopy/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to settings file (default: ~/.canopy/settings.json)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Repository root to watch; repeatable (default: roots from settings)
    #[arg(long = "repo")]
    repos: Vec<PathBuf>,

    /// Worktree id (its path) to select at startup
    #[arg(long)]
    select: Option<String>,

    /// Start with the unfocused interval for the selected worktree
    #[arg(long)]
    unfocused: bool,

    /// Disable pull request tracking
    #[arg(long)]
    no_pull_requests: bool,
}

#[derive(Serialize)]
struct EventLine<'a> {
    at: DateTime<Utc>,
    event: &'a Event,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Events go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = WatcherConfig::load(cli.config.as_ref())?;
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| config.settings_path.clone());
    info!(settings = %settings_path.display(), "loaded config");

    let store = SettingsStore::open(&settings_path);
    let settings = store.load()?;

    let roots: Vec<PathBuf> = if cli.repos.is_empty() {
        settings.repository_roots.iter().map(PathBuf::from).collect()
    } else {
        cli.repos.clone()
    };
    if roots.is_empty() {
        bail!(
            "no repositories to watch (pass --repo or add repositoryRoots to {})",
            settings_path.display()
        );
    }

    let pinned = settings.pinned_worktree_ids.clone();
    let pull_requests_enabled =
        settings.global.pull_request_tracking_enabled && !cli.no_pull_requests;

    let worktrees = discover(&roots, &pinned).await;
    let selected = initial_selection(cli.select.as_deref(), &pinned, &worktrees);
    info!(
        repos = roots.len(),
        worktrees = worktrees.len(),
        selected = ?selected,
        pull_requests = pull_requests_enabled,
        "starting watcher"
    );

    let manager = WorktreeInfoWatcherManager::with_options(config.options(), Sources::default());
    let mut events = manager.event_stream();
    manager.handle_command(Command::SetPullRequestTrackingEnabled(pull_requests_enabled));
    manager.handle_command(Command::SetFocused(!cli.unfocused));
    manager.handle_command(Command::SetWorktrees(worktrees));
    manager.handle_command(Command::SetSelectedWorktreeId(selected));

    let mut rediscover = tokio::time::interval(REDISCOVERY_INTERVAL);
    rediscover.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick completes immediately; discovery already ran
    rediscover.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c, shutting down");
                break;
            }

            event = events.recv() => match event {
                Some(event) => print_event(&event)?,
                None => {
                    info!("event stream closed, shutting down");
                    break;
                }
            },

            _ = rediscover.tick() => {
                let worktrees = discover(&roots, &pinned).await;
                manager.handle_command(Command::SetWorktrees(worktrees));
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

fn print_event(event: &Event) -> Result<()> {
    let line = serde_json::to_string(&EventLine {
        at: Utc::now(),
        event,
    })?;
    println!("{}", line);
    Ok(())
}

/// List worktrees of every root. A root that cannot be listed is skipped.
async fn discover(roots: &[PathBuf], pinned: &[String]) -> Vec<Worktree> {
    let roots = roots.to_vec();
    let found = tokio::task::spawn_blocking(move || {
        let mut all = Vec::new();
        for root in &roots {
            match git::list_worktrees(root) {
                Ok(worktrees) => all.extend(worktrees),
                Err(e) => warn!(repo = %root.display(), error = %e, "worktree discovery failed"),
            }
        }
        all
    })
    .await
    .unwrap_or_else(|e| {
        error!(error = %e, "worktree discovery task failed");
        Vec::new()
    });

    order_pinned_first(found, pinned)
}

/// Pinned worktrees first, in pinned order; the rest keep discovery order.
fn order_pinned_first(mut worktrees: Vec<Worktree>, pinned: &[String]) -> Vec<Worktree> {
    worktrees.sort_by_key(|wt| {
        pinned
            .iter()
            .position(|id| id == &wt.id)
            .unwrap_or(usize::MAX)
    });
    worktrees
}

fn initial_selection(
    select: Option<&str>,
    pinned: &[String],
    worktrees: &[Worktree],
) -> Option<String> {
    if let Some(id) = select {
        return Some(id.to_string());
    }
    pinned
        .iter()
        .find(|id| worktrees.iter().any(|wt| &wt.id == *id))
        .cloned()
        .or_else(|| worktrees.first().map(|wt| wt.id.clone()))
}
