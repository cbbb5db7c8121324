use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};

use canopy_data::{GitState, Worktree};

/// Reads local git state for a working directory.
///
/// Implementations block; the poll cycle runs them on the blocking pool.
pub trait GitStateReader: Send + Sync {
    fn read_state(&self, working_directory: &Path) -> Result<GitState>;
}

/// `GitStateReader` backed by the `git` executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl GitStateReader for GitCli {
    fn read_state(&self, working_directory: &Path) -> Result<GitState> {
        read_git_state(working_directory)
    }
}

/// Read branch, dirty flag and ahead/behind counts in one `git status` call.
///
/// Uses `--no-optional-locks` so polling never rewrites the index (which
/// would wake the change detector on every tick).
pub fn read_git_state(working_directory: &Path) -> Result<GitState> {
    if !working_directory.is_dir() {
        anyhow::bail!(
            "working directory does not exist: {}",
            working_directory.display()
        );
    }

    let output = Command::new("git")
        .current_dir(working_directory)
        .args([
            "--no-optional-locks",
            "status",
            "--porcelain=v1",
            "--branch",
            "--untracked-files=normal",
        ])
        .output()
        .context("Failed to run git status")?;

    if !output.status.success() {
        anyhow::bail!(
            "git status failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let stdout = String::from_utf8(output.stdout)?;
    Ok(parse_status_output(&stdout))
}

/// Parse `git status --porcelain=v1 --branch` output.
pub fn parse_status_output(output: &str) -> GitState {
    let mut state = GitState::default();

    for line in output.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            let (branch, ahead, behind) = parse_branch_header(header);
            state.branch = branch;
            state.ahead = ahead;
            state.behind = behind;
        } else if !line.trim().is_empty() {
            state.is_dirty = true;
        }
    }

    state
}

/// Parse the `## ...` header line (without the leading `## `).
///
/// Forms handled:
/// - `main`
/// - `main...origin/main [ahead 1, behind 2]`
/// - `No commits yet on main` / `Initial commit on main`
/// - `HEAD (no branch)`
fn parse_branch_header(header: &str) -> (Option<String>, u32, u32) {
    let header = header.trim();

    if header.starts_with("HEAD (no branch)") {
        return (None, 0, 0);
    }
    for prefix in ["No commits yet on ", "Initial commit on "] {
        if let Some(branch) = header.strip_prefix(prefix) {
            return (Some(branch.trim().to_string()), 0, 0);
        }
    }

    let (refs, tracking) = match header.find(" [") {
        Some(idx) => (&header[..idx], Some(&header[idx + 2..])),
        None => (header, None),
    };
    let branch = refs.split("...").next().unwrap_or(refs).trim();

    let mut ahead = 0u32;
    let mut behind = 0u32;
    if let Some(details) = tracking.map(|t| t.trim_end_matches(']')) {
        for part in details.split(',') {
            let token = part.trim();
            if let Some(value) = token.strip_prefix("ahead ") {
                ahead = value.trim().parse::<u32>().unwrap_or(0);
            } else if let Some(value) = token.strip_prefix("behind ") {
                behind = value.trim().parse::<u32>().unwrap_or(0);
            }
        }
    }

    let branch = (!branch.is_empty()).then(|| branch.to_string());
    (branch, ahead, behind)
}

/// List the worktrees of a repository via `git worktree list --porcelain`.
pub fn list_worktrees(repository_root: &Path) -> Result<Vec<Worktree>> {
    let output = Command::new("git")
        .current_dir(repository_root)
        .args(["worktree", "list", "--porcelain"])
        .output()
        .context("Failed to run git worktree list")?;

    if !output.status.success() {
        anyhow::bail!(
            "git worktree list failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let stdout = String::from_utf8(output.stdout)?;
    Ok(parse_worktree_list(&stdout, repository_root))
}

/// Parse porcelain worktree listing. Bare entries are skipped.
pub fn parse_worktree_list(output: &str, repository_root: &Path) -> Vec<Worktree> {
    let mut worktrees = Vec::new();

    for block in output.split("\n\n") {
        let mut path: Option<PathBuf> = None;
        let mut branch: Option<String> = None;
        let mut bare = false;

        for line in block.lines() {
            if let Some(p) = line.strip_prefix("worktree ") {
                path = Some(PathBuf::from(p.trim()));
            } else if let Some(b) = line.strip_prefix("branch ") {
                let b = b.trim();
                branch = Some(b.strip_prefix("refs/heads/").unwrap_or(b).to_string());
            } else if line.trim() == "bare" {
                bare = true;
            }
        }

        let Some(path) = path else { continue };
        if bare {
            continue;
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| path.display().to_string());
        let detail = branch.unwrap_or_else(|| "detached".to_string());

        worktrees.push(Worktree::new(
            name,
            detail,
            path,
            repository_root.to_path_buf(),
        ));
    }

    worktrees
}
