use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, warn};

/// Collapses filesystem activity in a worktree into a single pending pulse.
///
/// The notify callback only raises a flag; the scheduler clears it with
/// `take_pulse` on each tick, so any number of raw events between two ticks
/// surface as one change at the next tick boundary. A fresh detector starts
/// with the flag raised so the first tick always reports a change.
pub struct ChangeDetector {
    watcher: Option<notify::RecommendedWatcher>,
    pending: Arc<AtomicBool>,
}

impl ChangeDetector {
    /// Start watching `working_directory`.
    ///
    /// Never fails: if the directory cannot be watched the detector still
    /// yields its initial pulse and the poll cycle reports the directory as
    /// unavailable.
    pub fn new(working_directory: &Path) -> Self {
        let pending = Arc::new(AtomicBool::new(true));
        let watcher = match start_watcher(working_directory, Arc::clone(&pending)) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(
                    path = %working_directory.display(),
                    error = %e,
                    "failed to watch worktree, file changes will not be detected"
                );
                None
            }
        };

        Self { watcher, pending }
    }

    /// Drain the pending pulse. Returns true if anything changed since the
    /// previous call.
    pub fn take_pulse(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }
}

fn start_watcher(
    working_directory: &Path,
    pending: Arc<AtomicBool>,
) -> notify::Result<notify::RecommendedWatcher> {
    let linked = linked_git_dir(working_directory);
    let git_dirs: Vec<PathBuf> = linked.iter().cloned().collect();

    let mut watcher = notify::recommended_watcher(
        move |res: std::result::Result<Event, notify::Error>| {
            let event = match res {
                Ok(e) => e,
                Err(_) => return,
            };
            if is_relevant_event(&event, &git_dirs) {
                pending.store(true, Ordering::Release);
            }
        },
    )?;

    watcher.watch(working_directory, RecursiveMode::Recursive)?;

    // Linked worktrees keep HEAD and index outside the working directory
    if let Some(git_dir) = linked {
        if let Err(e) = watcher.watch(&git_dir, RecursiveMode::NonRecursive) {
            warn!(path = %git_dir.display(), error = %e, "failed to watch linked git dir");
        } else {
            debug!(path = %git_dir.display(), "watching linked git dir");
        }
    }

    debug!(path = %working_directory.display(), "change detector started");
    Ok(watcher)
}

/// Resolve the git dir of a linked worktree from its `.git` file.
fn linked_git_dir(working_directory: &Path) -> Option<PathBuf> {
    let dot_git = working_directory.join(".git");
    if !dot_git.is_file() {
        return None;
    }
    let content = std::fs::read_to_string(&dot_git).ok()?;
    let raw = content
        .lines()
        .find_map(|line| line.strip_prefix("gitdir:"))?
        .trim();
    if raw.is_empty() {
        return None;
    }
    let path = PathBuf::from(raw);
    Some(if path.is_absolute() {
        path
    } else {
        working_directory.join(path)
    })
}

fn is_relevant_event(event: &Event, git_dirs: &[PathBuf]) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|path| is_relevant_path(path, git_dirs))
}

/// Inside a git dir only HEAD, index and refs matter; lock files never do.
fn is_relevant_path(path: &Path, git_dirs: &[PathBuf]) -> bool {
    let in_git_dir = path.components().any(|c| c.as_os_str() == ".git")
        || git_dirs.iter().any(|dir| path.starts_with(dir));
    if !in_git_dir {
        return true;
    }

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if file_name.ends_with(".lock") {
        return false;
    }
    file_name == "HEAD"
        || file_name == "index"
        || path.components().any(|c| c.as_os_str() == "refs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_relevant_paths() {
        let none: Vec<PathBuf> = Vec::new();
        assert!(is_relevant_path(Path::new("/wt/src/main.rs"), &none));
        assert!(is_relevant_path(Path::new("/wt/.git/HEAD"), &none));
        assert!(is_relevant_path(Path::new("/wt/.git/index"), &none));
        assert!(is_relevant_path(
            Path::new("/wt/.git/refs/heads/main"),
            &none
        ));
        assert!(!is_relevant_path(Path::new("/wt/.git/index.lock"), &none));
        assert!(!is_relevant_path(
            Path::new("/wt/.git/objects/ab/cdef"),
            &none
        ));
        assert!(!is_relevant_path(Path::new("/wt/.git/FETCH_HEAD"), &none));
    }

    #[test]
    fn test_relevant_paths_in_linked_git_dir() {
        let linked = vec![PathBuf::from("/repo/.git/worktrees/eagle")];
        assert!(is_relevant_path(
            Path::new("/repo/.git/worktrees/eagle/HEAD"),
            &linked
        ));
        assert!(!is_relevant_path(
            Path::new("/repo/.git/worktrees/eagle/logs/HEAD.lock"),
            &linked
        ));
    }

    #[test]
    fn test_linked_git_dir_relative_and_absolute() {
        let dir = TempDir::new().unwrap();
        let wt = dir.path().join("eagle");
        fs::create_dir_all(&wt).unwrap();

        fs::write(wt.join(".git"), "gitdir: /repo/.git/worktrees/eagle\n").unwrap();
        assert_eq!(
            linked_git_dir(&wt),
            Some(PathBuf::from("/repo/.git/worktrees/eagle"))
        );

        fs::write(wt.join(".git"), "gitdir: ../repo/.git/worktrees/eagle\n").unwrap();
        assert_eq!(
            linked_git_dir(&wt),
            Some(wt.join("../repo/.git/worktrees/eagle"))
        );
    }

    #[test]
    fn test_linked_git_dir_none_for_regular_repo() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        assert_eq!(linked_git_dir(dir.path()), None);
    }

    #[test]
    fn test_initial_pulse_then_quiet() {
        let dir = TempDir::new().unwrap();
        let detector = ChangeDetector::new(dir.path());

        assert!(detector.is_watching());
        assert!(detector.take_pulse());
        assert!(!detector.take_pulse());
    }

    #[test]
    fn test_burst_collapses_into_one_pulse() {
        let dir = TempDir::new().unwrap();
        let detector = ChangeDetector::new(dir.path());
        assert!(detector.take_pulse());

        for i in 0..20 {
            fs::write(dir.path().join(format!("out-{}.o", i)), "x").unwrap();
        }
        std::thread::sleep(Duration::from_millis(300));

        assert!(detector.take_pulse());
        assert!(!detector.take_pulse());
    }

    #[test]
    fn test_missing_directory_degrades() {
        let dir = TempDir::new().unwrap();
        let detector = ChangeDetector::new(&dir.path().join("deleted"));
        assert!(!detector.is_watching());
        assert!(detector.take_pulse());
        assert!(!detector.take_pulse());
    }
}
