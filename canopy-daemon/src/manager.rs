//! The watcher manager.
//!
//! A single task owns the tracked worktrees, the selection, the focus and
//! tracking flags, the snapshot map and one timer per polled worktree.
//! Callers talk to it through an unbounded command channel; it talks back
//! through a broadcast channel. Poll cycles run on separate tasks and report
//! their outcome back to the owner, which is the only place state changes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use canopy_data::{Worktree, WorktreeInfoSnapshot};

use crate::event::{Command, Event, EventStream};
use crate::notification::transition_notifications;
use crate::poll::{run_cycle, CycleInput, CycleOutcome, Refresh, Sources};
use crate::schedule::{poll_schedule, Cadence, Intervals, PollTimer, Tick};
use crate::watcher::ChangeDetector;

pub const DEFAULT_BACKGROUND_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(15);
const EVENT_CAPACITY: usize = 256;

/// Timing parameters of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherOptions {
    /// Period for the selected worktree while the app is focused.
    pub focused_interval: Duration,
    /// Period for the selected worktree while the app is in the background.
    pub unfocused_interval: Duration,
    /// Period for every other worktree (PR tracking only).
    pub background_interval: Duration,
    /// Bound on each git or gh call within a cycle.
    pub cycle_timeout: Duration,
}

impl WatcherOptions {
    pub fn new(focused_interval: Duration, unfocused_interval: Duration) -> Self {
        Self {
            focused_interval,
            unfocused_interval,
            background_interval: DEFAULT_BACKGROUND_INTERVAL,
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT,
        }
    }

    fn intervals(&self) -> Intervals {
        Intervals {
            focused: self.focused_interval,
            unfocused: self.unfocused_interval,
            background: self.background_interval,
        }
    }
}

/// Point-in-time view of the manager's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherStatus {
    pub worktree_ids: Vec<String>,
    pub selected_worktree_id: Option<String>,
    pub focused: bool,
    pub pull_requests_enabled: bool,
    pub snapshots: HashMap<String, WorktreeInfoSnapshot>,
    /// Cadence and period of every running timer.
    pub schedules: HashMap<String, (Cadence, Duration)>,
}

enum Message {
    Command(Command),
    Status(oneshot::Sender<WatcherStatus>),
}

type SharedEvents = Arc<Mutex<Option<broadcast::Sender<Event>>>>;

fn lock_events(events: &SharedEvents) -> MutexGuard<'_, Option<broadcast::Sender<Event>>> {
    events.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a running watcher.
///
/// Must be created inside a tokio runtime. Dropping the handle stops the
/// watcher just like `Command::Stop`.
pub struct WorktreeInfoWatcherManager {
    messages: mpsc::UnboundedSender<Message>,
    events: SharedEvents,
    task: JoinHandle<()>,
}

impl WorktreeInfoWatcherManager {
    /// Watcher using `git` and `gh` with default background cadence.
    pub fn new(focused_interval: Duration, unfocused_interval: Duration) -> Self {
        Self::with_options(
            WatcherOptions::new(focused_interval, unfocused_interval),
            Sources::default(),
        )
    }

    pub fn with_options(options: WatcherOptions, sources: Sources) -> Self {
        let (messages, messages_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let events = Arc::new(Mutex::new(Some(events_tx)));

        let owner = WatcherOwner::new(options, sources, Arc::clone(&events));
        let task = tokio::spawn(owner.run(messages_rx));

        Self {
            messages,
            events,
            task,
        }
    }

    /// Subscribe to events emitted from now on.
    ///
    /// After the watcher has stopped the returned stream is already closed.
    pub fn event_stream(&self) -> EventStream {
        match lock_events(&self.events).as_ref() {
            Some(tx) => EventStream::new(tx.subscribe()),
            None => {
                let (_closed, rx) = broadcast::channel(1);
                EventStream::new(rx)
            }
        }
    }

    /// Queue a command. Never blocks; ignored once the watcher has stopped.
    pub fn handle_command(&self, command: Command) {
        let _ = self.messages.send(Message::Command(command));
    }

    /// Current state as seen by the owner task, after every command sent
    /// before this call. `None` once stopped.
    pub async fn status(&self) -> Option<WatcherStatus> {
        let (reply, rx) = oneshot::channel();
        self.messages.send(Message::Status(reply)).ok()?;
        rx.await.ok()
    }

    /// Stop the watcher and wait for its task to exit.
    pub async fn shutdown(self) {
        let Self { messages, task, .. } = self;
        let _ = messages.send(Message::Command(Command::Stop));
        drop(messages);
        let _ = task.await;
    }
}

struct CycleResult {
    worktree_id: String,
    epoch: u64,
    outcome: CycleOutcome,
    /// False while blocking reads of a timed-out cycle are still running.
    settled: bool,
}

enum CycleReport {
    Finished(CycleResult),
    /// The overrun of a timed-out cycle has ended.
    Settled { worktree_id: String, epoch: u64 },
}

/// State owned by the watcher task.
struct WatcherOwner {
    options: WatcherOptions,
    sources: Sources,
    events: SharedEvents,

    worktrees: Vec<Worktree>,
    selected: Option<String>,
    focused: bool,
    pull_requests_enabled: bool,
    snapshots: HashMap<String, WorktreeInfoSnapshot>,

    timers: HashMap<String, PollTimer>,
    detector: Option<(String, ChangeDetector)>,
    /// Bumped every time an id becomes tracked; stale cycle results carry an old epoch.
    epochs: HashMap<String, u64>,
    in_flight: HashSet<String>,
    last_refresh: HashMap<String, Instant>,
    last_remote: HashMap<String, Instant>,
    unavailable: HashSet<String>,
    next_generation: u64,

    tick_tx: mpsc::UnboundedSender<Tick>,
    tick_rx: Option<mpsc::UnboundedReceiver<Tick>>,
    result_tx: mpsc::UnboundedSender<CycleReport>,
    result_rx: Option<mpsc::UnboundedReceiver<CycleReport>>,
}

impl WatcherOwner {
    fn new(options: WatcherOptions, sources: Sources, events: SharedEvents) -> Self {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        Self {
            options,
            sources,
            events,
            worktrees: Vec::new(),
            selected: None,
            focused: true,
            pull_requests_enabled: true,
            snapshots: HashMap::new(),
            timers: HashMap::new(),
            detector: None,
            epochs: HashMap::new(),
            in_flight: HashSet::new(),
            last_refresh: HashMap::new(),
            last_remote: HashMap::new(),
            unavailable: HashSet::new(),
            next_generation: 0,
            tick_tx,
            tick_rx: Some(tick_rx),
            result_tx,
            result_rx: Some(result_rx),
        }
    }

    async fn run(mut self, mut messages: mpsc::UnboundedReceiver<Message>) {
        let (Some(mut ticks), Some(mut results)) = (self.tick_rx.take(), self.result_rx.take())
        else {
            return;
        };

        info!(
            focused_ms = self.options.focused_interval.as_millis() as u64,
            unfocused_ms = self.options.unfocused_interval.as_millis() as u64,
            background_secs = self.options.background_interval.as_secs(),
            "worktree watcher started"
        );

        loop {
            tokio::select! {
                // Commands win over ticks so a tick never runs with stale settings
                biased;

                message = messages.recv() => match message {
                    Some(Message::Command(Command::Stop)) | None => {
                        self.stop();
                        break;
                    }
                    Some(Message::Command(command)) => self.apply(command),
                    Some(Message::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                },

                Some(report) = results.recv() => match report {
                    CycleReport::Finished(result) => self.finish_cycle(result),
                    CycleReport::Settled { worktree_id, epoch } => {
                        self.settle_cycle(&worktree_id, epoch)
                    }
                },

                Some(tick) = ticks.recv() => self.on_tick(tick),
            }
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::SetWorktrees(worktrees) => self.set_worktrees(worktrees),
            Command::SetSelectedWorktreeId(id) => {
                debug!(selected = ?id, "selection changed");
                self.selected = id;
            }
            Command::SetPullRequestTrackingEnabled(enabled) => {
                debug!(enabled, "pull request tracking changed");
                if enabled && !self.pull_requests_enabled {
                    // PR fields are refetched on the next tick
                    self.last_remote.clear();
                    self.last_refresh.clear();
                }
                self.pull_requests_enabled = enabled;
            }
            Command::SetFocused(focused) => {
                debug!(focused, "focus changed");
                self.focused = focused;
            }
            Command::Stop => {
                self.stop();
                return;
            }
        }
        self.reschedule();
    }

    fn set_worktrees(&mut self, worktrees: Vec<Worktree>) {
        let mut seen = HashSet::new();
        let worktrees: Vec<Worktree> = worktrees
            .into_iter()
            .filter(|wt| seen.insert(wt.id.clone()))
            .collect();

        let removed: Vec<String> = self
            .worktrees
            .iter()
            .filter(|wt| !seen.contains(&wt.id))
            .map(|wt| wt.id.clone())
            .collect();
        for id in &removed {
            self.untrack(id);
        }

        let mut added = 0usize;
        for wt in &worktrees {
            if !self.epochs.contains_key(&wt.id) {
                self.next_generation += 1;
                self.epochs.insert(wt.id.clone(), self.next_generation);
                added += 1;
            }
        }

        self.worktrees = worktrees;
        info!(
            tracked = self.worktrees.len(),
            added,
            removed = removed.len(),
            "tracked worktrees updated"
        );
    }

    fn untrack(&mut self, id: &str) {
        self.timers.remove(id);
        self.snapshots.remove(id);
        self.epochs.remove(id);
        self.in_flight.remove(id);
        self.last_refresh.remove(id);
        self.last_remote.remove(id);
        self.unavailable.remove(id);
        if self.detector.as_ref().is_some_and(|(d, _)| d == id) {
            self.detector = None;
        }
        debug!(worktree = %id, "worktree untracked");
    }

    /// Bring timers and the change detector in line with current settings.
    ///
    /// A timer whose cadence or period changed is replaced, never adjusted.
    fn reschedule(&mut self) {
        let intervals = self.options.intervals();
        let plan: Vec<(String, Option<(Cadence, Duration)>)> = self
            .worktrees
            .iter()
            .map(|wt| {
                let is_selected = self.selected.as_deref() == Some(wt.id.as_str());
                let schedule = poll_schedule(
                    &intervals,
                    self.focused,
                    is_selected,
                    self.pull_requests_enabled,
                );
                (wt.id.clone(), schedule)
            })
            .collect();

        for (id, schedule) in plan {
            match schedule {
                Some((cadence, period)) => {
                    let current = self
                        .timers
                        .get(&id)
                        .is_some_and(|timer| timer.matches(cadence, period));
                    if !current {
                        self.next_generation += 1;
                        let timer = PollTimer::start(
                            id.clone(),
                            cadence,
                            period,
                            self.next_generation,
                            self.tick_tx.clone(),
                        );
                        debug!(worktree = %id, ?cadence, period_ms = period.as_millis() as u64, "timer scheduled");
                        // Replacing drops and cancels the previous timer
                        self.timers.insert(id, timer);
                    }
                }
                None => {
                    if self.timers.remove(&id).is_some() {
                        debug!(worktree = %id, "timer cancelled");
                    }
                }
            }
        }

        self.sync_detector();
    }

    /// The change detector follows the selected worktree.
    fn sync_detector(&mut self) {
        let Some(selected) = self
            .selected
            .as_ref()
            .and_then(|id| self.worktrees.iter().find(|wt| &wt.id == id))
            .cloned()
        else {
            self.detector = None;
            return;
        };

        let current = self.detector.as_ref().map(|(id, _)| id.as_str());
        if current != Some(selected.id.as_str()) {
            let detector = ChangeDetector::new(&selected.working_directory);
            self.detector = Some((selected.id, detector));
        }
    }

    fn on_tick(&mut self, tick: Tick) {
        let id = tick.worktree_id;
        let Some(timer) = self.timers.get(&id) else {
            return;
        };
        if timer.generation != tick.generation {
            return; // From a replaced timer
        }
        let cadence = timer.cadence;

        if self.in_flight.contains(&id) {
            debug!(worktree = %id, "poll cycle still running, tick skipped");
            return;
        }
        let (Some(worktree), Some(&epoch)) = (
            self.worktrees.iter().find(|wt| wt.id == id).cloned(),
            self.epochs.get(&id),
        ) else {
            return;
        };

        if cadence == Cadence::Selected {
            self.revive_detector(&worktree);
        }
        let files_changed = cadence == Cadence::Selected
            && self
                .detector
                .as_ref()
                .is_some_and(|(d, detector)| d == &id && detector.take_pulse());

        let now = Instant::now();
        let background = self.options.background_interval;
        let elapsed = |at: Option<&Instant>| at.map_or(true, |t| now.duration_since(*t) >= background);

        let input = CycleInput {
            worktree,
            cadence,
            files_changed,
            refresh_due: elapsed(self.last_refresh.get(&id)),
            remote_due: cadence == Cadence::Background || elapsed(self.last_remote.get(&id)),
            pull_requests_enabled: self.pull_requests_enabled,
            previous: self.snapshots.get(&id).cloned(),
            timeout: self.options.cycle_timeout,
        };
        if !input.needs_refresh() {
            return;
        }

        self.in_flight.insert(id.clone());
        let sources = self.sources.clone();
        let results = self.result_tx.clone();
        tokio::spawn(async move {
            let run = run_cycle(input, &sources).await;
            let settled = run.overrun.is_none();
            // Sends fail only after stop; the result is discarded
            let _ = results.send(CycleReport::Finished(CycleResult {
                worktree_id: id.clone(),
                epoch,
                outcome: run.outcome,
                settled,
            }));
            if let Some(overrun) = run.overrun {
                overrun.settle().await;
                let _ = results.send(CycleReport::Settled {
                    worktree_id: id,
                    epoch,
                });
            }
        });
    }

    /// Rebuild a detector that could not watch its directory once the
    /// directory exists.
    fn revive_detector(&mut self, worktree: &Worktree) {
        let dead = self
            .detector
            .as_ref()
            .is_some_and(|(id, detector)| id == &worktree.id && !detector.is_watching());
        if dead && worktree.working_directory.is_dir() {
            debug!(worktree = %worktree.id, "directory available, restarting change detector");
            let detector = ChangeDetector::new(&worktree.working_directory);
            self.detector = Some((worktree.id.clone(), detector));
        }
    }

    fn settle_cycle(&mut self, id: &str, epoch: u64) {
        if self.epochs.get(id) == Some(&epoch) {
            debug!(worktree = %id, "stalled poll cycle finished");
            self.in_flight.remove(id);
        }
    }

    fn finish_cycle(&mut self, result: CycleResult) {
        let CycleResult {
            worktree_id: id,
            epoch,
            outcome,
            settled,
        } = result;

        if self.epochs.get(&id) != Some(&epoch) {
            debug!(worktree = %id, "discarding poll result for untracked worktree");
            return;
        }
        // A timed-out cycle keeps the worktree busy until its reads end
        if settled {
            self.in_flight.remove(&id);
        }

        let now = Instant::now();
        if outcome.fetched_pull_request {
            self.last_remote.insert(id.clone(), now);
        }

        // A pulse only surfaces on its own when the snapshot did not change
        if outcome.files_changed && !matches!(outcome.refresh, Refresh::Updated(_)) {
            self.emit(Event::FilesChanged {
                worktree_id: id.clone(),
            });
        }

        match outcome.refresh {
            Refresh::Skipped => {}
            Refresh::Unavailable(error) => {
                self.last_refresh.insert(id.clone(), now);
                if self.unavailable.insert(id.clone()) {
                    warn!(worktree = %id, error = %error, "worktree info unavailable");
                } else {
                    debug!(worktree = %id, error = %error, "worktree info still unavailable");
                }
            }
            Refresh::Unchanged => {
                self.last_refresh.insert(id.clone(), now);
                self.mark_available(&id);
            }
            Refresh::Updated(snapshot) => {
                self.last_refresh.insert(id.clone(), now);
                self.mark_available(&id);

                let previous = self.snapshots.insert(id.clone(), snapshot.clone());
                debug!(worktree = %id, branch = ?snapshot.branch, dirty = snapshot.is_dirty, "worktree info updated");
                self.emit(Event::InfoUpdated {
                    worktree_id: id.clone(),
                    snapshot: snapshot.clone(),
                });

                if let Some(previous) = previous {
                    for content in transition_notifications(&previous, &snapshot) {
                        info!(worktree = %id, %content, "notification");
                        self.emit(Event::Notification {
                            worktree_id: id.clone(),
                            content,
                        });
                    }
                }
            }
        }
    }

    fn mark_available(&mut self, id: &str) {
        if self.unavailable.remove(id) {
            info!(worktree = %id, "worktree info available again");
        }
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = lock_events(&self.events).as_ref() {
            // No subscribers is not an error
            let _ = tx.send(event);
        }
    }

    fn status(&self) -> WatcherStatus {
        WatcherStatus {
            worktree_ids: self.worktrees.iter().map(|wt| wt.id.clone()).collect(),
            selected_worktree_id: self.selected.clone(),
            focused: self.focused,
            pull_requests_enabled: self.pull_requests_enabled,
            snapshots: self.snapshots.clone(),
            schedules: self
                .timers
                .iter()
                .map(|(id, timer)| (id.clone(), (timer.cadence, timer.period)))
                .collect(),
        }
    }

    fn stop(&mut self) {
        self.timers.clear();
        self.detector = None;
        self.in_flight.clear();
        // Dropping the only sender ends every subscriber's stream
        lock_events(&self.events).take();
        info!("worktree watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn owner() -> WatcherOwner {
        let events = Arc::new(Mutex::new(None));
        WatcherOwner::new(
            WatcherOptions::new(Duration::from_millis(50), Duration::from_millis(500)),
            Sources::default(),
            events,
        )
    }

    fn worktree(name: &str) -> Worktree {
        Worktree::new(
            name,
            "detail",
            PathBuf::from(format!("/nonexistent/canopy/{}", name)),
            PathBuf::from("/nonexistent/canopy"),
        )
    }

    #[tokio::test]
    async fn test_set_worktrees_deduplicates_ids() {
        let mut owner = owner();
        owner.apply(Command::SetWorktrees(vec![
            worktree("a"),
            worktree("a"),
            worktree("b"),
        ]));
        assert_eq!(owner.status().worktree_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_readding_worktree_gets_new_epoch() {
        let mut owner = owner();
        let a = worktree("a");
        owner.apply(Command::SetWorktrees(vec![a.clone()]));
        let first = owner.epochs[&a.id];

        owner.apply(Command::SetWorktrees(vec![]));
        assert!(!owner.epochs.contains_key(&a.id));

        owner.apply(Command::SetWorktrees(vec![a.clone()]));
        assert_ne!(owner.epochs[&a.id], first);
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded() {
        let mut owner = owner();
        let a = worktree("a");
        owner.apply(Command::SetWorktrees(vec![a.clone()]));
        let stale_epoch = owner.epochs[&a.id];
        owner.apply(Command::SetWorktrees(vec![]));
        owner.apply(Command::SetWorktrees(vec![a.clone()]));

        owner.finish_cycle(CycleResult {
            worktree_id: a.id.clone(),
            epoch: stale_epoch,
            outcome: CycleOutcome {
                files_changed: false,
                refresh: Refresh::Updated(WorktreeInfoSnapshot::default()),
                fetched_pull_request: false,
            },
            settled: true,
        });
        assert!(owner.snapshots.is_empty());
    }

    fn outcome(files_changed: bool, refresh: Refresh) -> CycleOutcome {
        CycleOutcome {
            files_changed,
            refresh,
            fetched_pull_request: false,
        }
    }

    #[tokio::test]
    async fn test_timed_out_cycle_blocks_worktree_until_settled() {
        let mut owner = owner();
        let a = worktree("a");
        owner.apply(Command::SetWorktrees(vec![a.clone()]));
        let epoch = owner.epochs[&a.id];
        owner.in_flight.insert(a.id.clone());

        owner.finish_cycle(CycleResult {
            worktree_id: a.id.clone(),
            epoch,
            outcome: outcome(false, Refresh::Unavailable("timed out".to_string())),
            settled: false,
        });
        assert!(owner.in_flight.contains(&a.id));

        let generation = owner.timers[&a.id].generation;
        owner.on_tick(Tick {
            worktree_id: a.id.clone(),
            generation,
        });
        assert!(owner.in_flight.contains(&a.id));

        owner.settle_cycle(&a.id, epoch);
        assert!(owner.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_pulse_with_new_snapshot_emits_only_info_updated() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut owner = WatcherOwner::new(
            WatcherOptions::new(Duration::from_millis(50), Duration::from_millis(500)),
            Sources::default(),
            Arc::new(Mutex::new(Some(tx))),
        );
        let a = worktree("a");
        owner.apply(Command::SetWorktrees(vec![a.clone()]));
        let epoch = owner.epochs[&a.id];

        owner.finish_cycle(CycleResult {
            worktree_id: a.id.clone(),
            epoch,
            outcome: outcome(true, Refresh::Updated(WorktreeInfoSnapshot::default())),
            settled: true,
        });
        owner.finish_cycle(CycleResult {
            worktree_id: a.id.clone(),
            epoch,
            outcome: outcome(true, Refresh::Unchanged),
            settled: true,
        });

        assert!(matches!(rx.try_recv(), Ok(Event::InfoUpdated { .. })));
        assert!(matches!(rx.try_recv(), Ok(Event::FilesChanged { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reenabling_pull_requests_makes_refresh_due() {
        let mut owner = owner();
        let a = worktree("a");
        owner.apply(Command::SetWorktrees(vec![a.clone()]));
        owner.last_remote.insert(a.id.clone(), Instant::now());
        owner.last_refresh.insert(a.id.clone(), Instant::now());

        owner.apply(Command::SetPullRequestTrackingEnabled(false));
        assert!(owner.last_remote.contains_key(&a.id));

        owner.apply(Command::SetPullRequestTrackingEnabled(true));
        assert!(owner.last_remote.is_empty());
        assert!(owner.last_refresh.is_empty());
    }

    #[tokio::test]
    async fn test_detector_restarts_when_directory_appears() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("later");
        let a = Worktree::new("later", "main", path.clone(), dir.path().to_path_buf());

        let mut owner = owner();
        owner.apply(Command::SetWorktrees(vec![a.clone()]));
        owner.apply(Command::SetSelectedWorktreeId(Some(a.id.clone())));
        assert!(!owner.detector.as_ref().unwrap().1.is_watching());

        owner.revive_detector(&a);
        assert!(!owner.detector.as_ref().unwrap().1.is_watching());

        std::fs::create_dir_all(&path).unwrap();
        owner.revive_detector(&a);
        assert!(owner.detector.as_ref().unwrap().1.is_watching());
    }

    #[tokio::test]
    async fn test_unchanged_timer_survives_reschedule() {
        let mut owner = owner();
        let a = worktree("a");
        owner.apply(Command::SetWorktrees(vec![a.clone()]));
        owner.apply(Command::SetSelectedWorktreeId(Some(a.id.clone())));
        let generation = owner.timers[&a.id].generation;

        owner.apply(Command::SetPullRequestTrackingEnabled(false));
        assert_eq!(owner.timers[&a.id].generation, generation);

        owner.apply(Command::SetFocused(false));
        assert_ne!(owner.timers[&a.id].generation, generation);
        assert_eq!(owner.timers[&a.id].period, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_tick_from_replaced_timer_is_ignored() {
        let mut owner = owner();
        let a = worktree("a");
        owner.apply(Command::SetWorktrees(vec![a.clone()]));
        owner.apply(Command::SetSelectedWorktreeId(Some(a.id.clone())));
        let old = owner.timers[&a.id].generation;
        owner.apply(Command::SetFocused(false));

        owner.on_tick(Tick {
            worktree_id: a.id.clone(),
            generation: old,
        });
        assert!(owner.in_flight.is_empty());
    }
}
