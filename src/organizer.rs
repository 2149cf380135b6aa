//! The sorting service.
//!
//! [`Organizer`] owns the current settings and rules and ties the pipeline
//! together:
//!
//! ```text
//! notify -> FolderWatcher -> StabilityTracker -> Ticker -> RuleEngine -> Executor
//!                                                                         |
//!                                                  LogStore <- LogEntry --+--> UndoLedger
//! ```
//!
//! Manual scans skip the tracker and go straight to the engine. Rules and
//! settings are swapped as a whole on reload, never edited in place.

use crate::cancel::CancelToken;
use crate::config::{IgnoreFilter, Settings};
use crate::engine::{Evaluation, RuleEngine};
use crate::error::Result;
use crate::executor::Executor;
use crate::history::{LogEntry, LogStore, OpResult};
use crate::ledger::{UndoLedger, UndoOutcome};
use crate::lock_check::{DEFAULT_QUIET_PERIOD, ExclusiveLockCheck, LockCheck};
use crate::plan::MovePlan;
use crate::render::PathRenderer;
use crate::rule::Rule;
use crate::scanner;
use crate::snapshot::FileSnapshot;
use crate::tracker::StabilityTracker;
use crate::watcher::{ChangeEvent, FolderWatcher, TickInterval, Ticker, WatchSignal};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long change events for a file this process just wrote are ignored.
const SELF_WRITE_GRACE: Duration = Duration::from_secs(10);

pub struct Organizer {
    engine: RuleEngine,
    executor: Executor,
    settings: RwLock<Settings>,
    filter: RwLock<IgnoreFilter>,
    rules: RwLock<Arc<Vec<Rule>>>,
    tracker: Arc<StabilityTracker>,
    tick_interval: TickInterval,
    ledger: UndoLedger,
    log: LogStore,
    recent_writes: Mutex<HashMap<PathBuf, Instant>>,
}

impl Organizer {
    pub fn new(settings: Settings, rules: Vec<Rule>, log: LogStore) -> Result<Self> {
        Self::with_collaborators(
            settings,
            rules,
            log,
            PathRenderer::new(),
            Arc::new(ExclusiveLockCheck::with_quiet_period(DEFAULT_QUIET_PERIOD)),
        )
    }

    pub fn with_collaborators(
        settings: Settings,
        rules: Vec<Rule>,
        log: LogStore,
        renderer: PathRenderer,
        lock_check: Arc<dyn LockCheck>,
    ) -> Result<Self> {
        let filter = settings.compile()?;
        let tracker = Arc::new(StabilityTracker::new(lock_check, settings.max_lock_wait()));
        let ledger = UndoLedger::new(settings.undo_capacity);
        let tick_interval = TickInterval::new(settings.tick_interval());

        Ok(Self {
            engine: RuleEngine::new(renderer),
            executor: Executor::new(),
            settings: RwLock::new(settings),
            filter: RwLock::new(filter),
            rules: RwLock::new(Arc::new(rules)),
            tracker,
            tick_interval,
            ledger,
            log,
            recent_writes: Mutex::new(HashMap::new()),
        })
    }

    /// Applies new settings to the running pipeline.
    ///
    /// The tracker gets the new maximum wait, the ledger the new capacity
    /// (dropping the oldest entries if it shrank), a running ticker the new
    /// interval, and later plans use the new conflict policy.
    pub fn reload(&self, settings: Settings) -> Result<()> {
        let filter = settings.compile()?;

        self.tracker.set_max_wait(settings.max_lock_wait());
        self.ledger.set_capacity(settings.undo_capacity);
        self.tick_interval.set(settings.tick_interval());
        *self.filter.write().unwrap_or_else(|p| p.into_inner()) = filter;
        *self.settings.write().unwrap_or_else(|p| p.into_inner()) = settings;

        tracing::info!("settings reloaded");
        Ok(())
    }

    /// Replaces the rule set used by later evaluations.
    pub fn set_rules(&self, rules: Vec<Rule>) {
        *self.rules.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(rules);
    }

    pub fn rules(&self) -> Arc<Vec<Rule>> {
        Arc::clone(&self.rules.read().unwrap_or_else(|p| p.into_inner()))
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn tracker(&self) -> &Arc<StabilityTracker> {
        &self.tracker
    }

    pub fn ledger(&self) -> &UndoLedger {
        &self.ledger
    }

    pub fn log_store(&self) -> &LogStore {
        &self.log
    }

    /// Lists `folder` and plans every file in it. Nothing is moved.
    pub fn scan(&self, folder: &Path, recursive: bool, cancel: &CancelToken) -> Result<Evaluation> {
        let filter = self.filter.read().unwrap_or_else(|p| p.into_inner()).clone();
        let listing = scanner::list_files(folder, recursive, &filter, cancel)?;

        let mut evaluation = self.evaluate(&listing.files, cancel);
        evaluation.cancelled |= listing.cancelled;
        Ok(evaluation)
    }

    /// Plans `snapshots` against the current rules and conflict policy.
    pub fn evaluate(&self, snapshots: &[FileSnapshot], cancel: &CancelToken) -> Evaluation {
        let rules = self.rules();
        let policy = self.settings.read().unwrap_or_else(|p| p.into_inner()).conflict_policy;
        self.engine.evaluate(snapshots, &rules, policy, cancel)
    }

    /// Executes the selected plans in order, logging each outcome and
    /// recording undoable moves.
    pub fn apply_selected(&self, plans: &mut [MovePlan]) -> Vec<LogEntry> {
        self.apply_selected_with(plans, |_, _| {})
    }

    /// Like [`apply_selected`](Self::apply_selected), calling `on_applied`
    /// after each plan.
    pub fn apply_selected_with<F>(&self, plans: &mut [MovePlan], mut on_applied: F) -> Vec<LogEntry>
    where
        F: FnMut(&MovePlan, &LogEntry),
    {
        self.executor.apply_selected(plans, |plan, entry| {
            self.record(entry);
            on_applied(plan, entry);
        })
    }

    fn record(&self, entry: &LogEntry) {
        if let Err(e) = self.log.append(entry) {
            tracing::warn!(error = %e, "failed to write log entry");
        }
        if entry.result == OpResult::Success {
            self.remember_write(&entry.target_path);
        }
        self.ledger.push(entry.clone());
    }

    /// Feeds a raw change event into the tracker, unless the filter rejects
    /// the file or this process wrote it moments ago.
    pub fn observe(&self, event: &ChangeEvent) -> bool {
        if !self
            .filter
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .should_include(&event.path)
        {
            return false;
        }
        if self.is_recent_write(&event.path) {
            tracing::trace!(path = %event.path.display(), "ignoring own write");
            return false;
        }
        self.tracker.observe(event)
    }

    /// Evaluates and applies files that the tracker reported as stable.
    pub fn process_ready(&self, snapshots: &[FileSnapshot]) -> Vec<LogEntry> {
        if snapshots.is_empty() {
            return Vec::new();
        }

        let mut evaluation = self.evaluate(snapshots, &CancelToken::new());
        let entries = self.apply_selected(&mut evaluation.plans);
        for entry in &entries {
            tracing::info!(
                action = %entry.action,
                result = %entry.result,
                from = %entry.source_path.display(),
                to = %entry.target_path.display(),
                "processed file"
            );
        }
        entries
    }

    /// Undoes the most recent move and persists the result to the log.
    ///
    /// A restored entry is rewritten with its actual restore location; both
    /// restored and discarded entries stop being undoable, so a later run
    /// does not offer them again.
    pub fn undo_last(&self) -> UndoOutcome {
        let outcome = self.ledger.undo();
        let retired = match &outcome {
            UndoOutcome::Restored(report) => {
                self.remember_write(&report.entry.source_path);
                Some(&report.entry)
            }
            UndoOutcome::Discarded(entry) => Some(entry),
            UndoOutcome::Empty | UndoOutcome::Retained { .. } => None,
        };

        if let Some(entry) = retired
            && let Err(e) = self.retire(entry)
        {
            tracing::warn!(error = %e, "failed to update log after undo");
        }
        outcome
    }

    fn retire(&self, updated: &LogEntry) -> Result<()> {
        self.log.update(|entries| {
            let Some(entry) = entries.iter_mut().find(|e| e.id == updated.id) else {
                return false;
            };
            entry.undoable = false;
            entry.source_path = updated.source_path.clone();
            true
        })?;
        Ok(())
    }

    /// Refills the ledger from undoable entries in the log, oldest first, so
    /// that history survives restarts. Returns how many entries are available.
    pub fn restore_undo_history(&self) -> Result<usize> {
        self.ledger.clear();
        for entry in self.log.load_all()?.into_iter().filter(|e| e.undoable) {
            self.ledger.push(entry);
        }
        Ok(self.ledger.len())
    }

    /// Drops log entries older than the configured retention.
    pub fn purge_log(&self) -> Result<usize> {
        let days = self.settings.read().unwrap_or_else(|p| p.into_inner()).log_retention_days;
        self.log.purge_older_than(days)
    }

    fn remember_write(&self, path: &Path) {
        let mut recent = self.recent_writes.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        recent.retain(|_, at| now.duration_since(*at) < SELF_WRITE_GRACE);
        recent.insert(path.to_path_buf(), now);
    }

    fn is_recent_write(&self, path: &Path) -> bool {
        let recent = self.recent_writes.lock().unwrap_or_else(|p| p.into_inner());
        recent
            .get(path)
            .is_some_and(|at| at.elapsed() < SELF_WRITE_GRACE)
    }

    /// Starts watching `folders` and sorting files as they settle.
    ///
    /// # Errors
    ///
    /// Fails if any folder cannot be registered; nothing keeps running then.
    pub fn start(self: &Arc<Self>, folders: &[PathBuf]) -> Result<WatchSession> {
        let (signal_tx, signal_rx) = mpsc::channel();
        let mut watcher = FolderWatcher::new(signal_tx);
        for folder in folders {
            watcher.register(folder)?;
        }

        let stop = CancelToken::new();
        let observer = {
            let organizer = Arc::clone(self);
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.is_cancelled() {
                    match signal_rx.recv_timeout(Duration::from_millis(200)) {
                        Ok(WatchSignal::Change(event)) => {
                            organizer.observe(&event);
                        }
                        Ok(WatchSignal::Error { folder, message }) => {
                            tracing::error!(folder = %folder.display(), %message, "watch error");
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
        };

        let (ready_tx, ready_rx) = mpsc::channel::<FileSnapshot>();
        let ticker = Ticker::spawn_shared(
            Arc::clone(&self.tracker),
            self.tick_interval.clone(),
            ready_tx,
        );

        let worker = {
            let organizer = Arc::clone(self);
            thread::spawn(move || {
                for snapshot in ready_rx {
                    organizer.process_ready(std::slice::from_ref(&snapshot));
                }
            })
        };

        Ok(WatchSession {
            watcher: Some(watcher),
            ticker: Some(ticker),
            stop,
            threads: vec![observer, worker],
        })
    }
}

/// A running watch pipeline. Stops when dropped.
pub struct WatchSession {
    watcher: Option<FolderWatcher>,
    ticker: Option<Ticker>,
    stop: CancelToken,
    threads: Vec<JoinHandle<()>>,
}

impl WatchSession {
    pub fn folders(&self) -> Vec<PathBuf> {
        self.watcher.as_ref().map(FolderWatcher::folders).unwrap_or_default()
    }

    /// Stops watching and waits for in-flight work to finish.
    pub fn stop(&mut self) {
        self.watcher.take();
        self.stop.cancel();
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("pipeline thread panicked");
            }
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.stop();
    }
}
