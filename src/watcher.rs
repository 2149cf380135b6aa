//! Filesystem notifications and the periodic stabilization tick.

use crate::error::{DropsortError, Result};
use crate::snapshot::FileSnapshot;
use crate::tracker::StabilityTracker;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Changed,
    RenamedTo,
}

/// A raw change reported for one path in a watched folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// What a [`FolderWatcher`] delivers to its consumer.
#[derive(Debug)]
pub enum WatchSignal {
    Change(ChangeEvent),
    Error {
        folder: PathBuf,
        message: String,
    },
}

/// Maps a notify event onto the change kinds the pipeline cares about.
///
/// Rename sources, removals and access events are ignored. For a rename
/// reported with both paths the destination is used.
pub fn classify(event: &Event) -> Option<(ChangeKind, Vec<PathBuf>)> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => return None,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let target = event.paths.last()?.clone();
            return Some((ChangeKind::RenamedTo, vec![target]));
        }
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::RenamedTo,
        EventKind::Modify(_) => ChangeKind::Changed,
        _ => return None,
    };
    Some((kind, event.paths.clone()))
}

/// One non-recursive OS watcher per registered folder.
pub struct FolderWatcher {
    watchers: HashMap<PathBuf, RecommendedWatcher>,
    sender: Sender<WatchSignal>,
}

impl FolderWatcher {
    pub fn new(sender: Sender<WatchSignal>) -> Self {
        Self {
            watchers: HashMap::new(),
            sender,
        }
    }

    /// Starts watching `folder`. Registering a folder twice is a no-op.
    /// Relative folders are resolved against the working directory.
    pub fn register(&mut self, folder: &Path) -> Result<()> {
        let folder = &absolute(folder);
        if self.watchers.contains_key(folder) {
            return Ok(());
        }
        if !folder.is_dir() {
            return Err(DropsortError::MissingFolder(folder.to_path_buf()));
        }

        let sender = self.sender.clone();
        let origin = folder.to_path_buf();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            forward(&sender, &origin, res);
        })
        .map_err(|source| DropsortError::Watch {
            path: folder.to_path_buf(),
            source,
        })?;

        watcher
            .watch(folder, RecursiveMode::NonRecursive)
            .map_err(|source| DropsortError::Watch {
                path: folder.to_path_buf(),
                source,
            })?;

        tracing::info!(folder = %folder.display(), "watching folder");
        self.watchers.insert(folder.to_path_buf(), watcher);
        Ok(())
    }

    /// Stops watching `folder`. Returns whether it was registered.
    pub fn unregister(&mut self, folder: &Path) -> bool {
        let folder = &absolute(folder);
        match self.watchers.remove(folder) {
            Some(mut watcher) => {
                if let Err(e) = watcher.unwatch(folder) {
                    tracing::debug!(folder = %folder.display(), error = %e, "unwatch failed");
                }
                tracing::info!(folder = %folder.display(), "stopped watching folder");
                true
            }
            None => false,
        }
    }

    pub fn folders(&self) -> Vec<PathBuf> {
        let mut folders: Vec<PathBuf> = self.watchers.keys().cloned().collect();
        folders.sort();
        folders
    }

    pub fn is_watching(&self, folder: &Path) -> bool {
        self.watchers.contains_key(&absolute(folder))
    }
}

fn absolute(folder: &Path) -> PathBuf {
    std::path::absolute(folder).unwrap_or_else(|_| folder.to_path_buf())
}

fn forward(sender: &Sender<WatchSignal>, folder: &Path, res: notify::Result<Event>) {
    match res {
        Ok(event) => {
            let Some((kind, paths)) = classify(&event) else {
                return;
            };
            for path in paths {
                let _ = sender.send(WatchSignal::Change(ChangeEvent { path, kind }));
            }
        }
        Err(e) => {
            tracing::error!(folder = %folder.display(), error = %e, "watcher error");
            let _ = sender.send(WatchSignal::Error {
                folder: folder.to_path_buf(),
                message: e.to_string(),
            });
        }
    }
}

/// Background thread driving [`StabilityTracker::tick`] at an adjustable
/// interval.
///
/// Ready snapshots are sent on the channel given to [`Ticker::spawn`]. The
/// interval lives in a shared [`TickInterval`], so a change made while the
/// ticker runs applies from the next poll. The thread ends when the ticker
/// is stopped or dropped, or when the receiving side goes away.
pub struct Ticker {
    interval: TickInterval,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// How often the ticker checks for shutdown and interval changes.
const TICKER_POLL: Duration = Duration::from_millis(50);

/// Tick interval shared between a [`Ticker`] and whoever reconfigures it.
#[derive(Debug, Clone)]
pub struct TickInterval(Arc<AtomicU64>);

impl TickInterval {
    pub fn new(interval: Duration) -> Self {
        Self(Arc::new(AtomicU64::new(millis(interval))))
    }

    pub fn get(&self) -> Duration {
        Duration::from_millis(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, interval: Duration) {
        self.0.store(millis(interval), Ordering::Relaxed);
    }
}

fn millis(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
}

impl Ticker {
    pub fn spawn(
        tracker: Arc<StabilityTracker>,
        interval: Duration,
        ready: Sender<FileSnapshot>,
    ) -> Self {
        Self::spawn_shared(tracker, TickInterval::new(interval), ready)
    }

    /// Spawns a ticker that reads its interval from `interval` on every poll.
    pub fn spawn_shared(
        tracker: Arc<StabilityTracker>,
        interval: TickInterval,
        ready: Sender<FileSnapshot>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let shared = interval.clone();

        let handle = thread::spawn(move || {
            let mut last_tick = Instant::now();
            loop {
                let wait = shared.get().saturating_sub(last_tick.elapsed());
                match shutdown_rx.recv_timeout(wait.min(TICKER_POLL)) {
                    Err(RecvTimeoutError::Timeout) => {
                        if last_tick.elapsed() < shared.get() {
                            continue;
                        }
                        last_tick = Instant::now();
                        let outcome = tracker.tick();
                        for snapshot in outcome.ready {
                            if ready.send(snapshot).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        });

        Self {
            interval,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval.get()
    }

    pub fn set_interval(&self, interval: Duration) {
        self.interval.set(interval);
    }

    /// Stops the thread and waits for it to finish.
    pub fn stop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("tick thread panicked");
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
