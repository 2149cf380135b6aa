//! Stabilization of freshly detected files.
//!
//! Every path goes through `Unknown -> Pending -> Ready | Dropped`. A change
//! notification starts tracking an existing file and records when it was
//! first seen; later notifications for the same path change nothing, so the
//! worst-case wait is bounded even while a writer keeps touching the file.
//! A periodic [`tick`](StabilityTracker::tick) emits unlocked files as
//! snapshots and drops files still locked after the maximum wait.

use crate::lock_check::LockCheck;
use crate::snapshot::FileSnapshot;
use crate::watcher::ChangeEvent;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Source of the current time, injectable so timeouts can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingEntry {
    path: PathBuf,
    first_seen_at: Instant,
}

/// What one tick decided.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Files that are safe to process, each emitted once.
    pub ready: Vec<FileSnapshot>,
    /// Files that stayed locked past the maximum wait.
    pub dropped: Vec<PathBuf>,
}

pub struct StabilityTracker {
    pending: Mutex<HashMap<PathBuf, PendingEntry>>,
    max_wait: Mutex<Duration>,
    lock_check: Arc<dyn LockCheck>,
    clock: Arc<dyn Clock>,
}

impl StabilityTracker {
    pub fn new(lock_check: Arc<dyn LockCheck>, max_wait: Duration) -> Self {
        Self::with_clock(lock_check, Arc::new(SystemClock), max_wait)
    }

    pub fn with_clock(
        lock_check: Arc<dyn LockCheck>,
        clock: Arc<dyn Clock>,
        max_wait: Duration,
    ) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            max_wait: Mutex::new(max_wait),
            lock_check,
            clock,
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<PathBuf, PendingEntry>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Starts tracking the event's path. See [`notify`](Self::notify).
    pub fn observe(&self, event: &ChangeEvent) -> bool {
        self.notify(&event.path)
    }

    /// Starts tracking `path` if it is an existing file not yet pending.
    /// Returns `true` when a new pending entry was created.
    pub fn notify(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }

        let now = self.clock.now();
        let mut pending = self.pending();
        if pending.contains_key(path) {
            return false;
        }

        tracing::debug!(path = %path.display(), "tracking new file");
        pending.insert(
            path.to_path_buf(),
            PendingEntry {
                path: path.to_path_buf(),
                first_seen_at: now,
            },
        );
        true
    }

    /// Checks every pending file once.
    ///
    /// Lock checks run without holding the pending map, so notifications are
    /// never blocked behind file I/O. An entry is only resolved if it is
    /// still the same pending cycle that was inspected.
    pub fn tick(&self) -> TickOutcome {
        let candidates: Vec<PendingEntry> = self.pending().values().cloned().collect();
        let max_wait = self.max_wait();
        let mut outcome = TickOutcome::default();

        for entry in candidates {
            if self.lock_check.is_locked(&entry.path) {
                let waited = self.clock.now().saturating_duration_since(entry.first_seen_at);
                if waited > max_wait && self.resolve(&entry) {
                    tracing::warn!(
                        path = %entry.path.display(),
                        waited_secs = waited.as_secs(),
                        "file stayed locked too long, dropping"
                    );
                    outcome.dropped.push(entry.path);
                }
                continue;
            }

            match FileSnapshot::capture(&entry.path) {
                Ok(snapshot) => {
                    if self.resolve(&entry) {
                        tracing::debug!(path = %entry.path.display(), "file is stable");
                        outcome.ready.push(snapshot);
                    }
                }
                Err(e) => {
                    if self.resolve(&entry) {
                        tracing::debug!(
                            path = %entry.path.display(),
                            error = %e,
                            "pending file vanished"
                        );
                    }
                }
            }
        }

        outcome
    }

    /// Removes `entry` if it is still the tracked one for its path.
    fn resolve(&self, entry: &PendingEntry) -> bool {
        let mut pending = self.pending();
        match pending.get(&entry.path) {
            Some(current) if current.first_seen_at == entry.first_seen_at => {
                pending.remove(&entry.path);
                true
            }
            _ => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending().contains_key(path)
    }

    pub fn max_wait(&self) -> Duration {
        *self.max_wait.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_max_wait(&self, max_wait: Duration) {
        *self.max_wait.lock().unwrap_or_else(|p| p.into_inner()) = max_wait;
    }

    pub fn clear(&self) {
        self.pending().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::ChangeKind;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct ScriptedLocks {
        locked: Mutex<HashSet<PathBuf>>,
    }

    impl ScriptedLocks {
        fn lock(&self, path: &Path) {
            self.locked.lock().unwrap().insert(path.to_path_buf());
        }

        fn release(&self, path: &Path) {
            self.locked.lock().unwrap().remove(path);
        }
    }

    impl LockCheck for ScriptedLocks {
        fn is_locked(&self, path: &Path) -> bool {
            self.locked.lock().unwrap().contains(path)
        }
    }

    struct Fixture {
        temp_dir: TempDir,
        locks: Arc<ScriptedLocks>,
        clock: Arc<ManualClock>,
        tracker: StabilityTracker,
    }

    fn fixture(max_wait_secs: u64) -> Fixture {
        let locks = Arc::new(ScriptedLocks::default());
        let clock = Arc::new(ManualClock::new());
        let tracker = StabilityTracker::with_clock(
            locks.clone(),
            clock.clone(),
            Duration::from_secs(max_wait_secs),
        );
        Fixture {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            locks,
            clock,
            tracker,
        }
    }

    impl Fixture {
        fn file(&self, name: &str) -> PathBuf {
            let path = self.temp_dir.path().join(name);
            fs::write(&path, b"content").expect("Failed to write test file");
            path
        }
    }

    #[test]
    fn test_unlocked_file_emitted_once() {
        let f = fixture(30);
        let path = f.file("done.zip");

        assert!(f.tracker.notify(&path));
        let first = f.tracker.tick();
        let second = f.tracker.tick();

        assert_eq!(first.ready.len(), 1);
        assert_eq!(first.ready[0].path, path);
        assert!(second.ready.is_empty());
        assert_eq!(f.tracker.pending_count(), 0);
    }

    #[test]
    fn test_locked_file_waits_then_emits_when_released() {
        let f = fixture(30);
        let path = f.file("partial.iso");
        f.locks.lock(&path);

        f.tracker.notify(&path);
        f.clock.advance(Duration::from_secs(10));
        assert!(f.tracker.tick().ready.is_empty());
        assert!(f.tracker.is_pending(&path));

        f.locks.release(&path);
        f.clock.advance(Duration::from_secs(10));
        let outcome = f.tracker.tick();

        assert_eq!(outcome.ready.len(), 1);
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn test_locked_past_max_wait_is_dropped_and_never_emitted() {
        let f = fixture(30);
        let path = f.file("stuck.bin");
        f.locks.lock(&path);

        f.tracker.notify(&path);
        f.clock.advance(Duration::from_secs(30));
        assert!(f.tracker.tick().dropped.is_empty());

        f.clock.advance(Duration::from_secs(1));
        let outcome = f.tracker.tick();
        assert_eq!(outcome.dropped, vec![path.clone()]);
        assert!(outcome.ready.is_empty());

        f.locks.release(&path);
        assert!(f.tracker.tick().ready.is_empty());
    }

    #[test]
    fn test_renotify_does_not_reset_first_seen() {
        let f = fixture(5);
        let path = f.file("growing.log");
        f.locks.lock(&path);

        f.tracker.notify(&path);
        f.clock.advance(Duration::from_secs(4));
        assert!(!f.tracker.notify(&path));
        f.clock.advance(Duration::from_secs(2));

        assert_eq!(f.tracker.tick().dropped.len(), 1);
    }

    #[test]
    fn test_missing_or_directory_paths_are_ignored() {
        let f = fixture(30);
        let dir = f.temp_dir.path().join("sub");
        fs::create_dir(&dir).unwrap();

        assert!(!f.tracker.notify(&dir));
        assert!(!f.tracker.notify(&f.temp_dir.path().join("ghost.txt")));
        assert_eq!(f.tracker.pending_count(), 0);
    }

    #[test]
    fn test_vanished_file_is_forgotten() {
        let f = fixture(30);
        let path = f.file("temp.dat");
        f.tracker.notify(&path);
        fs::remove_file(&path).unwrap();

        let outcome = f.tracker.tick();
        assert!(outcome.ready.is_empty());
        assert!(outcome.dropped.is_empty());
        assert_eq!(f.tracker.pending_count(), 0);
    }

    #[test]
    fn test_observe_uses_event_path() {
        let f = fixture(30);
        let path = f.file("renamed.pdf");
        let event = ChangeEvent {
            path: path.clone(),
            kind: ChangeKind::RenamedTo,
        };

        assert!(f.tracker.observe(&event));
        assert!(f.tracker.is_pending(&path));
    }

    #[test]
    fn test_set_max_wait_applies_to_tracked_files() {
        let f = fixture(60);
        let path = f.file("slow.bin");
        f.locks.lock(&path);
        f.tracker.notify(&path);
        f.clock.advance(Duration::from_secs(11));

        assert!(f.tracker.tick().dropped.is_empty());
        f.tracker.set_max_wait(Duration::from_secs(10));
        assert_eq!(f.tracker.tick().dropped.len(), 1);
    }
}
