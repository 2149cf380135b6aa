/// Bounded, reversible history of executed moves.
///
/// The ledger is a fixed-capacity deque: undo pops the newest entry, while
/// pushing past capacity evicts the oldest one. Only undoable entries (a
/// successful Move) are accepted.
///
/// # Edge Cases Handled
///
/// * **Moved file gone**: the entry is dropped and undo reports failure
/// * **Original location occupied**: the file is restored as
///   `name_restored_N.ext` and the entry's source path is rewritten
/// * **Move back fails**: the entry goes back on top so undo can be retried
use crate::executor::{MAX_RENAME_ATTEMPTS, move_path, numbered_candidates};
use crate::history::LogEntry;
use crate::rule::RuleAction;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Result of a successful undo.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoReport {
    /// The entry as restored; `source_path` is where the file now lives.
    pub entry: LogEntry,
    /// True when the original path was taken and a `_restored_N` name was used.
    pub renamed: bool,
}

/// What happened to the newest entry on an undo attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoOutcome {
    /// Nothing to undo.
    Empty,
    Restored(UndoReport),
    /// The entry cannot be undone any more and was removed.
    Discarded(LogEntry),
    /// Moving the file back failed; the entry is back on top.
    Retained { entry: LogEntry, error: String },
}

struct LedgerState {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LedgerState {
    fn evict_overflow(&mut self) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            evicted += 1;
        }
        evicted
    }
}

/// Thread-safe undo stack with oldest-first eviction.
pub struct UndoLedger {
    state: Mutex<LedgerState>,
}

impl UndoLedger {
    /// Creates an empty ledger holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Records `entry` if it is undoable. Returns whether it was accepted.
    pub fn push(&self, entry: LogEntry) -> bool {
        if !entry.undoable {
            return false;
        }

        let mut state = self.lock();
        state.entries.push_back(entry);
        let evicted = state.evict_overflow();
        if evicted > 0 {
            tracing::debug!(evicted, capacity = state.capacity, "undo history trimmed");
        }
        true
    }

    /// Undoes the most recent move. Returns `false` when there is nothing to
    /// undo, the entry is stale, or the move back failed.
    pub fn undo_last(&self) -> bool {
        matches!(self.undo(), UndoOutcome::Restored(_))
    }

    /// Like [`undo_last`](Self::undo_last) but reports what happened.
    pub fn undo(&self) -> UndoOutcome {
        let Some(mut entry) = self.lock().entries.pop_back() else {
            return UndoOutcome::Empty;
        };

        if entry.action != RuleAction::Move {
            tracing::warn!(id = %entry.id, action = %entry.action, "cannot undo non-move entry");
            return UndoOutcome::Discarded(entry);
        }

        if !entry.target_path.is_file() {
            tracing::warn!(
                target = %entry.target_path.display(),
                "cannot undo: moved file no longer exists"
            );
            return UndoOutcome::Discarded(entry);
        }

        match restore(&entry) {
            Ok(restored_path) => {
                let renamed = restored_path != entry.source_path;
                entry.source_path = restored_path;
                tracing::info!(
                    from = %entry.target_path.display(),
                    to = %entry.source_path.display(),
                    "undo successful"
                );
                UndoOutcome::Restored(UndoReport { entry, renamed })
            }
            Err(e) => {
                tracing::error!(
                    target = %entry.target_path.display(),
                    error = %e,
                    "undo failed, entry kept for retry"
                );
                self.lock().entries.push_back(entry.clone());
                UndoOutcome::Retained {
                    entry,
                    error: e.to_string(),
                }
            }
        }
    }

    /// The entry the next undo would act on.
    pub fn peek(&self) -> Option<LogEntry> {
        self.lock().entries.back().cloned()
    }

    /// Discards all history.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.lock().entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.can_undo()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Changes the capacity, evicting the oldest entries if it shrank.
    pub fn set_capacity(&self, capacity: usize) {
        let mut state = self.lock();
        state.capacity = capacity;
        state.evict_overflow();
    }

    /// Entries newest first.
    pub fn history(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().rev().cloned().collect()
    }
}

/// Moves the file back, picking a `_restored_N` name when the original
/// location is taken. Returns where the file ended up.
fn restore(entry: &LogEntry) -> io::Result<PathBuf> {
    let destination = if entry.source_path.exists() {
        restored_path(&entry.source_path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!(
                    "no free restore name for {} after {} attempts",
                    entry.source_path.display(),
                    MAX_RENAME_ATTEMPTS
                ),
            )
        })?
    } else {
        entry.source_path.clone()
    };

    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    move_path(&entry.target_path, &destination)?;
    Ok(destination)
}

fn restored_path(original: &Path) -> Option<PathBuf> {
    numbered_candidates(original, "_restored_")
        .take(MAX_RENAME_ATTEMPTS as usize)
        .find(|candidate| !candidate.exists())
}
