/// Operation log entries and their on-disk store.
///
/// Every executed plan produces exactly one [`LogEntry`], whatever its
/// outcome. The [`LogStore`] keeps them as JSON lines so a single entry can be
/// appended without rewriting the file; undo rewrites the whole file when it
/// changes an entry.
use crate::error::{DropsortError, Result};
use crate::rule::RuleAction;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Outcome of one executed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpResult {
    Success,
    Skipped,
    Failed,
}

impl fmt::Display for OpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpResult::Success => "Success",
            OpResult::Skipped => "Skipped",
            OpResult::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Record of one executed file operation.
///
/// Only a successful Move is undoable. The undo ledger may rewrite
/// `source_path` when it has to restore under a different name; nothing else
/// changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source_path: PathBuf,
    /// Empty for deletions.
    pub target_path: PathBuf,
    pub rule_name: String,
    pub rule_id: Option<Uuid>,
    pub action: RuleAction,
    pub result: OpResult,
    pub error_message: Option<String>,
    pub undoable: bool,
}

impl LogEntry {
    /// A successful operation. Undoable exactly when `action` is Move.
    pub fn success(action: RuleAction, source: &Path, target: &Path) -> Self {
        Self::build(action, source, target, OpResult::Success, None)
    }

    /// An operation that deliberately left the filesystem untouched.
    pub fn skipped(action: RuleAction, source: &Path, target: &Path, reason: &str) -> Self {
        Self::build(action, source, target, OpResult::Skipped, Some(reason.to_string()))
    }

    /// An operation that failed with `message`.
    pub fn failed(action: RuleAction, source: &Path, target: &Path, message: &str) -> Self {
        Self::build(action, source, target, OpResult::Failed, Some(message.to_string()))
    }

    fn build(
        action: RuleAction,
        source: &Path,
        target: &Path,
        result: OpResult,
        error_message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source_path: source.to_path_buf(),
            target_path: target.to_path_buf(),
            rule_name: "Unknown".to_string(),
            rule_id: None,
            action,
            result,
            error_message,
            undoable: action == RuleAction::Move && result == OpResult::Success,
        }
    }

    /// Attaches the rule that produced this operation.
    pub fn with_rule(mut self, name: &str, id: Option<Uuid>) -> Self {
        self.rule_name = name.to_string();
        self.rule_id = id;
        self
    }

    /// Lowercase extension of the source file, without the dot.
    pub fn extension(&self) -> String {
        self.source_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// Aggregated counts over a window of log entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Successful operations per lowercase extension.
    pub by_extension: BTreeMap<String, usize>,
}

/// Append-only JSON-lines log of executed operations.
///
/// Every write goes through [`LogStore::exclusive`], which pairs an in-process
/// mutex with an advisory lock on a `.lock` file beside the log, so a `watch`
/// process appending and an `undo` process rewriting never interleave.
pub struct LogStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// Held for the duration of one write to the log.
struct WriteGuard<'a> {
    _local: MutexGuard<'a, ()>,
    lock_file: File,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}

impl LogStore {
    /// Opens (without reading) the log at `path`, creating its parent directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| DropsortError::io(parent, e))?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Default location: `<local data dir>/dropsort/log.jsonl`.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dropsort")
            .join("log.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("jsonl.lock")
    }

    fn exclusive(&self) -> Result<WriteGuard<'_>> {
        let local = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| DropsortError::io(&lock_path, e))?;
        FileExt::lock_exclusive(&lock_file).map_err(|e| DropsortError::io(&lock_path, e))?;
        Ok(WriteGuard {
            _local: local,
            lock_file,
        })
    }

    /// Appends one entry.
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        let line = self.serialize(entry)?;

        let _guard = self.exclusive()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DropsortError::io(&self.path, e))?;
        writeln!(file, "{}", line).map_err(|e| DropsortError::io(&self.path, e))
    }

    /// Loads every entry in file order. A missing file is an empty log;
    /// unparseable lines are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<LogEntry>> {
        self.read_entries()
    }

    /// Replaces the log with `entries`.
    pub fn save_all(&self, entries: &[LogEntry]) -> Result<()> {
        let _guard = self.exclusive()?;
        self.write_entries(entries)
    }

    /// Reads, edits and rewrites the log while holding the write lock, so
    /// entries appended concurrently are never lost. The log is only
    /// rewritten when `edit` returns `true`.
    pub fn update<F>(&self, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<LogEntry>) -> bool,
    {
        let _guard = self.exclusive()?;
        let mut entries = self.read_entries()?;
        let changed = edit(&mut entries);
        if changed {
            self.write_entries(&entries)?;
        }
        Ok(changed)
    }

    /// Removes entries older than `retention_days`, returning how many went.
    pub fn purge_older_than(&self, retention_days: u32) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let mut removed = 0;
        self.update(|entries| {
            let before = entries.len();
            entries.retain(|e| e.timestamp >= cutoff);
            removed = before - entries.len();
            removed > 0
        })?;

        if removed > 0 {
            tracing::info!(removed, "purged old log entries");
        }
        Ok(removed)
    }

    fn serialize(&self, entry: &LogEntry) -> Result<String> {
        serde_json::to_string(entry).map_err(|e| DropsortError::Serialization {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn read_entries(&self) -> Result<Vec<LogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| DropsortError::io(&self.path, e))?;

        let mut entries = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    line = number + 1,
                    error = %e,
                    "skipping malformed log line"
                ),
            }
        }
        Ok(entries)
    }

    /// Caller must hold the write guard.
    fn write_entries(&self, entries: &[LogEntry]) -> Result<()> {
        let mut content = String::new();
        for entry in entries {
            content.push_str(&self.serialize(entry)?);
            content.push('\n');
        }

        let temp_path = self.path.with_extension("jsonl.tmp");
        fs::write(&temp_path, content).map_err(|e| DropsortError::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| DropsortError::io(&self.path, e))
    }

    /// Newest-first entries, at most `count` of them.
    pub fn recent(&self, count: usize) -> Result<Vec<LogEntry>> {
        let mut entries = self.load_all()?;
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(count);
        Ok(entries)
    }

    /// Counts entries with `from <= timestamp <= to`.
    pub fn statistics(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Statistics> {
        Ok(summarize(
            self.load_all()?
                .iter()
                .filter(|e| e.timestamp >= from && e.timestamp <= to),
        ))
    }
}

/// Aggregates result counts and per-extension successes.
pub fn summarize<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> Statistics {
    let mut stats = Statistics::default();
    for entry in entries {
        stats.total += 1;
        match entry.result {
            OpResult::Success => {
                stats.succeeded += 1;
                *stats.by_extension.entry(entry.extension()).or_insert(0) += 1;
            }
            OpResult::Skipped => stats.skipped += 1,
            OpResult::Failed => stats.failed += 1,
        }
    }
    stats
}
