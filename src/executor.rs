/// File operations that carry out move plans.
///
/// This module performs Move, Copy, Rename and Delete, resolving destination
/// conflicts at execution time according to the plan's [`ConflictPolicy`].
/// Every call produces exactly one [`LogEntry`]; filesystem errors never
/// escape, they become `Failed` entries carrying the error text.
use crate::history::{LogEntry, OpResult};
use crate::plan::{MovePlan, PlanStatus};
use crate::rule::{ConflictPolicy, RuleAction};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Highest `_N` suffix tried when looking for a free name.
pub const MAX_RENAME_ATTEMPTS: u32 = 1000;

/// Errors raised inside a single operation before it is folded into a log entry.
#[derive(Debug, thiserror::Error)]
enum OperationError {
    #[error("Source file not found")]
    SourceMissing,

    #[error("No free name for {} after {} attempts", .0.display(), MAX_RENAME_ATTEMPTS)]
    NameSpaceExhausted(PathBuf),

    #[error("Cannot derive a new name for {}", .0.display())]
    InvalidRenameTarget(PathBuf),

    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    #[error("Failed to remove existing {}: {source}", path.display())]
    OverwriteFailed { path: PathBuf, source: io::Error },

    #[error("{source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// What conflict resolution decided for a destination.
enum Destination {
    Use(PathBuf),
    Skip(&'static str),
}

/// Applies plans to the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    /// Executes `plan`, records the outcome on it and returns the log entry.
    pub fn apply(&self, plan: &mut MovePlan) -> LogEntry {
        let source = plan.source.path.clone();
        let policy = plan.conflict_policy;

        let entry = match plan.action {
            RuleAction::Move => self.move_file(&source, &plan.target_path, policy),
            RuleAction::Copy => self.copy_file(&source, &plan.target_path, policy),
            RuleAction::Rename => match rename_name(plan) {
                Some(new_name) => self.rename_file(&source, &new_name, policy),
                None => failure(
                    RuleAction::Rename,
                    &source,
                    &plan.target_path,
                    OperationError::InvalidRenameTarget(plan.target_path.clone()),
                ),
            },
            RuleAction::Delete => self.delete_file(&source),
        }
        .with_rule(plan.rule_name(), plan.rule_id());

        plan.status = match entry.result {
            OpResult::Success => PlanStatus::Success,
            OpResult::Skipped => PlanStatus::Skipped,
            OpResult::Failed => PlanStatus::Failed,
        };
        plan.error_message = entry.error_message.clone();
        entry
    }

    /// Applies every selected plan in slice order, calling `on_applied` after each.
    ///
    /// Unselected plans are left `Pending`. A failure never stops the batch.
    pub fn apply_selected<F>(&self, plans: &mut [MovePlan], mut on_applied: F) -> Vec<LogEntry>
    where
        F: FnMut(&MovePlan, &LogEntry),
    {
        let mut entries = Vec::new();
        for plan in plans.iter_mut().filter(|p| p.selected) {
            let entry = self.apply(plan);
            on_applied(plan, &entry);
            entries.push(entry);
        }
        entries
    }

    /// Moves `source` to `target`, creating the target directory as needed.
    pub fn move_file(&self, source: &Path, target: &Path, policy: ConflictPolicy) -> LogEntry {
        self.transfer(RuleAction::Move, source, target, policy)
    }

    /// Copies `source` to `target`. Never undoable.
    pub fn copy_file(&self, source: &Path, target: &Path, policy: ConflictPolicy) -> LogEntry {
        self.transfer(RuleAction::Copy, source, target, policy)
    }

    /// Renames `source` within its directory. Recorded as a Move so it can be undone.
    pub fn rename_file(&self, source: &Path, new_name: &str, policy: ConflictPolicy) -> LogEntry {
        let target = source
            .parent()
            .map(|dir| dir.join(new_name))
            .unwrap_or_else(|| PathBuf::from(new_name));
        self.move_file(source, &target, policy)
    }

    /// Permanently deletes `path`. Never undoable.
    pub fn delete_file(&self, path: &Path) -> LogEntry {
        let result = if !path.is_file() {
            Err(OperationError::SourceMissing)
        } else {
            fs::remove_file(path).map_err(OperationError::from)
        };

        match result {
            Ok(()) => {
                tracing::info!(path = %path.display(), "deleted file");
                LogEntry::success(RuleAction::Delete, path, Path::new(""))
            }
            Err(e) => failure(RuleAction::Delete, path, Path::new(""), e),
        }
    }

    fn transfer(
        &self,
        action: RuleAction,
        source: &Path,
        target: &Path,
        policy: ConflictPolicy,
    ) -> LogEntry {
        match self.try_transfer(action, source, target, policy) {
            Ok(Destination::Use(final_target)) => {
                tracing::info!(
                    action = %action,
                    source = %source.display(),
                    target = %final_target.display(),
                    "file operation succeeded"
                );
                LogEntry::success(action, source, &final_target)
            }
            Ok(Destination::Skip(reason)) => {
                tracing::debug!(source = %source.display(), reason, "file operation skipped");
                LogEntry::skipped(action, source, target, reason)
            }
            Err(e) => failure(action, source, target, e),
        }
    }

    fn try_transfer(
        &self,
        action: RuleAction,
        source: &Path,
        target: &Path,
        policy: ConflictPolicy,
    ) -> Result<Destination, OperationError> {
        if !source.is_file() {
            return Err(OperationError::SourceMissing);
        }
        if is_same_file(source, target) {
            return Ok(Destination::Skip("Source and target are the same file"));
        }

        let final_target = match resolve_destination(target, policy)? {
            Destination::Use(path) => path,
            skip => return Ok(skip),
        };

        if let Some(parent) = final_target.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| OperationError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        match action {
            RuleAction::Copy => {
                fs::copy(source, &final_target)?;
            }
            _ => move_path(source, &final_target)?,
        }
        Ok(Destination::Use(final_target))
    }
}

/// Returns `target` if it is free, otherwise the first free `stem_N.ext`
/// for N in `1..=MAX_RENAME_ATTEMPTS`. `None` when every candidate exists.
///
/// Each call starts counting from 1 again.
pub fn resolve_conflict_path(target: &Path) -> Option<PathBuf> {
    if !target.exists() {
        return Some(target.to_path_buf());
    }
    numbered_candidates(target, "_")
        .take(MAX_RENAME_ATTEMPTS as usize)
        .find(|candidate| !candidate.exists())
}

/// Yields `dir/{stem}{separator}{n}{.ext}` for n = 1, 2, ...
pub(crate) fn numbered_candidates<'a>(
    path: &'a Path,
    separator: &'a str,
) -> impl Iterator<Item = PathBuf> + 'a {
    let directory = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u32..).map(move |n| directory.join(format!("{}{}{}{}", stem, separator, n, extension)))
}

/// Renames `source` to `target`, falling back to copy-and-delete when they
/// live on different filesystems.
pub(crate) fn move_path(source: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(source, target) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(source, target)?;
            fs::remove_file(source)
        }
        other => other,
    }
}

fn resolve_destination(
    target: &Path,
    policy: ConflictPolicy,
) -> Result<Destination, OperationError> {
    if !target.exists() {
        return Ok(Destination::Use(target.to_path_buf()));
    }

    match policy {
        ConflictPolicy::Skip => Ok(Destination::Skip("File already exists")),
        ConflictPolicy::AutoRename => resolve_conflict_path(target)
            .map(Destination::Use)
            .ok_or_else(|| OperationError::NameSpaceExhausted(target.to_path_buf())),
        ConflictPolicy::Overwrite => {
            fs::remove_file(target).map_err(|e| OperationError::OverwriteFailed {
                path: target.to_path_buf(),
                source: e,
            })?;
            Ok(Destination::Use(target.to_path_buf()))
        }
    }
}

/// The new file name for a Rename plan: the rendered directory's last segment
/// plus the source extension.
fn rename_name(plan: &MovePlan) -> Option<String> {
    let base = plan.target_path.parent()?.file_name()?.to_string_lossy();
    if base.is_empty() {
        return None;
    }
    Some(format!("{}{}", base, plan.source.extension))
}

fn is_same_file(source: &Path, target: &Path) -> bool {
    match (fs::canonicalize(source), fs::canonicalize(target)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn failure(action: RuleAction, source: &Path, target: &Path, error: OperationError) -> LogEntry {
    tracing::error!(
        action = %action,
        source = %source.display(),
        error = %error,
        "file operation failed"
    );
    LogEntry::failed(action, source, target, &error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;
    use crate::snapshot::FileSnapshot;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(path, content).expect("Failed to write test file");
    }

    fn plan_for(source: &Path, target: &Path, action: RuleAction, policy: ConflictPolicy) -> MovePlan {
        let snapshot = FileSnapshot::capture(source).expect("capture failed");
        let rule = Rule {
            name: "Test".to_string(),
            action,
            ..Rule::default()
        };
        MovePlan::new(snapshot, target.to_path_buf(), &rule, policy, target.exists())
    }

    #[test]
    fn test_move_creates_target_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("source.txt");
        let target = temp_dir.path().join("target").join("source.txt");
        write(&source, "test content");

        let entry = Executor::new().move_file(&source, &target, ConflictPolicy::AutoRename);

        assert_eq!(entry.result, OpResult::Success);
        assert!(entry.undoable);
        assert!(target.exists());
        assert!(!source.exists());
    }

    #[test]
    fn test_move_missing_source_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let entry = Executor::new().move_file(
            &temp_dir.path().join("missing.txt"),
            &temp_dir.path().join("out.txt"),
            ConflictPolicy::AutoRename,
        );

        assert_eq!(entry.result, OpResult::Failed);
        assert_eq!(entry.error_message.as_deref(), Some("Source file not found"));
        assert!(!entry.undoable);
    }

    #[test]
    fn test_move_conflict_auto_rename() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("source.txt");
        let target = temp_dir.path().join("target.txt");
        write(&source, "source content");
        write(&target, "existing content");

        let entry = Executor::new().move_file(&source, &target, ConflictPolicy::AutoRename);

        assert_eq!(entry.result, OpResult::Success);
        assert_eq!(entry.target_path, temp_dir.path().join("target_1.txt"));
        assert_eq!(fs::read_to_string(&target).unwrap(), "existing content");
        assert_eq!(fs::read_to_string(&entry.target_path).unwrap(), "source content");
    }

    #[test]
    fn test_move_conflict_skip() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("source.txt");
        let target = temp_dir.path().join("target.txt");
        write(&source, "source content");
        write(&target, "existing content");

        let entry = Executor::new().move_file(&source, &target, ConflictPolicy::Skip);

        assert_eq!(entry.result, OpResult::Skipped);
        assert!(!entry.undoable);
        assert!(source.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "existing content");
    }

    #[test]
    fn test_move_conflict_overwrite() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("source.txt");
        let target = temp_dir.path().join("target.txt");
        write(&source, "source content");
        write(&target, "existing content");

        let entry = Executor::new().move_file(&source, &target, ConflictPolicy::Overwrite);

        assert_eq!(entry.result, OpResult::Success);
        assert_eq!(entry.target_path, target);
        assert_eq!(fs::read_to_string(&target).unwrap(), "source content");
        assert!(!source.exists());
    }

    #[test]
    fn test_move_onto_itself_is_skipped() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("same.txt");
        write(&source, "keep me");

        let entry = Executor::new().move_file(&source, &source, ConflictPolicy::Overwrite);

        assert_eq!(entry.result, OpResult::Skipped);
        assert_eq!(fs::read_to_string(&source).unwrap(), "keep me");
    }

    #[test]
    fn test_copy_is_never_undoable() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("source.txt");
        let target = temp_dir.path().join("copy.txt");
        write(&source, "test content");

        let entry = Executor::new().copy_file(&source, &target, ConflictPolicy::AutoRename);

        assert_eq!(entry.result, OpResult::Success);
        assert!(!entry.undoable);
        assert!(source.exists());
        assert!(target.exists());
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("todelete.txt");
        write(&path, "delete me");

        let entry = Executor::new().delete_file(&path);

        assert_eq!(entry.result, OpResult::Success);
        assert!(!entry.undoable);
        assert!(!path.exists());
    }

    #[test]
    fn test_delete_missing_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let entry = Executor::new().delete_file(&temp_dir.path().join("ghost.txt"));
        assert_eq!(entry.result, OpResult::Failed);
    }

    #[test]
    fn test_rename_file_stays_in_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("IMG_0001.jpg");
        write(&source, "pixels");

        let entry = Executor::new().rename_file(&source, "holiday.jpg", ConflictPolicy::AutoRename);

        assert_eq!(entry.result, OpResult::Success);
        assert_eq!(entry.action, RuleAction::Move);
        assert!(entry.undoable);
        assert!(temp_dir.path().join("holiday.jpg").exists());
    }

    #[test]
    fn test_apply_rename_plan_uses_rendered_name() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("scan.pdf");
        write(&source, "pages");
        let rendered = temp_dir.path().join("invoice_2025-01-02").join("scan.pdf");

        let mut plan = plan_for(&source, &rendered, RuleAction::Rename, ConflictPolicy::AutoRename);
        let entry = Executor::new().apply(&mut plan);

        assert_eq!(entry.result, OpResult::Success);
        assert_eq!(entry.target_path, temp_dir.path().join("invoice_2025-01-02.pdf"));
        assert_eq!(plan.status, PlanStatus::Success);
    }

    #[test]
    fn test_apply_records_status_and_rule() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        let target = temp_dir.path().join("out").join("a.txt");
        write(&source, "x");

        let mut plan = plan_for(&source, &target, RuleAction::Move, ConflictPolicy::Skip);
        fs::remove_file(&source).unwrap();
        let entry = Executor::new().apply(&mut plan);

        assert_eq!(entry.rule_name, "Test");
        assert_eq!(entry.rule_id, plan.rule_id());
        assert_eq!(plan.status, PlanStatus::Failed);
        assert_eq!(plan.error_message.as_deref(), Some("Source file not found"));
    }

    #[test]
    fn test_conflict_rechecked_at_execution() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        let target = temp_dir.path().join("out").join("a.txt");
        write(&source, "new");

        let mut plan = plan_for(&source, &target, RuleAction::Move, ConflictPolicy::Skip);
        assert!(!plan.has_conflict);
        write(&target, "arrived later");

        let entry = Executor::new().apply(&mut plan);
        assert_eq!(entry.result, OpResult::Skipped);
        assert_eq!(plan.status, PlanStatus::Skipped);
    }

    #[test]
    fn test_apply_selected_in_order_skipping_unselected() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let out = temp_dir.path().join("out");
        let first = temp_dir.path().join("first").join("doc.txt");
        let second = temp_dir.path().join("second").join("doc.txt");
        let third = temp_dir.path().join("third.txt");
        write(&first, "first");
        write(&second, "second");
        write(&third, "third");

        let mut plans = vec![
            plan_for(&first, &out.join("doc.txt"), RuleAction::Move, ConflictPolicy::AutoRename),
            plan_for(&second, &out.join("doc.txt"), RuleAction::Move, ConflictPolicy::AutoRename),
            plan_for(&third, &out.join("third.txt"), RuleAction::Move, ConflictPolicy::AutoRename),
        ];
        plans[2].selected = false;

        let mut seen = Vec::new();
        let entries = Executor::new().apply_selected(&mut plans, |plan, _| seen.push(plan.id));

        assert_eq!(entries.len(), 2);
        assert_eq!(seen, vec![plans[0].id, plans[1].id]);
        assert_eq!(fs::read_to_string(out.join("doc.txt")).unwrap(), "first");
        assert_eq!(fs::read_to_string(out.join("doc_1.txt")).unwrap(), "second");
        assert_eq!(plans[2].status, PlanStatus::Pending);
        assert!(third.exists());
    }

    #[test]
    fn test_resolve_conflict_path_free_target() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let target = temp_dir.path().join("free.txt");
        assert_eq!(resolve_conflict_path(&target), Some(target));
    }

    #[test]
    fn test_resolve_conflict_path_skips_taken_suffixes() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let target = temp_dir.path().join("target.txt");
        write(&target, "0");
        write(&temp_dir.path().join("target_1.txt"), "1");

        assert_eq!(
            resolve_conflict_path(&target),
            Some(temp_dir.path().join("target_2.txt"))
        );
    }

    #[test]
    fn test_resolve_conflict_path_is_stateless() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let target = temp_dir.path().join("report.pdf");
        write(&target, "0");

        let first = resolve_conflict_path(&target);
        let second = resolve_conflict_path(&target);
        assert_eq!(first, second);
        assert_eq!(first, Some(temp_dir.path().join("report_1.pdf")));
    }

    #[test]
    fn test_resolve_conflict_path_without_extension() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let target = temp_dir.path().join("Makefile");
        write(&target, "all:");

        assert_eq!(
            resolve_conflict_path(&target),
            Some(temp_dir.path().join("Makefile_1"))
        );
    }

    #[test]
    fn test_resolve_conflict_path_exhausted() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let target = temp_dir.path().join("busy.txt");
        write(&target, "0");
        for n in 1..=MAX_RENAME_ATTEMPTS {
            write(&temp_dir.path().join(format!("busy_{}.txt", n)), "x");
        }

        assert_eq!(resolve_conflict_path(&target), None);
    }
}
