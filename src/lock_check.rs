//! Detects files that another process is still holding.
//!
//! On Windows a browser writing a download holds the file without sharing,
//! so opening it fails with a sharing violation. On Unix-like systems
//! `fs2` uses advisory `flock`, which writers that never call `flock` do not
//! take. [`ExclusiveLockCheck`] therefore also treats a file modified within
//! its quiet period as still being written.

use fs2::FileExt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Quiet period used by the production lock check.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);

/// Answers whether a file is currently in use elsewhere.
///
/// Implementations must return `false` for a path that no longer exists.
pub trait LockCheck: Send + Sync {
    fn is_locked(&self, path: &Path) -> bool;
}

/// Probes a file by trying to take an exclusive lock on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExclusiveLockCheck {
    quiet_period: Duration,
}

impl ExclusiveLockCheck {
    /// Lock test only; modification times are ignored.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also reports a file as locked while its modification time is less
    /// than `quiet_period` old.
    pub fn with_quiet_period(quiet_period: Duration) -> Self {
        Self { quiet_period }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    fn recently_modified(&self, file: &File) -> bool {
        if self.quiet_period.is_zero() {
            return false;
        }
        file.metadata()
            .and_then(|metadata| metadata.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age < self.quiet_period)
    }
}

impl LockCheck for ExclusiveLockCheck {
    fn is_locked(&self, path: &Path) -> bool {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => return open_error_means_locked(&e),
        };

        if self.recently_modified(&file) {
            tracing::trace!(path = %path.display(), "file was modified recently");
            return true;
        }

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(e) => {
                tracing::trace!(path = %path.display(), error = %e, "file is locked");
                true
            }
        }
    }
}

fn open_error_means_locked(error: &io::Error) -> bool {
    match error.kind() {
        io::ErrorKind::NotFound => false,
        io::ErrorKind::PermissionDenied => true,
        _ => is_sharing_violation(error),
    }
}

#[cfg(windows)]
fn is_sharing_violation(error: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    matches!(error.raw_os_error(), Some(32) | Some(33))
}

#[cfg(not(windows))]
fn is_sharing_violation(_error: &io::Error) -> bool {
    false
}
