//! Directory listing for manual scans.

use crate::cancel::CancelToken;
use crate::config::IgnoreFilter;
use crate::error::{DropsortError, Result};
use crate::snapshot::FileSnapshot;
use std::fs::Metadata;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Files found by one scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<FileSnapshot>,
    /// True when the scan stopped early; `files` holds what was found so far.
    pub cancelled: bool,
}

/// Lists the files in `folder`, descending into subfolders when `recursive`.
///
/// Hidden and system entries, and anything the filter rejects, are skipped.
/// A hidden directory is not descended into. Unreadable entries are logged
/// and skipped without failing the scan. A relative `folder` is resolved
/// against the working directory, so every snapshot carries an absolute path.
///
/// # Errors
///
/// Returns `MissingFolder` if `folder` is not a directory.
pub fn list_files(
    folder: &Path,
    recursive: bool,
    filter: &IgnoreFilter,
    cancel: &CancelToken,
) -> Result<ScanOutcome> {
    list_files_with(folder, recursive, filter, cancel, |_| {})
}

/// Like [`list_files`], calling `on_file` for each file as it is found.
pub fn list_files_with<F>(
    folder: &Path,
    recursive: bool,
    filter: &IgnoreFilter,
    cancel: &CancelToken,
    mut on_file: F,
) -> Result<ScanOutcome>
where
    F: FnMut(&FileSnapshot),
{
    let folder = std::path::absolute(folder).map_err(|e| DropsortError::io(folder, e))?;
    let folder = folder.as_path();
    if !folder.is_dir() {
        return Err(DropsortError::MissingFolder(folder.to_path_buf()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden_entry(entry, filter));

    let mut outcome = ScanOutcome::default();
    for entry in walker {
        if cancel.is_cancelled() {
            tracing::debug!(found = outcome.files.len(), "scan cancelled");
            outcome.cancelled = true;
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    path = ?e.path().map(|p| p.display().to_string()),
                    error = %e,
                    "skipping unreadable entry"
                );
                continue;
            }
        };

        if !entry.file_type().is_file() || !filter.should_include(entry.path()) {
            continue;
        }

        match FileSnapshot::capture(entry.path()) {
            Ok(snapshot) => {
                on_file(&snapshot);
                outcome.files.push(snapshot);
            }
            Err(e) => tracing::warn!(
                path = %entry.path().display(),
                error = %e,
                "skipping unreadable file"
            ),
        }
    }

    tracing::debug!(
        folder = %folder.display(),
        files = outcome.files.len(),
        "scan finished"
    );
    Ok(outcome)
}

fn is_hidden_entry(entry: &DirEntry, filter: &IgnoreFilter) -> bool {
    if filter.include_hidden() {
        return false;
    }
    if entry.file_name().to_string_lossy().starts_with('.') {
        return true;
    }
    entry
        .metadata()
        .map(|metadata| has_hidden_attribute(&metadata))
        .unwrap_or(false)
}

#[cfg(windows)]
fn has_hidden_attribute(metadata: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;

    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    metadata.file_attributes() & (FILE_ATTRIBUTE_HIDDEN | FILE_ATTRIBUTE_SYSTEM) != 0
}

#[cfg(not(windows))]
fn has_hidden_attribute(_metadata: &Metadata) -> bool {
    false
}
