//! Point-in-time file metadata.
//!
//! A [`FileSnapshot`] is captured once and never refreshed. If a file has to
//! be reprocessed, capture a new snapshot; staleness is not detected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Immutable metadata captured for a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// Full path of the file at capture time.
    pub path: PathBuf,
    /// File name including extension.
    pub name: String,
    /// Extension with its leading dot (e.g. `.pdf`), or empty.
    pub extension: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Directory containing the file.
    pub parent_dir: PathBuf,
}

impl FileSnapshot {
    /// Reads metadata for `path` from disk.
    ///
    /// Filesystems that do not record a birth time report the modification
    /// time as the creation time.
    pub fn capture(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let modified: DateTime<Utc> = metadata.modified()?.into();
        let created: DateTime<Utc> = metadata
            .created()
            .map(Into::into)
            .unwrap_or(modified);

        Ok(Self::new(path, metadata.len(), created, modified))
    }

    /// Builds a snapshot from already-known metadata, deriving the name,
    /// extension and parent directory from `path`.
    pub fn new(
        path: impl Into<PathBuf>,
        size_bytes: u64,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let parent_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        Self {
            path,
            name,
            extension,
            size_bytes,
            created_at,
            modified_at,
            parent_dir,
        }
    }

    /// The file name without its extension.
    pub fn stem(&self) -> &str {
        match self.extension.len() {
            0 => &self.name,
            n if self.name.len() >= n => &self.name[..self.name.len() - n],
            _ => &self.name,
        }
    }

    /// The extension without its leading dot.
    pub fn bare_extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_derives_name_parts() {
        let now = Utc::now();
        let snapshot = FileSnapshot::new("/downloads/invoice_2024.pdf", 5000, now, now);

        assert_eq!(snapshot.name, "invoice_2024.pdf");
        assert_eq!(snapshot.extension, ".pdf");
        assert_eq!(snapshot.stem(), "invoice_2024");
        assert_eq!(snapshot.bare_extension(), "pdf");
        assert_eq!(snapshot.parent_dir, PathBuf::from("/downloads"));
    }

    #[test]
    fn test_new_without_extension() {
        let now = Utc::now();
        let snapshot = FileSnapshot::new("/downloads/README", 1, now, now);

        assert_eq!(snapshot.extension, "");
        assert_eq!(snapshot.stem(), "README");
    }

    #[test]
    fn test_only_last_extension_is_split() {
        let now = Utc::now();
        let snapshot = FileSnapshot::new("/tmp/backup.tar.gz", 1, now, now);

        assert_eq!(snapshot.extension, ".gz");
        assert_eq!(snapshot.stem(), "backup.tar");
    }

    #[test]
    fn test_capture_reads_size() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file_path = temp_dir.path().join("notes.txt");
        fs::write(&file_path, "twelve bytes").expect("Failed to write test file");

        let snapshot = FileSnapshot::capture(&file_path).expect("capture failed");

        assert_eq!(snapshot.size_bytes, 12);
        assert_eq!(snapshot.name, "notes.txt");
        assert_eq!(snapshot.parent_dir, temp_dir.path());
    }

    #[test]
    fn test_capture_rejects_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        assert!(FileSnapshot::capture(temp_dir.path()).is_err());
    }

    #[test]
    fn test_capture_missing_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        assert!(FileSnapshot::capture(&temp_dir.path().join("gone.bin")).is_err());
    }
}
