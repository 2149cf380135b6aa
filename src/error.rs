//! Error types for the boundary layers of dropsort.
//!
//! The sorting core itself never returns these: matching and rendering are
//! infallible, the executor folds I/O failures into log entries, and the undo
//! ledger reports failure as `false`. Only configuration, the persistence
//! stores and watcher registration surface a `DropsortError`.

use std::path::PathBuf;

/// Result alias used by the boundary layers.
pub type Result<T> = std::result::Result<T, DropsortError>;

#[derive(Debug, thiserror::Error)]
pub enum DropsortError {
    /// An explicitly requested configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// TOML in a settings or rules file could not be parsed.
    #[error("Invalid configuration in {}: {reason}", path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    /// An ignore pattern is not a valid glob.
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlobPattern { pattern: String, reason: String },

    /// Reading or writing a store file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A log line or rules document could not be (de)serialized.
    #[error("Serialization failed for {}: {reason}", path.display())]
    Serialization { path: PathBuf, reason: String },

    /// The watch folder could not be registered with the notification source.
    #[error("Failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The folder handed to a watcher or scan does not exist.
    #[error("Folder does not exist: {}", .0.display())]
    MissingFolder(PathBuf),
}

impl DropsortError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
