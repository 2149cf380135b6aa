//! Application settings and the ignore filter derived from them.
//!
//! Settings are read from a TOML file. Every key is optional:
//!
//! ```toml
//! watched_folders = ["/home/me/Downloads"]
//! max_lock_wait_seconds = 30
//! undo_capacity = 100
//! conflict_policy = "AutoRename"
//! tick_interval_ms = 2000
//! recursive_scan = false
//! log_retention_days = 90
//! include_hidden = false
//! ignore_patterns = ["*.crdownload", "*.part", "*.tmp", "*.download"]
//! ```
//!
//! Settings are never global. They are loaded once and passed to whatever
//! needs them; a running organizer picks up changes through an explicit
//! reload.

use crate::error::{DropsortError, Result};
use crate::render::downloads_dir;
use crate::rule::ConflictPolicy;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOCAL_CONFIG_FILE: &str = ".dropsortrc.toml";

/// Patterns that mark partially downloaded or scratch files.
pub const DEFAULT_IGNORE_PATTERNS: [&str; 4] = ["*.crdownload", "*.part", "*.tmp", "*.download"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folders to watch. Empty means the platform Downloads directory.
    pub watched_folders: Vec<PathBuf>,
    /// How long a file may stay locked before the watcher gives up on it.
    pub max_lock_wait_seconds: u64,
    /// Maximum number of moves kept for undo.
    pub undo_capacity: usize,
    pub conflict_policy: ConflictPolicy,
    /// Interval between stabilization checks.
    pub tick_interval_ms: u64,
    pub recursive_scan: bool,
    /// Log entries older than this are purged on startup.
    pub log_retention_days: u32,
    pub include_hidden: bool,
    pub ignore_patterns: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watched_folders: Vec::new(),
            max_lock_wait_seconds: 30,
            undo_capacity: 100,
            conflict_policy: ConflictPolicy::AutoRename,
            tick_interval_ms: 2000,
            recursive_scan: false,
            log_retention_days: 90,
            include_hidden: false,
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Settings {
    /// Loads settings, falling back to defaults.
    ///
    /// Lookup order:
    /// 1. `config_path`, if given (must exist)
    /// 2. `.dropsortrc.toml` in the current directory
    /// 3. `dropsort/config.toml` in the platform config directory
    /// 4. Built-in defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            return Self::load_from_file(&user_config);
        }

        Ok(Self::default())
    }

    /// Loads settings from `path`, which must exist.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DropsortError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| DropsortError::io(path, e))?;
        let settings: Self = toml::from_str(&content).map_err(|e| DropsortError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Writes settings as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| DropsortError::io(parent, e))?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| DropsortError::Serialization {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(path, content).map_err(|e| DropsortError::io(path, e))
    }

    /// `<config_dir>/dropsort/config.toml`, if the platform has a config dir.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dropsort").join("config.toml"))
    }

    /// Folders to watch or scan when none are given explicitly.
    pub fn folders(&self) -> Vec<PathBuf> {
        if self.watched_folders.is_empty() {
            vec![downloads_dir()]
        } else {
            self.watched_folders.clone()
        }
    }

    pub fn max_lock_wait(&self) -> Duration {
        Duration::from_secs(self.max_lock_wait_seconds)
    }

    /// Tick interval, never below 10 ms.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(10))
    }

    /// Compiles the ignore patterns.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGlobPattern` naming the first pattern that fails.
    pub fn compile(&self) -> Result<IgnoreFilter> {
        IgnoreFilter::new(&self.ignore_patterns, self.include_hidden)
    }
}

/// Decides which files are left alone by scans and the watcher.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    include_hidden: bool,
    patterns: Vec<Pattern>,
}

impl IgnoreFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S], include_hidden: bool) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Pattern::new(pattern).map_err(|e| DropsortError::InvalidGlobPattern {
                    pattern: pattern.to_string(),
                    reason: e.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            include_hidden,
            patterns,
        })
    }

    /// A filter that only hides dot-files.
    pub fn hidden_only() -> Self {
        Self {
            include_hidden: false,
            patterns: Vec::new(),
        }
    }

    /// A filter that accepts everything.
    pub fn allow_all() -> Self {
        Self {
            include_hidden: true,
            patterns: Vec::new(),
        }
    }

    pub fn include_hidden(&self) -> bool {
        self.include_hidden
    }

    /// Checks, in order: the hidden-file policy, then each glob against the
    /// file name and the full path.
    pub fn should_include(&self, path: &Path) -> bool {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if !self.include_hidden && file_name.starts_with('.') {
            return false;
        }

        !self
            .patterns
            .iter()
            .any(|pattern| pattern.matches(&file_name) || pattern.matches_path(path))
    }
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        Self::hidden_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.max_lock_wait_seconds, 30);
        assert_eq!(settings.undo_capacity, 100);
        assert_eq!(settings.conflict_policy, ConflictPolicy::AutoRename);
        assert!(!settings.include_hidden);
        assert_eq!(settings.ignore_patterns.len(), 4);
    }

    #[test]
    fn test_partial_file_uses_defaults_for_missing_keys() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "undo_capacity = 5\nconflict_policy = \"Skip\"\nwatched_folders = [\"/tmp/in\"]\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).expect("settings should load");
        assert_eq!(settings.undo_capacity, 5);
        assert_eq!(settings.conflict_policy, ConflictPolicy::Skip);
        assert_eq!(settings.folders(), vec![PathBuf::from("/tmp/in")]);
        assert_eq!(settings.max_lock_wait(), Duration::from_secs(30));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = Settings::load(Some(&temp_dir.path().join("absent.toml")));
        assert!(matches!(result, Err(DropsortError::ConfigNotFound(_))));
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "undo_capacity = \"lots\"").unwrap();

        let result = Settings::load(Some(&path));
        assert!(matches!(result, Err(DropsortError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("nested").join("config.toml");
        let settings = Settings {
            tick_interval_ms: 500,
            include_hidden: true,
            ..Settings::default()
        };

        settings.save(&path).expect("save should succeed");
        assert_eq!(Settings::load_from_file(&path).unwrap(), settings);
    }

    #[test]
    fn test_empty_folders_fall_back_to_downloads() {
        assert_eq!(Settings::default().folders(), vec![downloads_dir()]);
    }

    #[test]
    fn test_tick_interval_has_a_floor() {
        let settings = Settings {
            tick_interval_ms: 0,
            ..Settings::default()
        };
        assert_eq!(settings.tick_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_default_filter_skips_partial_downloads() {
        let filter = Settings::default().compile().unwrap();

        assert!(!filter.should_include(Path::new("/dl/movie.mkv.crdownload")));
        assert!(!filter.should_include(Path::new("/dl/setup.exe.part")));
        assert!(!filter.should_include(Path::new("/dl/scratch.tmp")));
        assert!(filter.should_include(Path::new("/dl/movie.mkv")));
    }

    #[test]
    fn test_hidden_files_excluded_unless_enabled() {
        let hidden = IgnoreFilter::hidden_only();
        assert!(!hidden.should_include(Path::new("/dl/.DS_Store")));
        assert!(hidden.should_include(Path::new("/dl/report.pdf")));

        assert!(IgnoreFilter::allow_all().should_include(Path::new("/dl/.DS_Store")));
    }

    #[test]
    fn test_glob_character_class() {
        let filter = IgnoreFilter::new(&["[0-9]*.log"], false).unwrap();

        assert!(!filter.should_include(Path::new("1debug.log")));
        assert!(filter.should_include(Path::new("debug.log")));
    }

    #[test]
    fn test_glob_directory_pattern_matches_full_path() {
        let filter = IgnoreFilter::new(&["**/cache/**"], false).unwrap();

        assert!(!filter.should_include(Path::new("app/cache/data.bin")));
        assert!(filter.should_include(Path::new("app/my_cache/data.bin")));
    }

    #[test]
    fn test_invalid_glob_returns_error() {
        let result = IgnoreFilter::new(&["[invalid"], false);
        assert!(matches!(
            result,
            Err(DropsortError::InvalidGlobPattern { ref pattern, .. }) if pattern == "[invalid"
        ));
    }
}
