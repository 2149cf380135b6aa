//! Destination path rendering.
//!
//! A rule's `target_template` names a destination *directory* using macros:
//!
//! | Macro                | Replacement                                  |
//! |----------------------|----------------------------------------------|
//! | `{Category}`         | the rule's category                          |
//! | `{Ext}`              | file extension without the dot               |
//! | `{YYYY}` `{MM}` `{DD}` | current local date parts                   |
//! | `{Today}`            | current local date as `yyyy-MM-dd`           |
//! | `{SourceFolderName}` | last segment of the source folder            |
//! | `{FileName}`         | file name without extension                  |
//! | `{Downloads}`        | the platform Downloads directory             |
//!
//! Unknown macros stay as literal text. The original file name is appended
//! to the rendered directory. Rendering never touches the filesystem.

use crate::rule::Rule;
use crate::snapshot::FileSnapshot;
use chrono::{Datelike, Local, NaiveDate};
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

/// Renders rule templates into destination paths.
#[derive(Debug, Clone)]
pub struct PathRenderer {
    downloads_dir: PathBuf,
}

impl PathRenderer {
    /// Creates a renderer that resolves `{Downloads}` to the platform
    /// Downloads directory.
    pub fn new() -> Self {
        Self::with_downloads_dir(downloads_dir())
    }

    /// Creates a renderer with an explicit `{Downloads}` directory.
    pub fn with_downloads_dir(downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloads_dir: downloads_dir.into(),
        }
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Renders `template` for `snapshot` using today's local date.
    pub fn render(
        &self,
        template: &str,
        snapshot: &FileSnapshot,
        rule: &Rule,
        source_folder: &Path,
    ) -> PathBuf {
        self.render_on(
            template,
            snapshot,
            rule,
            source_folder,
            Local::now().date_naive(),
        )
    }

    /// Renders `template` as if today were `date`.
    pub fn render_on(
        &self,
        template: &str,
        snapshot: &FileSnapshot,
        rule: &Rule,
        source_folder: &Path,
        date: NaiveDate,
    ) -> PathBuf {
        let directory = self.expand(template, snapshot, rule, source_folder, date);
        join_file_name(&directory, source_folder, &snapshot.name)
    }

    /// Substitutes every macro in `template` in a single left-to-right pass,
    /// so replacement text is never re-expanded.
    pub fn expand(
        &self,
        template: &str,
        snapshot: &FileSnapshot,
        rule: &Rule,
        source_folder: &Path,
        date: NaiveDate,
    ) -> String {
        let mut rendered = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after_open = &rest[open + 1..];

            let replacement = after_open.find('}').and_then(|close| {
                self.macro_value(&after_open[..close], snapshot, rule, source_folder, date)
                    .map(|value| (value, close))
            });

            match replacement {
                Some((value, close)) => {
                    rendered.push_str(&value);
                    rest = &after_open[close + 1..];
                }
                None => {
                    rendered.push('{');
                    rest = after_open;
                }
            }
        }
        rendered.push_str(rest);
        rendered
    }

    fn macro_value(
        &self,
        name: &str,
        snapshot: &FileSnapshot,
        rule: &Rule,
        source_folder: &Path,
        date: NaiveDate,
    ) -> Option<String> {
        let value = match name {
            "Category" => rule.category.clone(),
            "Ext" => snapshot.bare_extension().to_string(),
            "YYYY" => format!("{:04}", date.year()),
            "MM" => format!("{:02}", date.month()),
            "DD" => format!("{:02}", date.day()),
            "Today" => date.format("%Y-%m-%d").to_string(),
            "SourceFolderName" => source_folder
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            "FileName" => snapshot.stem().to_string(),
            "Downloads" => self.downloads_dir.to_string_lossy().to_string(),
            _ => return None,
        };
        Some(value)
    }
}

impl Default for PathRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the platform Downloads directory, falling back to `~/Downloads`.
pub fn downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

/// True for `/x`, `\x` and drive-qualified `C:\x` / `C:/x` strings.
///
/// Checked textually so templates written for another platform keep their
/// meaning.
fn is_rooted(path: &str) -> bool {
    let bytes = path.as_bytes();
    match bytes {
        [b'/' | b'\\', ..] => true,
        [drive, b':', b'/' | b'\\', ..] => drive.is_ascii_alphabetic(),
        _ => false,
    }
}

fn join_file_name(directory: &str, source_folder: &Path, file_name: &str) -> PathBuf {
    let mut directory = if is_rooted(directory) || Path::new(directory).is_absolute() {
        directory.to_string()
    } else {
        source_folder.join(directory).to_string_lossy().to_string()
    };

    if !directory.ends_with(['/', '\\']) {
        directory.push(MAIN_SEPARATOR);
    }
    directory.push_str(file_name);
    PathBuf::from(directory)
}
