/// Built-in file categories and the default rule set derived from them.
///
/// Each category owns an extension allow-list. When no rules file exists yet,
/// [`default_rules`] turns every category into one Move rule targeting
/// `{Downloads}/{Category}/`, in declaration order.
///
/// # Examples
///
/// ```
/// use dropsort::category::Category;
///
/// assert_eq!(Category::for_extension("PDF"), Some(Category::Document));
/// assert_eq!(Category::for_extension(".png"), Some(Category::Image));
/// assert_eq!(Category::for_extension("xyz"), None);
/// ```
use crate::rule::{Rule, RuleAction};

/// Represents a broad file category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Document files (PDF, DOCX, TXT, etc.)
    Document,
    /// Spreadsheet files (XLSX, CSV, ODS, etc.)
    Spreadsheet,
    /// Presentation files (PPTX, ODP, etc.)
    Presentation,
    /// Image files (PNG, JPG, GIF, etc.)
    Image,
    /// Video files (MP4, MKV, AVI, etc.)
    Video,
    /// Audio files (MP3, WAV, FLAC, etc.)
    Audio,
    /// Archive files (ZIP, RAR, 7Z, etc.)
    Archive,
    /// Installer packages (EXE, MSI, DMG, etc.)
    Installer,
    /// Code/Source files (Rust, Python, JavaScript, etc.)
    Code,
    /// Font files (TTF, OTF, WOFF, etc.)
    Font,
}

impl Category {
    /// All categories in default rule priority order.
    pub const ALL: [Category; 10] = [
        Category::Document,
        Category::Spreadsheet,
        Category::Presentation,
        Category::Image,
        Category::Video,
        Category::Audio,
        Category::Archive,
        Category::Installer,
        Category::Code,
        Category::Font,
    ];

    /// Returns the label used for `{Category}` and as the rule name.
    ///
    /// # Examples
    ///
    /// ```
    /// use dropsort::category::Category;
    ///
    /// assert_eq!(Category::Image.label(), "Images");
    /// assert_eq!(Category::Audio.label(), "Audio");
    /// ```
    pub fn label(&self) -> &'static str {
        match self {
            Category::Document => "Documents",
            Category::Spreadsheet => "Spreadsheets",
            Category::Presentation => "Presentations",
            Category::Image => "Images",
            Category::Video => "Videos",
            Category::Audio => "Audio",
            Category::Archive => "Archives",
            Category::Installer => "Installers",
            Category::Code => "Code",
            Category::Font => "Fonts",
        }
    }

    /// Returns the lowercase extensions (without dot) belonging to this category.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Category::Document => &[
                "pdf", "txt", "doc", "docx", "html", "htm", "md", "rtf", "odt", "epub",
            ],
            Category::Spreadsheet => &["csv", "xls", "xlsx", "ods"],
            Category::Presentation => &["ppt", "pptx", "odp", "key"],
            Category::Image => &[
                "png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "tiff", "ico", "heic",
            ],
            Category::Video => &["mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "3gp"],
            Category::Audio => &["mp3", "wav", "ogg", "flac", "aac", "m4a", "wma"],
            Category::Archive => &["zip", "rar", "7z", "tar", "gz", "bz2", "xz"],
            Category::Installer => &["exe", "msi", "dmg", "pkg", "deb", "rpm", "appimage"],
            Category::Code => &[
                "py", "java", "c", "cpp", "h", "hpp", "js", "ts", "rs", "go", "sh", "bash",
                "json", "xml", "yaml", "yml", "toml",
            ],
            Category::Font => &["ttf", "otf", "woff", "woff2"],
        }
    }

    /// Finds the category for an extension, ignoring case and a leading dot.
    pub fn for_extension(ext: &str) -> Option<Category> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.extensions().contains(&ext.as_str()))
    }
}

/// Template every default rule renders its destination from.
pub const DEFAULT_TARGET_TEMPLATE: &str = "{Downloads}/{Category}/";

/// Builds the rule set used when no rules have been saved yet.
pub fn default_rules() -> Vec<Rule> {
    Category::ALL
        .iter()
        .enumerate()
        .map(|(index, category)| Rule {
            priority: index as i32 + 1,
            name: category.label().to_string(),
            category: category.label().to_string(),
            extensions: category
                .extensions()
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            action: RuleAction::Move,
            target_template: DEFAULT_TARGET_TEMPLATE.to_string(),
            stop_on_match: true,
            ..Rule::default()
        })
        .collect()
}
