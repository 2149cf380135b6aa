//! TOML persistence for the rule set.
//!
//! ```toml
//! [[rules]]
//! name = "Invoices"
//! priority = 1
//! extensions = ["pdf"]
//! include_keywords = ["invoice"]
//! target_template = "{Downloads}/Invoices/{YYYY}/"
//! ```

use crate::category::default_rules;
use crate::error::{DropsortError, Result};
use crate::rule::Rule;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RulesDocument {
    #[serde(default)]
    rules: Vec<Rule>,
}

pub struct RulesStore {
    path: PathBuf,
}

impl RulesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/dropsort/rules.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dropsort")
            .join("rules.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the rule set.
    ///
    /// A missing or empty file yields the built-in defaults, which are saved
    /// so the user has something to edit.
    pub fn load_all(&self) -> Result<Vec<Rule>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(DropsortError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            let rules = default_rules();
            tracing::info!(path = %self.path.display(), "no rules saved, writing defaults");
            self.save_all(&rules)?;
            return Ok(rules);
        }

        let document: RulesDocument =
            toml::from_str(&content).map_err(|e| DropsortError::ConfigInvalid {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        tracing::debug!(count = document.rules.len(), "loaded rules");
        Ok(document.rules)
    }

    /// Replaces the saved rules. The previous file is kept as `<name>.bak`.
    pub fn save_all(&self, rules: &[Rule]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| DropsortError::io(parent, e))?;
        }

        if self.path.exists() {
            let backup = self.backup_path();
            fs::copy(&self.path, &backup).map_err(|e| DropsortError::io(&backup, e))?;
        }

        let document = RulesDocument {
            rules: rules.to_vec(),
        };
        let content =
            toml::to_string_pretty(&document).map_err(|e| DropsortError::Serialization {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        fs::write(&self.path, content).map_err(|e| DropsortError::io(&self.path, e))
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "rules.toml".into());
        name.push(".bak");
        self.path.with_file_name(name)
    }
}
