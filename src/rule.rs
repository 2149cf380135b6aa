//! Sorting rules and the enums that describe what a rule does.
//!
//! Rules are persisted by [`crate::rules_store::RulesStore`] and handed to the
//! engine as a read-only, ordered list for each evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The file operation a rule performs on a matching file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RuleAction {
    #[default]
    Move,
    Copy,
    Rename,
    Delete,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleAction::Move => "Move",
            RuleAction::Copy => "Copy",
            RuleAction::Rename => "Rename",
            RuleAction::Delete => "Delete",
        };
        f.write_str(name)
    }
}

/// How to proceed when the destination path is already occupied.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum ConflictPolicy {
    /// Append `_1`, `_2`, ... before the extension until a free name is found.
    #[default]
    AutoRename,
    /// Leave both files untouched.
    Skip,
    /// Delete the existing destination first.
    Overwrite,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictPolicy::AutoRename => "AutoRename",
            ConflictPolicy::Skip => "Skip",
            ConflictPolicy::Overwrite => "Overwrite",
        };
        f.write_str(name)
    }
}

/// A user-defined sorting rule.
///
/// Every predicate is optional; an empty list or unset bound matches
/// everything. Rules with a lower `priority` are evaluated first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    pub id: Uuid,
    pub enabled: bool,
    pub priority: i32,
    pub name: String,
    /// Allowed extensions, compared case-insensitively with or without a dot.
    pub extensions: Vec<String>,
    /// Substrings of the file stem, any of which admits the file.
    pub include_keywords: Vec<String>,
    /// Substrings of the file stem, any of which rejects the file.
    pub exclude_keywords: Vec<String>,
    /// Case-insensitive pattern applied to the full file name.
    pub regex_pattern: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub min_created: Option<DateTime<Utc>>,
    pub max_created: Option<DateTime<Utc>>,
    pub action: RuleAction,
    /// Destination directory template, see [`crate::render`].
    pub target_template: String,
    pub stop_on_match: bool,
    pub category: String,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            enabled: true,
            priority: 0,
            name: String::new(),
            extensions: Vec::new(),
            include_keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            regex_pattern: None,
            min_size: None,
            max_size: None,
            min_created: None,
            max_created: None,
            action: RuleAction::Move,
            target_template: String::new(),
            stop_on_match: true,
            category: "General".to_string(),
        }
    }
}

impl Rule {
    /// Creates an enabled Move rule with the given name and no predicates.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
