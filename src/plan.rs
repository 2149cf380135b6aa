//! Proposed file operations produced by the rule engine.

use crate::rule::{ConflictPolicy, Rule, RuleAction};
use crate::snapshot::FileSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlanStatus {
    #[default]
    Pending,
    Success,
    Skipped,
    Failed,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlanStatus::Pending => "Pending",
            PlanStatus::Success => "Success",
            PlanStatus::Skipped => "Skipped",
            PlanStatus::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// A proposed, not-yet-applied operation on one file.
///
/// `target_path` always ends in the source file name. `has_conflict` only
/// records whether the target existed when the plan was built; the executor
/// checks again before acting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovePlan {
    pub id: Uuid,
    pub source: FileSnapshot,
    pub target_path: PathBuf,
    pub matched_rule: Option<Rule>,
    pub action: RuleAction,
    pub conflict_policy: ConflictPolicy,
    pub status: PlanStatus,
    pub error_message: Option<String>,
    pub selected: bool,
    pub has_conflict: bool,
}

impl MovePlan {
    /// Creates a pending, selected plan for `source` produced by `rule`.
    pub fn new(
        source: FileSnapshot,
        target_path: PathBuf,
        rule: &Rule,
        conflict_policy: ConflictPolicy,
        has_conflict: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            target_path,
            matched_rule: Some(rule.clone()),
            action: rule.action,
            conflict_policy,
            status: PlanStatus::Pending,
            error_message: None,
            selected: true,
            has_conflict,
        }
    }

    /// Name of the matched rule, or `"Unknown"` for a hand-built plan.
    pub fn rule_name(&self) -> &str {
        self.matched_rule
            .as_ref()
            .map(|r| r.name.as_str())
            .unwrap_or("Unknown")
    }

    pub fn rule_id(&self) -> Option<Uuid> {
        self.matched_rule.as_ref().map(|r| r.id)
    }

    /// Category of the matched rule, used for summaries.
    pub fn category(&self) -> &str {
        self.matched_rule
            .as_ref()
            .map(|r| r.category.as_str())
            .unwrap_or("General")
    }
}
