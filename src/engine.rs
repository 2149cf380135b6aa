//! Rule evaluation over batches of snapshots.
//!
//! Enabled rules are sorted by ascending priority (stable, so equal
//! priorities keep their input order). Every matching rule overwrites the
//! current match, and a matching rule with `stop_on_match` ends the search.
//! A non-stopping match is therefore *not* final: a later rule that also
//! matches replaces it.

use crate::cancel::CancelToken;
use crate::matcher::CompiledRule;
use crate::plan::MovePlan;
use crate::render::PathRenderer;
use crate::rule::{ConflictPolicy, Rule};
use crate::snapshot::FileSnapshot;

/// Plans produced by one evaluation call.
#[derive(Debug, Default)]
pub struct Evaluation {
    pub plans: Vec<MovePlan>,
    /// True when the batch stopped early; `plans` holds what was built so far.
    pub cancelled: bool,
}

/// Turns snapshots into move plans.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    renderer: PathRenderer,
}

impl RuleEngine {
    pub fn new(renderer: PathRenderer) -> Self {
        Self { renderer }
    }

    pub fn renderer(&self) -> &PathRenderer {
        &self.renderer
    }

    /// Evaluates every snapshot against `rules`.
    ///
    /// Snapshots that match no rule yield no plan. `cancel` is checked before
    /// each snapshot; once set, no further matching or existence checks run.
    pub fn evaluate(
        &self,
        snapshots: &[FileSnapshot],
        rules: &[Rule],
        conflict_policy: ConflictPolicy,
        cancel: &CancelToken,
    ) -> Evaluation {
        self.evaluate_with(snapshots, rules, conflict_policy, cancel, |_| {})
    }

    /// Like [`evaluate`](Self::evaluate), calling `on_planned` after each
    /// plan is built.
    pub fn evaluate_with<F>(
        &self,
        snapshots: &[FileSnapshot],
        rules: &[Rule],
        conflict_policy: ConflictPolicy,
        cancel: &CancelToken,
        mut on_planned: F,
    ) -> Evaluation
    where
        F: FnMut(&MovePlan),
    {
        let ordered = ordered_rules(rules);
        let mut evaluation = Evaluation::default();

        for snapshot in snapshots {
            if cancel.is_cancelled() {
                tracing::debug!(
                    planned = evaluation.plans.len(),
                    "evaluation cancelled"
                );
                evaluation.cancelled = true;
                break;
            }

            if let Some(plan) = self.plan_for(snapshot, &ordered, conflict_policy) {
                on_planned(&plan);
                evaluation.plans.push(plan);
            }
        }

        evaluation
    }

    /// Finds the rule that claims `snapshot`, if any.
    pub fn select_rule<'a>(
        &self,
        snapshot: &FileSnapshot,
        ordered: &[CompiledRule<'a>],
    ) -> Option<&'a Rule> {
        let mut matched = None;
        for compiled in ordered {
            if compiled.matches(snapshot) {
                matched = Some(compiled.rule());
                if compiled.rule().stop_on_match {
                    break;
                }
            }
        }
        matched
    }

    fn plan_for(
        &self,
        snapshot: &FileSnapshot,
        ordered: &[CompiledRule<'_>],
        conflict_policy: ConflictPolicy,
    ) -> Option<MovePlan> {
        let rule = self.select_rule(snapshot, ordered)?;
        let target_path = self.renderer.render(
            &rule.target_template,
            snapshot,
            rule,
            &snapshot.parent_dir,
        );
        let has_conflict = target_path.exists();

        tracing::debug!(
            file = %snapshot.path.display(),
            rule = %rule.name,
            target = %target_path.display(),
            has_conflict,
            "planned"
        );

        Some(MovePlan::new(
            snapshot.clone(),
            target_path,
            rule,
            conflict_policy,
            has_conflict,
        ))
    }
}

/// Filters to enabled rules and stably sorts them by ascending priority.
pub fn ordered_rules(rules: &[Rule]) -> Vec<CompiledRule<'_>> {
    let mut enabled: Vec<&Rule> = rules.iter().filter(|r| r.enabled).collect();
    enabled.sort_by_key(|r| r.priority);
    enabled.into_iter().map(CompiledRule::new).collect()
}
