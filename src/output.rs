//! Output formatting and styling module.
//!
//! All user-facing CLI output goes through [`OutputFormatter`]. Diagnostics
//! go through `tracing` instead and end up on stderr.

use crate::history::{LogEntry, OpResult, Statistics};
use crate::plan::MovePlan;
use crate::rule::Rule;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Status messages (success, error, warning, info)
/// - Progress bars for batches of operations
/// - Tables for plans, rules, history and statistics
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dropsort::output::OutputFormatter;
    /// OutputFormatter::success("Sorted 3 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a progress bar for `total` file operations.
    ///
    /// ```no_run
    /// use dropsort::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints one planned operation.
    pub fn plan_line(plan: &MovePlan) {
        let conflict = if plan.has_conflict {
            format!(" ({} on conflict)", plan.conflict_policy).yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {} {} {} [{}]{}",
            plan.action.to_string().bold(),
            plan.source.name,
            "→".dimmed(),
            plan.target_path.display(),
            plan.rule_name().cyan(),
            conflict
        );
    }

    /// Prints one executed operation with a status marker.
    pub fn entry_line(entry: &LogEntry) {
        let marker = match entry.result {
            OpResult::Success => "✓".green(),
            OpResult::Skipped => "-".yellow(),
            OpResult::Failed => "✗".red(),
        };
        let target = if entry.target_path.as_os_str().is_empty() {
            String::new()
        } else {
            format!(" → {}", entry.target_path.display())
        };
        let reason = entry
            .error_message
            .as_ref()
            .map(|m| format!(" ({})", m).dimmed().to_string())
            .unwrap_or_default();

        println!(
            "{} {} {}{}{}",
            marker,
            entry.action,
            entry.source_path.display(),
            target,
            reason
        );
    }

    /// Prints a history line including the local timestamp.
    pub fn history_line(entry: &LogEntry) {
        let timestamp = entry
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        print!("{} ", timestamp.dimmed());
        Self::entry_line(entry);
        if entry.undoable {
            println!("    {} undoable", "↺".cyan());
        }
    }

    /// Prints the rule set in evaluation order.
    pub fn rules_table(rules: &[&Rule]) {
        Self::header("RULES");
        for rule in rules {
            let stop = if rule.stop_on_match { "stop" } else { "continue" };
            let extensions = if rule.extensions.is_empty() {
                "*".to_string()
            } else {
                rule.extensions.join(", ")
            };
            println!(
                "{:>4}  {:<16} {:<7} {:<9} {} → {}",
                rule.priority,
                rule.name.bold(),
                rule.action,
                stop.dimmed(),
                extensions,
                rule.target_template.cyan()
            );
        }
    }

    /// Prints a summary table of file counts by category.
    ///
    /// ```no_run
    /// use dropsort::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("Documents".to_string(), 15);
    /// counts.insert("Images".to_string(), 8);
    /// OutputFormatter::summary_table(&counts, 23);
    /// ```
    pub fn summary_table(category_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let max_category_len = category_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in category_counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(*count),
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files),
            width = max_category_len
        );
    }

    /// Prints outcome counts and the busiest extensions.
    pub fn statistics(stats: &Statistics) {
        Self::header("STATISTICS");
        println!(
            "{} total, {} succeeded, {} skipped, {} failed",
            stats.total,
            stats.succeeded.to_string().green(),
            stats.skipped.to_string().yellow(),
            stats.failed.to_string().red()
        );

        let mut by_extension: Vec<_> = stats.by_extension.iter().collect();
        by_extension.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (extension, count) in by_extension.into_iter().take(10) {
            let label = if extension.is_empty() { "(none)" } else { extension.as_str() };
            println!("  {:<10} {}", label, count);
        }
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

/// Counts plans per rule category.
pub fn category_counts(plans: &[MovePlan]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for plan in plans {
        *counts.entry(plan.category().to_string()).or_insert(0) += 1;
    }
    counts
}
