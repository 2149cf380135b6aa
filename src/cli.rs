//! Command-line interface for dropsort.
//!
//! Argument definitions use clap derive; each subcommand has a `run_*`
//! function that builds an [`Organizer`] from the global options and prints
//! through [`OutputFormatter`].

use crate::cancel::CancelToken;
use crate::config::Settings;
use crate::engine::ordered_rules;
use crate::error::Result;
use crate::history::LogStore;
use crate::ledger::UndoOutcome;
use crate::organizer::Organizer;
use crate::output::{OutputFormatter, category_counts};
use crate::plan::PlanStatus;
use crate::rule::ConflictPolicy;
use crate::rules_store::RulesStore;
use chrono::{Duration, Utc};
use clap::{ArgAction, Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

/// Sort files dropped into watched folders by user-defined rules
#[derive(Parser, Debug)]
#[command(name = "dropsort")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (default: ./.dropsortrc.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Rules file
    #[arg(long, global = true)]
    pub rules: Option<PathBuf>,

    /// Operation log file
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Sort the files currently in one or more folders
    Scan {
        /// Folders to scan (default: the configured watch folders)
        folders: Vec<PathBuf>,

        /// Descend into subfolders
        #[arg(short, long)]
        recursive: bool,

        /// Show the plan without touching any file
        #[arg(long)]
        dry_run: bool,

        /// Override the configured conflict policy
        #[arg(long, value_enum)]
        policy: Option<ConflictPolicy>,
    },

    /// Watch folders and sort new files once they stop changing
    ///
    /// Runs until stdin is closed or `q` is entered.
    Watch {
        /// Folders to watch (default: the configured watch folders)
        folders: Vec<PathBuf>,
    },

    /// Move the most recently sorted files back
    Undo {
        /// Number of moves to undo
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },

    /// Show recent operations and statistics
    History {
        /// Statistics window in days
        #[arg(long, default_value_t = 7)]
        days: u32,

        /// Number of entries to list
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// List the active rules in evaluation order
    Rules,
}

/// Dispatches the parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Scan {
            folders,
            recursive,
            dry_run,
            policy,
        } => run_scan(&cli, folders, *recursive, *dry_run, *policy),
        Commands::Watch { folders } => run_watch(&cli, folders),
        Commands::Undo { count } => run_undo(&cli, *count),
        Commands::History { days, limit } => run_history(&cli, *days, *limit),
        Commands::Rules => run_rules(&cli),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    Settings::load(cli.config.as_deref())
}

fn open_organizer(cli: &Cli, settings: Settings) -> Result<Organizer> {
    let rules_path = cli.rules.clone().unwrap_or_else(RulesStore::default_path);
    let rules = RulesStore::new(rules_path).load_all()?;
    let log = LogStore::open(cli.log.clone().unwrap_or_else(LogStore::default_path))?;

    let organizer = Organizer::new(settings, rules, log)?;
    if let Err(e) = organizer.purge_log() {
        tracing::warn!(error = %e, "could not purge old log entries");
    }
    Ok(organizer)
}

fn target_folders(requested: &[PathBuf], settings: &Settings) -> Vec<PathBuf> {
    if requested.is_empty() {
        settings.folders()
    } else {
        requested.to_vec()
    }
}

/// Plans every folder and, unless `dry_run`, applies the plans.
pub fn run_scan(
    cli: &Cli,
    folders: &[PathBuf],
    recursive: bool,
    dry_run: bool,
    policy: Option<ConflictPolicy>,
) -> Result<()> {
    let mut settings = load_settings(cli)?;
    if let Some(policy) = policy {
        settings.conflict_policy = policy;
    }
    let recursive = recursive || settings.recursive_scan;
    let folders = target_folders(folders, &settings);
    let organizer = open_organizer(cli, settings)?;
    let cancel = CancelToken::new();

    let mut plans = Vec::new();
    for folder in &folders {
        OutputFormatter::info(&format!("Scanning {}", folder.display()));
        let evaluation = organizer.scan(folder, recursive, &cancel)?;
        plans.extend(evaluation.plans);
    }

    if plans.is_empty() {
        OutputFormatter::info("Nothing to sort.");
        return Ok(());
    }

    if dry_run {
        OutputFormatter::dry_run_notice(&format!("{} file(s) would be sorted:", plans.len()));
        for plan in &plans {
            OutputFormatter::plan_line(plan);
        }
        OutputFormatter::summary_table(&category_counts(&plans), plans.len());
        return Ok(());
    }

    let pb = OutputFormatter::create_progress_bar(plans.len() as u64);
    let entries = organizer.apply_selected_with(&mut plans, |plan, _| {
        pb.set_message(plan.source.name.clone());
        pb.inc(1);
    });
    pb.finish_and_clear();

    for entry in &entries {
        OutputFormatter::entry_line(entry);
    }

    let done: Vec<_> = plans
        .iter()
        .filter(|p| p.status == PlanStatus::Success)
        .cloned()
        .collect();
    OutputFormatter::summary_table(&category_counts(&done), done.len());

    let failed = plans.iter().filter(|p| p.status == PlanStatus::Failed).count();
    if failed > 0 {
        OutputFormatter::warning(&format!("{} file(s) could not be sorted", failed));
    }
    Ok(())
}

/// Runs the watch pipeline until stdin closes or `q` is entered.
pub fn run_watch(cli: &Cli, folders: &[PathBuf]) -> Result<()> {
    let settings = load_settings(cli)?;
    let folders = target_folders(folders, &settings);
    let organizer = Arc::new(open_organizer(cli, settings)?);
    if let Err(e) = organizer.restore_undo_history() {
        tracing::warn!(error = %e, "could not restore undo history");
    }

    let mut session = organizer.start(&folders)?;
    for folder in session.folders() {
        OutputFormatter::success(&format!("Watching {}", folder.display()));
    }
    OutputFormatter::plain("Enter q to stop.");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) if matches!(line.trim(), "q" | "quit") => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "stdin closed");
                break;
            }
        }
    }

    session.stop();
    OutputFormatter::info(&format!(
        "Stopped. {} move(s) can be undone.",
        organizer.ledger().len()
    ));
    Ok(())
}

/// Undoes up to `count` moves, newest first.
pub fn run_undo(cli: &Cli, count: usize) -> Result<()> {
    let settings = load_settings(cli)?;
    let organizer = open_organizer(cli, settings)?;

    if organizer.restore_undo_history()? == 0 {
        OutputFormatter::info("Nothing to undo.");
        return Ok(());
    }

    let mut restored = 0;
    for _ in 0..count {
        match organizer.undo_last() {
            UndoOutcome::Empty => break,
            UndoOutcome::Restored(report) => {
                restored += 1;
                let note = if report.renamed {
                    " (original name was taken)"
                } else {
                    ""
                };
                OutputFormatter::success(&format!(
                    "Restored {}{}",
                    report.entry.source_path.display(),
                    note
                ));
            }
            UndoOutcome::Discarded(entry) => {
                OutputFormatter::warning(&format!(
                    "Cannot undo {}: it is no longer at {}",
                    entry.source_path.display(),
                    entry.target_path.display()
                ));
            }
            UndoOutcome::Retained { entry, error } => {
                OutputFormatter::error(&format!(
                    "Failed to restore {}: {}",
                    entry.source_path.display(),
                    error
                ));
                break;
            }
        }
    }

    OutputFormatter::info(&format!(
        "{} file(s) restored, {} more can be undone.",
        restored,
        organizer.ledger().len()
    ));
    Ok(())
}

/// Lists recent log entries and statistics over the last `days` days.
pub fn run_history(cli: &Cli, days: u32, limit: usize) -> Result<()> {
    let settings = load_settings(cli)?;
    let organizer = open_organizer(cli, settings)?;
    let log = organizer.log_store();

    let entries = log.recent(limit)?;
    if entries.is_empty() {
        OutputFormatter::info("No operations recorded yet.");
        return Ok(());
    }

    OutputFormatter::header("RECENT OPERATIONS");
    for entry in &entries {
        OutputFormatter::history_line(entry);
    }

    let to = Utc::now();
    let from = to - Duration::days(i64::from(days));
    OutputFormatter::statistics(&log.statistics(from, to)?);
    Ok(())
}

/// Prints enabled rules in the order the engine evaluates them.
pub fn run_rules(cli: &Cli) -> Result<()> {
    let rules_path = cli.rules.clone().unwrap_or_else(RulesStore::default_path);
    let store = RulesStore::new(rules_path);
    let rules = store.load_all()?;

    let ordered: Vec<_> = ordered_rules(&rules).iter().map(|c| c.rule()).collect();
    OutputFormatter::rules_table(&ordered);

    let disabled = rules.len() - ordered.len();
    if disabled > 0 {
        OutputFormatter::plain(&format!("{} disabled rule(s) not shown", disabled));
    }
    OutputFormatter::plain(&format!("Rules file: {}", store.path().display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan() {
        let cli = Cli::parse_from([
            "dropsort",
            "scan",
            "/tmp/in",
            "--recursive",
            "--dry-run",
            "--policy",
            "skip",
            "-vv",
        ]);

        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.command,
            Commands::Scan {
                folders: vec![PathBuf::from("/tmp/in")],
                recursive: true,
                dry_run: true,
                policy: Some(ConflictPolicy::Skip),
            }
        );
    }

    #[test]
    fn test_parse_undo_defaults_to_one() {
        let cli = Cli::parse_from(["dropsort", "undo"]);
        assert_eq!(cli.command, Commands::Undo { count: 1 });
    }

    #[test]
    fn test_global_paths() {
        let cli = Cli::parse_from([
            "dropsort",
            "history",
            "--log",
            "/tmp/log.jsonl",
            "--config",
            "/tmp/c.toml",
        ]);

        assert_eq!(cli.log, Some(PathBuf::from("/tmp/log.jsonl")));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert_eq!(
            cli.command,
            Commands::History {
                days: 7,
                limit: 20
            }
        );
    }
}
