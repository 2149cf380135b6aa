//! dropsort - sorts files dropped into watched folders
//!
//! Files are described by a [`FileSnapshot`], matched against user-defined
//! [`Rule`]s by the [`RuleEngine`], turned into [`MovePlan`]s and carried out
//! by the [`Executor`]. Successful moves can be reverted through the
//! [`UndoLedger`]. For watched folders, the [`StabilityTracker`] holds new
//! files back until they are no longer being written.

pub mod cancel;
pub mod category;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod history;
pub mod ledger;
pub mod lock_check;
pub mod logging;
pub mod matcher;
pub mod organizer;
pub mod output;
pub mod plan;
pub mod render;
pub mod rule;
pub mod rules_store;
pub mod scanner;
pub mod snapshot;
pub mod tracker;
pub mod watcher;

pub use cancel::CancelToken;
pub use config::{IgnoreFilter, Settings};
pub use engine::{Evaluation, RuleEngine};
pub use error::{DropsortError, Result};
pub use executor::Executor;
pub use history::{LogEntry, LogStore, OpResult};
pub use ledger::{UndoLedger, UndoOutcome, UndoReport};
pub use lock_check::{ExclusiveLockCheck, LockCheck};
pub use matcher::matches;
pub use organizer::Organizer;
pub use plan::{MovePlan, PlanStatus};
pub use render::PathRenderer;
pub use rule::{ConflictPolicy, Rule, RuleAction};
pub use snapshot::FileSnapshot;
pub use tracker::StabilityTracker;
