//! Trigger dispatcher for the Vigil quality gate.
//!
//! Turns file, code, stage, and lifecycle events into validation requests,
//! suppresses duplicates, coalesces bursts, and runs the fixed checkpoint
//! batteries that can block a commit, push, or deployment.

pub mod checkpoints;
pub mod debounce;
pub mod dedup;
pub mod dispatcher;
pub mod queue;
pub mod request;
pub mod rules;

pub use checkpoints::{BatteryEntry, CheckpointFlags, PRE_DEPLOYMENT_BATTERY, PRE_PUSH_BATTERY};
pub use debounce::Debouncer;
pub use dedup::PendingRegistry;
pub use dispatcher::{DispatchOutcome, DispatcherConfig, DispatcherStatistics, Event, TriggerDispatcher};
pub use queue::{BatchQueue, QueuedRequest};
pub use request::TriggerRequest;
pub use rules::{default_rules, EventKind, PatternSpec, RulePattern, RuleSet, TriggerRule};
