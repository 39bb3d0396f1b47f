//! Check orchestrator for the Vigil quality gate.
//!
//! Runs a named validation profile (an ordered set of checks) against a target
//! through one read-only validator capability, aggregates per-check findings,
//! and applies per-tier severity thresholds to reach a pass/fail verdict.

pub mod orchestrator;
pub mod profiles;
pub mod report;
pub mod safeguard;
pub mod thresholds;
pub mod validator;

pub use orchestrator::{CheckOrchestrator, OrchestratorConfig, OrchestratorMetrics};
pub use profiles::{
    check_strategy, default_profiles, CheckStrategy, ValidationProfile, ValidatorRequirement,
};
pub use report::{triage, ReportSummary, Triage, TriageTask, ValidationReport};
pub use safeguard::{bind_validator, BoundValidator, ToolProfile, MUTATING_TOOLS};
pub use thresholds::{evaluate_verdict, SeverityThresholds, Verdict};
pub use validator::{
    CheckReport, CheckTask, ReportedIssue, Restrictions, Validator, ValidatorDescriptor,
    ValidatorRegistry,
};
