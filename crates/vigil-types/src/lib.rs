//! Shared types, errors, and events for the Vigil quality-gating pipeline.
//!
//! This crate provides the foundational types used across all other Vigil crates:
//! - `VigilError`: unified error taxonomy
//! - `Severity`, `Issue`, `Target`: the finding and artifact model
//! - `ValidationRequest` / `ValidationResult`: one validation run, in and out
//! - `GateEvent` / `EventEmitter`: typed observability fan-out

pub mod duration_serde;
pub mod events;
mod result;

pub use events::{EventEmitter, GateEvent};
pub use result::{CheckResult, CheckStatus, SeverityCounts, ValidationResult};

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unified error type for all Vigil subsystems.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    // === Orchestrator Errors ===
    #[error("Unknown validation profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("Validator '{validator}' is not available")]
    ValidatorUnavailable { validator: String },

    #[error("Validator '{validator}' rejected: {reason}")]
    UnsafeValidator { validator: String, reason: String },

    #[error("Check '{check}' failed to execute: {message}")]
    CheckExecution { check: String, message: String },

    #[error("Check '{check}' timed out after {timeout_ms}ms")]
    ValidationTimeout { check: String, timeout_ms: u64 },

    // === Checkpoint Errors ===
    #[error("Pre-commit validation failed ({} of {} profiles failed)", failed_count(.results), .results.len())]
    CommitBlocked { results: Vec<ValidationResult> },

    #[error("Pre-push validation failed ({} of {} profiles failed)", failed_count(.results), .results.len())]
    PushBlocked { results: Vec<ValidationResult> },

    #[error("Pre-deployment validation failed for '{environment}' ({} of {} profiles failed)", failed_count(.results), .results.len())]
    DeploymentBlocked {
        environment: String,
        results: Vec<ValidationResult>,
    },

    // === Refinement Errors ===
    #[error("Refinement plan '{plan_id}' has a circular dependency among {remaining} unfinished stages")]
    CircularDependency { plan_id: String, remaining: usize },

    #[error("Refinement stage '{stage}' failed: {message}")]
    StageExecution { stage: String, message: String },

    // === Configuration Errors ===
    #[error("Invalid trigger rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

fn failed_count(results: &[ValidationResult]) -> usize {
    results.iter().filter(|r| !r.passed).count()
}

impl VigilError {
    /// Returns `true` for checkpoint failures. Callers must halt the surrounding
    /// operation rather than retry.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            VigilError::CommitBlocked { .. }
                | VigilError::PushBlocked { .. }
                | VigilError::DeploymentBlocked { .. }
        )
    }

    /// Returns `true` for per-check failures that the orchestrator absorbs into
    /// a degraded check status.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VigilError::CheckExecution { .. } | VigilError::ValidationTimeout { .. }
        )
    }

    /// The individual results carried by a checkpoint failure.
    pub fn blocked_results(&self) -> Option<&[ValidationResult]> {
        match self {
            VigilError::CommitBlocked { results }
            | VigilError::PushBlocked { results }
            | VigilError::DeploymentBlocked { results, .. } => Some(results),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, VigilError>`.
pub type Result<T> = std::result::Result<T, VigilError>;

// ---------------------------------------------------------------------------
// Severity: shared ordering, critical highest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Severity {
    /// Every tier, most severe first.
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// Position in the tie-break order (0 = critical).
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// High or critical.
    pub fn is_urgent(self) -> bool {
        self >= Severity::High
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.rank().cmp(&self.rank())
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(VigilError::Other(format!("unknown severity '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Issue: a single finding produced by a validator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IssueLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl IssueLocation {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            line: None,
        }
    }

    pub fn line(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: Some(file.into()),
            line: Some(line),
        }
    }

    /// Grouping key for location clusters: the file when known, otherwise the
    /// bare line number.
    pub fn cluster_key(&self) -> String {
        match (&self.file, self.line) {
            (Some(file), _) => file.clone(),
            (None, Some(line)) => line.to_string(),
            (None, None) => "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// The check (or category) that produced this issue.
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<IssueLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Issue {
    pub fn new(kind: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            severity,
            message: message.into(),
            location: None,
            suggestion: None,
        }
    }

    pub fn at(mut self, location: IssueLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Target: the artifact under validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    File {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Files {
        files: Vec<String>,
    },
    Code {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
    },
    StageOutput {
        stage: String,
        #[serde(default)]
        output: serde_json::Value,
    },
    Deployment {
        environment: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    Opaque {
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl Target {
    pub fn file(path: impl Into<String>) -> Self {
        Target::File {
            path: path.into(),
            content: None,
        }
    }

    pub fn code(code: impl Into<String>) -> Self {
        Target::Code {
            code: code.into(),
            context: None,
        }
    }

    /// The text trigger rules are matched against.
    pub fn subject(&self) -> String {
        match self {
            Target::File { path, .. } => path.clone(),
            Target::Files { files } => files.join("\n"),
            Target::Code { code, .. } => code.clone(),
            Target::StageOutput { stage, .. } => stage.clone(),
            Target::Deployment { environment, .. } => environment.clone(),
            Target::Opaque { .. } => String::new(),
        }
    }

    /// Stable digest of the target's identity, used for dedup and debounce
    /// keys. File content and stage output are excluded so that successive
    /// edits of one artifact share a signature.
    pub fn signature(&self) -> String {
        let identity = match self {
            Target::File { path, .. } => format!("file:{path}"),
            Target::Files { files } => {
                let mut files = files.clone();
                files.sort();
                format!("files:{}", files.join("\n"))
            }
            Target::Code { code, .. } => format!("code:{code}"),
            Target::StageOutput { stage, .. } => format!("stage:{stage}"),
            Target::Deployment {
                environment,
                version,
            } => format!(
                "deployment:{environment}:{}",
                version.as_deref().unwrap_or_default()
            ),
            Target::Opaque { payload } => format!("opaque:{payload}"),
        };
        stable_hash(&identity)
    }
}

/// Hex-encoded hash of a string, stable within one process.
pub fn stable_hash(input: &str) -> String {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

// ---------------------------------------------------------------------------
// ValidationRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Severity>,
}

/// One request for the orchestrator. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub id: String,
    pub profile: String,
    pub target: Target,
    pub automatic: bool,
    #[serde(default)]
    pub metadata: RequestMetadata,
}

impl ValidationRequest {
    pub fn new(profile: impl Into<String>, target: Target) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            profile: profile.into(),
            target,
            automatic: false,
            metadata: RequestMetadata::default(),
        }
    }

    pub fn automatic(mut self, automatic: bool) -> Self {
        self.automatic = automatic;
        self
    }

    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_critical_highest() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);

        let mut tiers = vec![Severity::Low, Severity::Critical, Severity::Medium, Severity::High];
        tiers.sort_by(|a, b| b.cmp(a));
        assert_eq!(tiers, Severity::ALL.to_vec());
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!(" low ".parse::<Severity>().unwrap(), Severity::Low);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, "\"high\"");
        assert!(Severity::High.is_urgent());
        assert!(!Severity::Medium.is_urgent());
    }

    #[test]
    fn issue_deserializes_with_type_field() {
        let issue: Issue = serde_json::from_str(
            r#"{"type":"syntax","severity":"critical","message":"missing brace","location":{"file":"a.ts","line":4}}"#,
        )
        .unwrap();
        assert_eq!(issue.kind, "syntax");
        assert_eq!(issue.severity, Severity::Critical);
        assert_eq!(issue.location.unwrap().cluster_key(), "a.ts");
    }

    #[test]
    fn cluster_key_falls_back_to_line_then_unknown() {
        let by_line = IssueLocation {
            file: None,
            line: Some(12),
        };
        assert_eq!(by_line.cluster_key(), "12");
        assert_eq!(IssueLocation::default().cluster_key(), "unknown");
    }

    #[test]
    fn target_subject_per_variant() {
        assert_eq!(Target::file("src/app.ts").subject(), "src/app.ts");
        assert_eq!(Target::code("login(user)").subject(), "login(user)");
        let stage = Target::StageOutput {
            stage: "implementation".into(),
            output: serde_json::json!({"ok": true}),
        };
        assert_eq!(stage.subject(), "implementation");
    }

    #[test]
    fn target_signature_ignores_file_content() {
        let a = Target::File {
            path: "a.ts".into(),
            content: Some("one".into()),
        };
        let b = Target::File {
            path: "a.ts".into(),
            content: Some("two".into()),
        };
        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), Target::file("b.ts").signature());
        assert_ne!(a.signature(), Target::code("a.ts").signature());
    }

    #[test]
    fn files_signature_is_order_independent() {
        let a = Target::Files {
            files: vec!["b.ts".into(), "a.ts".into()],
        };
        let b = Target::Files {
            files: vec!["a.ts".into(), "b.ts".into()],
        };
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn request_ids_are_unique() {
        let a = ValidationRequest::new("code_quality", Target::file("a.ts"));
        let b = ValidationRequest::new("code_quality", Target::file("a.ts"));
        assert_ne!(a.id, b.id);
        assert!(!a.automatic);
        assert!(a.clone().automatic(true).automatic);
    }

    #[test]
    fn error_display_unknown_profile() {
        let err = VigilError::UnknownProfile {
            profile: "nope".into(),
        };
        assert_eq!(err.to_string(), "Unknown validation profile 'nope'");
    }

    #[test]
    fn error_display_timeout() {
        let err = VigilError::ValidationTimeout {
            check: "syntax".into(),
            timeout_ms: 30000,
        };
        assert_eq!(err.to_string(), "Check 'syntax' timed out after 30000ms");
        assert!(err.is_recoverable());
        assert!(!err.is_blocking());
    }

    #[test]
    fn error_display_commit_blocked_counts_failures() {
        let passing = ValidationResult::empty("code_quality", true);
        let failing = ValidationResult::empty("compliance", false);
        let err = VigilError::CommitBlocked {
            results: vec![passing, failing],
        };
        assert_eq!(
            err.to_string(),
            "Pre-commit validation failed (1 of 2 profiles failed)"
        );
        assert!(err.is_blocking());
        assert_eq!(err.blocked_results().map(|r| r.len()), Some(2));
    }

    #[test]
    fn error_display_circular_dependency() {
        let err = VigilError::CircularDependency {
            plan_id: "p1".into(),
            remaining: 2,
        };
        assert_eq!(
            err.to_string(),
            "Refinement plan 'p1' has a circular dependency among 2 unfinished stages"
        );
        assert!(!err.is_recoverable());
    }
}
