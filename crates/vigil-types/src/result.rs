//! Per-check and per-run validation results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Issue, RequestMetadata, Severity};

// ---------------------------------------------------------------------------
// CheckStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    PassedWithWarnings,
    Warning,
    Failed,
    /// The check itself could not run (error or timeout). Contributes no issues.
    Error,
}

impl CheckStatus {
    /// Status of a check that ran to completion, derived from its worst issue.
    pub fn from_issues(issues: &[Issue]) -> Self {
        match issues.iter().map(|i| i.severity).max() {
            Some(Severity::Critical) => CheckStatus::Failed,
            Some(Severity::High) => CheckStatus::Warning,
            Some(_) => CheckStatus::PassedWithWarnings,
            None => CheckStatus::Passed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Passed => "passed",
            CheckStatus::PassedWithWarnings => "passed_with_warnings",
            CheckStatus::Warning => "warning",
            CheckStatus::Failed => "failed",
            CheckStatus::Error => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// CheckResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: String,
    pub status: CheckStatus,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    pub metrics: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn completed(
        check: impl Into<String>,
        issues: Vec<Issue>,
        suggestions: Vec<String>,
        metrics: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            check: check.into(),
            status: CheckStatus::from_issues(&issues),
            issues,
            suggestions,
            metrics,
            error: None,
        }
    }

    pub fn errored(check: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            status: CheckStatus::Error,
            issues: Vec::new(),
            suggestions: Vec::new(),
            metrics: BTreeMap::new(),
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// SeverityCounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn tally(issues: &[Issue]) -> Self {
        let mut counts = Self::default();
        for issue in issues {
            counts.add(issue.severity);
        }
        counts
    }

    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

// ---------------------------------------------------------------------------
// ValidationResult
// ---------------------------------------------------------------------------

/// The verdict of one profile run. Created once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub id: String,
    pub profile: String,
    pub passed: bool,
    /// Why the run failed; `None` when it passed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Most severe first; ties keep emission order.
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub checks: Vec<CheckResult>,
    pub counts: SeverityCounts,
    pub automatic: bool,
    #[serde(default)]
    pub metadata: RequestMetadata,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl ValidationResult {
    /// A result with no checks and no issues.
    pub fn empty(profile: impl Into<String>, passed: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            profile: profile.into(),
            passed,
            reason: None,
            issues: Vec::new(),
            suggestions: Vec::new(),
            metrics: BTreeMap::new(),
            checks: Vec::new(),
            counts: SeverityCounts::default(),
            automatic: false,
            metadata: RequestMetadata::default(),
            duration_ms: 0,
            completed_at: Utc::now(),
        }
    }

    /// A failed result for a run that produced no verdict.
    pub fn errored(profile: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::empty(profile, false);
        result.reason = Some(error.into());
        result
    }

    /// Stable sort, most severe first.
    pub fn sort_issues(issues: &mut [Issue]) {
        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.check == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_status_follows_worst_issue() {
        assert_eq!(CheckStatus::from_issues(&[]), CheckStatus::Passed);
        assert_eq!(
            CheckStatus::from_issues(&[Issue::new("style", Severity::Low, "x")]),
            CheckStatus::PassedWithWarnings
        );
        assert_eq!(
            CheckStatus::from_issues(&[
                Issue::new("style", Severity::Low, "x"),
                Issue::new("style", Severity::High, "y"),
            ]),
            CheckStatus::Warning
        );
        assert_eq!(
            CheckStatus::from_issues(&[
                Issue::new("syntax", Severity::Critical, "z"),
                Issue::new("syntax", Severity::High, "y"),
            ]),
            CheckStatus::Failed
        );
    }

    #[test]
    fn errored_check_has_no_issues() {
        let check = CheckResult::errored("syntax", "boom");
        assert_eq!(check.status, CheckStatus::Error);
        assert!(check.issues.is_empty());
        assert_eq!(check.error.as_deref(), Some("boom"));
    }

    #[test]
    fn errored_result_fails_with_reason() {
        let result = ValidationResult::errored("security", "validator missing");
        assert!(!result.passed);
        assert_eq!(result.reason.as_deref(), Some("validator missing"));
        assert!(result.checks.is_empty());
    }

    #[test]
    fn counts_tally_each_tier() {
        let issues = vec![
            Issue::new("a", Severity::Critical, "1"),
            Issue::new("a", Severity::Medium, "2"),
            Issue::new("a", Severity::Medium, "3"),
            Issue::new("a", Severity::Low, "4"),
        ];
        let counts = SeverityCounts::tally(&issues);
        assert_eq!(counts.count(Severity::Critical), 1);
        assert_eq!(counts.count(Severity::High), 0);
        assert_eq!(counts.count(Severity::Medium), 2);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn sort_issues_is_stable_and_most_severe_first() {
        let mut issues = vec![
            Issue::new("a", Severity::Low, "low-1"),
            Issue::new("a", Severity::High, "high-1"),
            Issue::new("a", Severity::Low, "low-2"),
            Issue::new("a", Severity::Critical, "crit"),
            Issue::new("a", Severity::High, "high-2"),
        ];
        ValidationResult::sort_issues(&mut issues);
        let order: Vec<_> = issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(order, vec!["crit", "high-1", "high-2", "low-1", "low-2"]);
    }
}
