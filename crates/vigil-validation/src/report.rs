//! Summaries built from the orchestrator's history ring.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_types::{CheckStatus, Issue, Severity, ValidationResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_checks: usize,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub errored_checks: usize,
    pub total_issues: usize,
}

/// A quick per-type repair estimate for urgent issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageTask {
    pub kind: String,
    pub priority: Severity,
    pub issue_count: usize,
    /// Minutes.
    pub estimated_effort: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Triage {
    pub requires_refinement: bool,
    pub tasks: Vec<TriageTask>,
    pub estimated_effort: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub profile: String,
    pub passed: bool,
    pub reason: Option<String>,
    pub duration_ms: u64,
    pub summary: ReportSummary,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub triage: Triage,
}

impl ValidationReport {
    pub fn from_result(result: &ValidationResult) -> Self {
        let count = |status: CheckStatus| result.checks.iter().filter(|c| c.status == status).count();
        Self {
            id: result.id.clone(),
            timestamp: result.completed_at,
            profile: result.profile.clone(),
            passed: result.passed,
            reason: result.reason.clone(),
            duration_ms: result.duration_ms,
            summary: ReportSummary {
                total_checks: result.checks.len(),
                passed_checks: count(CheckStatus::Passed),
                failed_checks: count(CheckStatus::Failed),
                errored_checks: count(CheckStatus::Error),
                total_issues: result.issues.len(),
            },
            issues: result.issues.clone(),
            suggestions: result.suggestions.clone(),
            metrics: result.metrics.clone(),
            triage: triage(&result.issues),
        }
    }
}

fn effort_minutes(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 60,
        Severity::High => 30,
        Severity::Medium => 15,
        Severity::Low => 5,
    }
}

/// Group issues by kind; every group holding a high or critical issue
/// becomes a task, most urgent first.
pub fn triage(issues: &[Issue]) -> Triage {
    let mut groups: BTreeMap<&str, Vec<&Issue>> = BTreeMap::new();
    for issue in issues {
        groups.entry(issue.kind.as_str()).or_default().push(issue);
    }

    let mut tasks: Vec<TriageTask> = groups
        .into_iter()
        .filter_map(|(kind, group)| {
            let worst = group.iter().map(|i| i.severity).max()?;
            if !worst.is_urgent() {
                return None;
            }
            Some(TriageTask {
                kind: kind.to_string(),
                priority: worst,
                issue_count: group.len(),
                estimated_effort: group.iter().map(|i| effort_minutes(i.severity)).sum(),
            })
        })
        .collect();
    tasks.sort_by(|a, b| b.priority.cmp(&a.priority));

    Triage {
        requires_refinement: !tasks.is_empty(),
        estimated_effort: tasks.iter().map(|t| t.estimated_effort).sum(),
        tasks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triage_skips_groups_without_urgent_issues() {
        let issues = vec![
            Issue::new("style", Severity::Low, "spacing"),
            Issue::new("style", Severity::Medium, "naming"),
        ];
        let t = triage(&issues);
        assert!(!t.requires_refinement);
        assert!(t.tasks.is_empty());
        assert_eq!(t.estimated_effort, 0);
    }

    #[test]
    fn triage_orders_by_priority_and_sums_effort() {
        let issues = vec![
            Issue::new("complexity", Severity::High, "deep nesting"),
            Issue::new("syntax", Severity::Critical, "missing brace"),
            Issue::new("syntax", Severity::Low, "stray semicolon"),
        ];
        let t = triage(&issues);
        assert_eq!(t.tasks.len(), 2);
        assert_eq!(t.tasks[0].kind, "syntax");
        assert_eq!(t.tasks[0].priority, Severity::Critical);
        assert_eq!(t.tasks[0].estimated_effort, 65);
        assert_eq!(t.tasks[1].estimated_effort, 30);
        assert_eq!(t.estimated_effort, 95);
    }
}
