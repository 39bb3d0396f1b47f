//! Refinement plans: per-category action templates, effort estimates, and
//! the fixed dependency policy between stages.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_types::{Issue, Severity};

use crate::analysis::FeedbackAnalysis;
use crate::categorize::IssueCategory;
use crate::learning::LearningRecord;

pub const BUILDER: &str = "builder";
pub const ARCHITECT: &str = "architect";
pub const DOCUMENTER: &str = "documenter";

const EFFORT_PER_ISSUE: u32 = 2;

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTemplate {
    pub action: &'static str,
    pub description: &'static str,
    /// Stage-executor capability that performs the action.
    pub capability: &'static str,
}

const fn template(
    action: &'static str,
    description: &'static str,
    capability: &'static str,
) -> ActionTemplate {
    ActionTemplate {
        action,
        description,
        capability,
    }
}

pub fn action_template(category: IssueCategory) -> ActionTemplate {
    match category {
        IssueCategory::Syntax => template(
            "fix_syntax_errors",
            "Fix syntax errors and formatting issues",
            BUILDER,
        ),
        IssueCategory::Logic => template(
            "refactor_logic",
            "Refactor logic and improve algorithms",
            ARCHITECT,
        ),
        IssueCategory::Security => template(
            "patch_security",
            "Apply security patches and fixes",
            BUILDER,
        ),
        IssueCategory::Performance => template(
            "optimize_performance",
            "Optimize performance bottlenecks",
            ARCHITECT,
        ),
        IssueCategory::Style => template(
            "format_code",
            "Apply code formatting and style fixes",
            BUILDER,
        ),
        IssueCategory::Structure => template(
            "refactor_architecture",
            "Refactor architecture and design patterns",
            ARCHITECT,
        ),
        IssueCategory::Testing => template(
            "improve_tests",
            "Improve test coverage and quality",
            BUILDER,
        ),
        IssueCategory::Documentation => template(
            "update_documentation",
            "Update and improve documentation",
            DOCUMENTER,
        ),
        IssueCategory::Other => template(
            "general_improvement",
            "General code improvements",
            BUILDER,
        ),
    }
}

pub fn base_effort(category: IssueCategory) -> u32 {
    match category {
        IssueCategory::Syntax => 5,
        IssueCategory::Logic => 20,
        IssueCategory::Security => 30,
        IssueCategory::Performance => 25,
        IssueCategory::Style => 10,
        IssueCategory::Structure => 40,
        IssueCategory::Testing => 15,
        IssueCategory::Documentation => 10,
        IssueCategory::Other => 15,
    }
}

pub fn estimate_effort(category: IssueCategory, issue_count: usize) -> u32 {
    let count = u32::try_from(issue_count).unwrap_or(u32::MAX);
    base_effort(category).saturating_add(count.saturating_mul(EFFORT_PER_ISSUE))
}

/// The category whose stage must finish before `category` may start.
pub fn prerequisite(category: IssueCategory) -> Option<IssueCategory> {
    match category {
        IssueCategory::Logic => Some(IssueCategory::Structure),
        IssueCategory::Testing => Some(IssueCategory::Logic),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementStage {
    pub id: String,
    pub action: String,
    pub description: String,
    pub capability: String,
    pub category: IssueCategory,
    pub priority: Severity,
    pub issues: Vec<Issue>,
    /// Ids of stages that must complete first.
    pub dependencies: BTreeSet<String>,
    pub estimated_effort: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementPlan {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_id: Option<String>,
    pub priority: Severity,
    pub estimated_effort: u32,
    pub confidence: f64,
    /// Ordered by descending priority.
    pub stages: Vec<RefinementStage>,
    pub created_at: DateTime<Utc>,
}

impl RefinementPlan {
    pub fn stage(&self, id: &str) -> Option<&RefinementStage> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn stage_for(&self, category: IssueCategory) -> Option<&RefinementStage> {
        self.stages.iter().find(|s| s.category == category)
    }

    pub fn actions(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.action.clone()).collect()
    }
}

/// Build one stage per actionable item, sort by descending priority, then
/// wire dependencies. Within one priority, actions from the best strategy
/// recorded for this issue pattern come first in that strategy's order.
pub fn build_plan(analysis: &FeedbackAnalysis, hint: Option<&LearningRecord>) -> RefinementPlan {
    let mut stages: Vec<RefinementStage> = analysis
        .actionable_items
        .iter()
        .map(|item| RefinementStage {
            id: uuid::Uuid::new_v4().to_string(),
            action: item.action.clone(),
            description: item.description.clone(),
            capability: item.capability.clone(),
            category: item.category,
            priority: item.priority,
            issues: item.issues.clone(),
            dependencies: BTreeSet::new(),
            estimated_effort: item.estimated_effort,
        })
        .collect();

    let preferred: Vec<&str> = hint
        .and_then(|record| record.best_strategy.as_ref())
        .map(|strategy| strategy.actions.iter().map(String::as_str).collect())
        .unwrap_or_default();
    let rank = |action: &str| {
        preferred
            .iter()
            .position(|a| *a == action)
            .unwrap_or(preferred.len())
    };
    stages.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| rank(&a.action).cmp(&rank(&b.action)))
    });

    let ids: Vec<(IssueCategory, String)> =
        stages.iter().map(|s| (s.category, s.id.clone())).collect();
    for stage in &mut stages {
        if let Some(required) = prerequisite(stage.category) {
            stage.dependencies.extend(
                ids.iter()
                    .filter(|(category, _)| *category == required)
                    .map(|(_, id)| id.clone()),
            );
        }
    }

    // A plan is as urgent as its most urgent stage.
    let priority = stages
        .iter()
        .map(|s| s.priority)
        .max()
        .unwrap_or(analysis.priority);

    RefinementPlan {
        id: uuid::Uuid::new_v4().to_string(),
        validation_id: None,
        priority,
        estimated_effort: analysis.estimated_effort,
        confidence: analysis.confidence,
        stages,
        created_at: Utc::now(),
    }
}
