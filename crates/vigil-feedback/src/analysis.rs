//! Analysis of a failed verdict's issues.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vigil_types::{Issue, Severity};

use crate::categorize::{categorize, IssueCategory};
use crate::patterns::{identify_patterns, IssuePattern};
use crate::plan::{action_template, estimate_effort};

const BASE_CONFIDENCE: f64 = 0.5;
const MAX_CONFIDENCE_BONUS: f64 = 0.3;
const COMPLEXITY_PENALTY: f64 = 0.1;

/// Issues that fell into one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub count: usize,
    /// Most severe issue in the group.
    pub severity: Severity,
    pub issues: Vec<Issue>,
}

/// One unit of repair work derived from a category group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionableItem {
    pub category: IssueCategory,
    pub action: String,
    pub description: String,
    pub capability: String,
    pub priority: Severity,
    pub issue_count: usize,
    pub issues: Vec<Issue>,
    pub estimated_effort: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackAnalysis {
    /// Some issue is high or critical.
    pub requires_refinement: bool,
    /// Highest urgent severity seen, `Low` when none.
    pub priority: Severity,
    pub categories: BTreeMap<IssueCategory, CategoryGroup>,
    pub patterns: Vec<IssuePattern>,
    pub actionable_items: Vec<ActionableItem>,
    pub estimated_effort: u32,
    pub confidence: f64,
}

impl FeedbackAnalysis {
    pub fn has_category(&self, category: IssueCategory) -> bool {
        self.categories.contains_key(&category)
    }
}

pub fn analyze(issues: &[Issue]) -> FeedbackAnalysis {
    let mut categories: BTreeMap<IssueCategory, CategoryGroup> = BTreeMap::new();
    let mut requires_refinement = false;
    let mut priority = Severity::Low;

    for issue in issues {
        let group = categories
            .entry(categorize(issue))
            .or_insert_with(|| CategoryGroup {
                count: 0,
                severity: issue.severity,
                issues: Vec::new(),
            });
        group.count += 1;
        group.severity = group.severity.max(issue.severity);
        group.issues.push(issue.clone());

        if issue.severity.is_urgent() {
            requires_refinement = true;
            priority = priority.max(issue.severity);
        }
    }

    let patterns = identify_patterns(issues);
    let actionable_items: Vec<ActionableItem> = categories
        .iter()
        .map(|(category, group)| {
            let template = action_template(*category);
            ActionableItem {
                category: *category,
                action: template.action.to_string(),
                description: template.description.to_string(),
                capability: template.capability.to_string(),
                priority: group.severity,
                issue_count: group.count,
                issues: group.issues.clone(),
                estimated_effort: estimate_effort(*category, group.count),
            }
        })
        .collect();
    let estimated_effort = actionable_items.iter().map(|i| i.estimated_effort).sum();

    let mut analysis = FeedbackAnalysis {
        requires_refinement,
        priority,
        categories,
        patterns,
        actionable_items,
        estimated_effort,
        confidence: 0.0,
    };
    analysis.confidence = confidence(&analysis);
    analysis
}

/// 0.5 base, up to +0.3 for patterns and actionable items, -0.1 when
/// structural or logic work is involved. Clamped to [0, 1].
fn confidence(analysis: &FeedbackAnalysis) -> f64 {
    let bonus = 0.1 * analysis.patterns.len().min(3) as f64
        + 0.1 * analysis.actionable_items.len().min(2) as f64;
    let mut score = BASE_CONFIDENCE + bonus.min(MAX_CONFIDENCE_BONUS);
    if analysis.has_category(IssueCategory::Structure) || analysis.has_category(IssueCategory::Logic)
    {
        score -= COMPLEXITY_PENALTY;
    }
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::IssueLocation;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_issue_set() {
        let analysis = analyze(&[]);
        assert!(!analysis.requires_refinement);
        assert_eq!(analysis.priority, Severity::Low);
        assert!(analysis.actionable_items.is_empty());
        assert_eq!(analysis.estimated_effort, 0);
        assert!(approx(analysis.confidence, 0.5));
    }

    #[test]
    fn medium_only_needs_no_refinement() {
        let analysis = analyze(&[Issue::new("style", Severity::Medium, "naming is off")]);
        assert!(!analysis.requires_refinement);
        assert_eq!(analysis.priority, Severity::Low);
        assert_eq!(analysis.actionable_items.len(), 1);
        assert_eq!(analysis.actionable_items[0].action, "format_code");
        assert_eq!(analysis.estimated_effort, 12);
        assert!(approx(analysis.confidence, 0.6));
    }

    #[test]
    fn groups_and_priority() {
        let issues = vec![
            Issue::new("design", Severity::Medium, "god object"),
            Issue::new("design", Severity::High, "tangled structure"),
            Issue::new("logic", Severity::Critical, "wrong branch in flow"),
        ];
        let analysis = analyze(&issues);
        assert!(analysis.requires_refinement);
        assert_eq!(analysis.priority, Severity::Critical);

        let structure = &analysis.categories[&IssueCategory::Structure];
        assert_eq!(structure.count, 2);
        assert_eq!(structure.severity, Severity::High);
        // structure 40 + 2*2, logic 20 + 2*1
        assert_eq!(analysis.estimated_effort, 66);
        // two items (+0.2), complex work (-0.1)
        assert!(approx(analysis.confidence, 0.6));
    }

    #[test]
    fn confidence_bonus_is_capped() {
        let issues: Vec<_> = (0..3)
            .map(|i| {
                Issue::new("style", Severity::High, format!("format rule {i} broken"))
                    .at(IssueLocation::file("src/lib.rs"))
            })
            .chain(std::iter::once(Issue::new("security", Severity::High, "auth bypass")))
            .collect();
        let analysis = analyze(&issues);
        // cluster + repeat (+0.2) and two items (+0.2), capped at +0.3
        assert_eq!(analysis.patterns.len(), 2);
        assert_eq!(analysis.actionable_items.len(), 2);
        assert!(approx(analysis.confidence, 0.8));
    }
}
