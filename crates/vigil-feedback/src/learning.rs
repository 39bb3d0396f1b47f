//! Per-pattern record of how past refinements went.
//!
//! Records only bias the ordering of future plans. An empty store yields
//! plans identical to the static templates.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use vigil_types::Issue;

use crate::categorize::categorize;
use crate::scheduler::RefinementResult;

const TOP_PATTERNS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub actions: Vec<String>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LearningRecord {
    pub occurrences: u64,
    pub successful_refinements: u64,
    pub average_improvement: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_strategy: Option<Strategy>,
}

impl LearningRecord {
    pub fn success_rate(&self) -> f64 {
        if self.occurrences == 0 {
            return 0.0;
        }
        self.successful_refinements as f64 / self.occurrences as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInsight {
    pub pattern: String,
    pub occurrences: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyInsight {
    pub pattern: String,
    pub strategy: Strategy,
    pub improvement: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LearningInsights {
    pub total_patterns: usize,
    pub most_common_patterns: Vec<PatternInsight>,
    pub best_strategies: Vec<StrategyInsight>,
}

/// Category counts as `cat:n`, sorted by category name and comma-joined.
pub fn signature(issues: &[Issue]) -> String {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for issue in issues {
        *counts.entry(categorize(issue).as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(category, count)| format!("{category}:{count}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
pub struct LearningStore {
    records: Mutex<HashMap<String, LearningRecord>>,
}

impl LearningStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished refinement into the record for `signature`. Call
    /// exactly once per completed plan.
    pub fn record(&self, signature: &str, result: &RefinementResult) {
        let mut records = self.records.lock();
        let record = records.entry(signature.to_string()).or_default();
        record.occurrences += 1;
        if !result.success {
            return;
        }

        record.successful_refinements += 1;
        let n = record.successful_refinements as f64;
        record.average_improvement =
            (record.average_improvement * (n - 1.0) + result.improvement_score) / n;

        let better = record
            .best_strategy
            .as_ref()
            .map_or(true, |best| result.improvement_score > best.score);
        if better {
            record.best_strategy = Some(Strategy {
                actions: result.stages.iter().map(|s| s.action.clone()).collect(),
                score: result.improvement_score,
            });
        }
    }

    pub fn get(&self, signature: &str) -> Option<LearningRecord> {
        self.records.lock().get(signature).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most frequent patterns and the best strategy known for each.
    pub fn insights(&self) -> LearningInsights {
        let records = self.records.lock();
        let mut ranked: Vec<(&String, &LearningRecord)> = records.iter().collect();
        ranked.sort_by(|(a_pattern, a), (b_pattern, b)| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a_pattern.cmp(b_pattern))
        });
        ranked.truncate(TOP_PATTERNS);

        LearningInsights {
            total_patterns: records.len(),
            most_common_patterns: ranked
                .iter()
                .map(|(pattern, record)| PatternInsight {
                    pattern: (*pattern).clone(),
                    occurrences: record.occurrences,
                    success_rate: record.success_rate(),
                })
                .collect(),
            best_strategies: ranked
                .iter()
                .filter_map(|(pattern, record)| {
                    record.best_strategy.as_ref().map(|strategy| StrategyInsight {
                        pattern: (*pattern).clone(),
                        strategy: strategy.clone(),
                        improvement: record.average_improvement,
                    })
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::IssueCategory;
    use crate::scheduler::StageOutcome;
    use vigil_types::Severity;

    fn result(score: f64, actions: &[&str]) -> RefinementResult {
        RefinementResult {
            plan_id: "p".into(),
            success: score > 0.0,
            stages: actions
                .iter()
                .map(|a| StageOutcome {
                    stage_id: format!("s-{a}"),
                    action: a.to_string(),
                    category: IssueCategory::Other,
                    success: true,
                    detail: serde_json::Value::Null,
                    error: None,
                    duration_ms: 0,
                })
                .collect(),
            improvement_score: score,
            duration_ms: 0,
            completed_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn signature_is_sorted_category_counts() {
        let issues = vec![
            Issue::new("logic", Severity::High, "x"),
            Issue::new("design", Severity::High, "y"),
            Issue::new("design", Severity::High, "z"),
        ];
        assert_eq!(signature(&issues), "logic:1,structure:2");
        assert_eq!(signature(&[]), "");
    }

    #[test]
    fn record_counts_each_completion_once() {
        let store = LearningStore::new();
        store.record("logic:1", &result(0.5, &["refactor_logic"]));
        store.record("logic:1", &result(1.0, &["refactor_logic", "improve_tests"]));
        store.record("logic:1", &result(0.0, &[]));

        let record = store.get("logic:1").unwrap();
        assert_eq!(record.occurrences, 3);
        assert_eq!(record.successful_refinements, 2);
        assert!((record.average_improvement - 0.75).abs() < 1e-9);
        let best = record.best_strategy.unwrap();
        assert_eq!(best.actions, vec!["refactor_logic", "improve_tests"]);
        assert!((best.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn insights_rank_by_occurrences() {
        let store = LearningStore::new();
        for i in 0..7 {
            for _ in 0..=i {
                store.record(&format!("style:{i}"), &result(0.0, &[]));
            }
        }
        store.record("style:6", &result(1.0, &["format_code"]));

        let insights = store.insights();
        assert_eq!(insights.total_patterns, 7);
        let top: Vec<_> = insights
            .most_common_patterns
            .iter()
            .map(|p| p.pattern.as_str())
            .collect();
        assert_eq!(top, vec!["style:6", "style:5", "style:4", "style:3", "style:2"]);
        assert_eq!(insights.best_strategies.len(), 1);
        assert_eq!(insights.best_strategies[0].pattern, "style:6");
        assert!((insights.most_common_patterns[0].success_rate - 0.125).abs() < 1e-9);
    }
}
