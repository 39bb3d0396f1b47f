//! Stage-executor capability trait and capability router.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vigil_types::{Issue, Result, Severity};

use crate::categorize::IssueCategory;
use crate::plan::{RefinementPlan, RefinementStage};

// ---------------------------------------------------------------------------
// Task and report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageContext {
    pub automatic: bool,
    pub priority: Severity,
}

/// The repair work handed to an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTask {
    pub plan_id: String,
    pub stage_id: String,
    pub action: String,
    pub description: String,
    pub category: IssueCategory,
    pub issues: Vec<Issue>,
    pub context: StageContext,
}

impl StageTask {
    pub fn for_stage(plan: &RefinementPlan, stage: &RefinementStage) -> Self {
        Self {
            plan_id: plan.id.clone(),
            stage_id: stage.id.clone(),
            action: stage.action.clone(),
            description: stage.description.clone(),
            category: stage.category,
            issues: stage.issues.clone(),
            context: StageContext {
                automatic: true,
                priority: stage.priority,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub detail: serde_json::Value,
}

fn default_success() -> bool {
    true
}

impl StageReport {
    pub fn succeeded(detail: serde_json::Value) -> Self {
        Self {
            success: true,
            detail,
        }
    }

    pub fn failed(detail: serde_json::Value) -> Self {
        Self {
            success: false,
            detail,
        }
    }
}

// ---------------------------------------------------------------------------
// StageExecutor trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Capability name plans refer to (e.g. "builder").
    fn capability(&self) -> &str;

    async fn execute(&self, task: &StageTask) -> Result<StageReport>;
}

// ---------------------------------------------------------------------------
// CapabilityRouter
// ---------------------------------------------------------------------------

/// Executors keyed by capability name.
#[derive(Clone, Default)]
pub struct CapabilityRouter {
    executors: HashMap<String, Arc<dyn StageExecutor>>,
}

impl CapabilityRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor, replacing any with the same capability.
    pub fn register(&mut self, executor: Arc<dyn StageExecutor>) {
        let capability = executor.capability().to_string();
        tracing::info!(capability = %capability, "Stage executor registered");
        self.executors.insert(capability, executor);
    }

    pub fn unregister(&mut self, capability: &str) -> bool {
        self.executors.remove(capability).is_some()
    }

    pub fn get(&self, capability: &str) -> Option<Arc<dyn StageExecutor>> {
        self.executors.get(capability).cloned()
    }

    pub fn capabilities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl StageExecutor for Named {
        fn capability(&self) -> &str {
            self.0
        }

        async fn execute(&self, _task: &StageTask) -> Result<StageReport> {
            Ok(StageReport::succeeded(serde_json::Value::Null))
        }
    }

    #[test]
    fn routes_by_capability() {
        let mut router = CapabilityRouter::new();
        router.register(Arc::new(Named("builder")));
        router.register(Arc::new(Named("architect")));
        router.register(Arc::new(Named("builder")));

        assert_eq!(router.len(), 2);
        assert_eq!(router.capabilities(), vec!["architect", "builder"]);
        assert!(router.get("documenter").is_none());
        assert!(router.unregister("architect"));
        assert!(router.get("architect").is_none());
    }

    #[test]
    fn report_defaults_to_success() {
        let report: StageReport = serde_json::from_str(r#"{"detail": "ok"}"#).unwrap();
        assert!(report.success);
        let report: StageReport = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!report.success);
        assert!(report.detail.is_null());
    }
}
