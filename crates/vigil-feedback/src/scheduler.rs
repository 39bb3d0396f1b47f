//! Topological stage scheduler with bounded parallelism.
//!
//! Each round takes up to `max_parallel` stages whose prerequisites have all
//! completed and runs them concurrently. A stage counts as completed whether
//! or not its executor reported success; the failure is kept in its outcome.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use vigil_types::{EventEmitter, GateEvent, Result, VigilError};

use crate::categorize::IssueCategory;
use crate::executor::{CapabilityRouter, StageExecutor, StageTask};
use crate::plan::{RefinementPlan, RefinementStage};

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOptions {
    pub max_parallel: usize,
    pub stage_timeout: Duration,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            stage_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage_id: String,
    pub action: String,
    pub category: IssueCategory,
    pub success: bool,
    #[serde(default)]
    pub detail: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// A plan that ran to the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementResult {
    pub plan_id: String,
    /// At least one stage succeeded.
    pub success: bool,
    /// Outcomes in completion order.
    pub stages: Vec<StageOutcome>,
    pub improvement_score: f64,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

/// Fraction of stages that reported success; zero for an empty plan.
pub fn improvement_score(outcomes: &[StageOutcome]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    let succeeded = outcomes.iter().filter(|o| o.success).count();
    succeeded as f64 / outcomes.len() as f64
}

/// Fail if some stages can never become ready, either through a cycle or a
/// prerequisite that is not part of the plan.
pub fn check_acyclic(plan: &RefinementPlan) -> Result<()> {
    let mut done: HashSet<&str> = HashSet::new();
    loop {
        let ready: Vec<&str> = plan
            .stages
            .iter()
            .filter(|s| !done.contains(s.id.as_str()) && is_ready(s, &done))
            .map(|s| s.id.as_str())
            .collect();
        if ready.is_empty() {
            break;
        }
        done.extend(ready);
    }

    let remaining = plan.stages.len() - done.len();
    if remaining > 0 {
        return Err(VigilError::CircularDependency {
            plan_id: plan.id.clone(),
            remaining,
        });
    }
    Ok(())
}

fn is_ready<S: std::borrow::Borrow<str> + Eq + std::hash::Hash>(
    stage: &RefinementStage,
    done: &HashSet<S>,
) -> bool {
    stage.dependencies.iter().all(|d| done.contains(d.as_str()))
}

/// Run every stage of `plan` in dependency order. Nothing runs when the plan
/// cannot complete.
pub async fn schedule_plan(
    plan: &RefinementPlan,
    router: &CapabilityRouter,
    options: &ScheduleOptions,
    emitter: &EventEmitter,
) -> Result<Vec<StageOutcome>> {
    check_acyclic(plan)?;

    let max_parallel = options.max_parallel.max(1);
    let mut completed: HashSet<String> = HashSet::new();
    let mut outcomes = Vec::with_capacity(plan.stages.len());

    while completed.len() < plan.stages.len() {
        let ready: Vec<&RefinementStage> = plan
            .stages
            .iter()
            .filter(|s| !completed.contains(&s.id) && is_ready(s, &completed))
            .take(max_parallel)
            .collect();
        if ready.is_empty() {
            return Err(VigilError::CircularDependency {
                plan_id: plan.id.clone(),
                remaining: plan.stages.len() - completed.len(),
            });
        }

        tracing::debug!(plan_id = %plan.id, batch = ready.len(), "Running refinement stages");
        let mut set = JoinSet::new();
        for (index, stage) in ready.iter().enumerate() {
            let executor = router.get(&stage.capability);
            let task = StageTask::for_stage(plan, stage);
            let capability = stage.capability.clone();
            let timeout = options.stage_timeout;
            set.spawn(async move { (index, run_stage(executor, capability, task, timeout).await) });
        }

        let mut batch: Vec<Option<StageOutcome>> = vec![None; ready.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => batch[index] = Some(outcome),
                Err(e) => tracing::error!(plan_id = %plan.id, error = %e, "Stage task panicked"),
            }
        }

        for (stage, outcome) in ready.iter().zip(batch) {
            let outcome = outcome.unwrap_or_else(|| StageOutcome {
                stage_id: stage.id.clone(),
                action: stage.action.clone(),
                category: stage.category,
                success: false,
                detail: serde_json::Value::Null,
                error: Some("stage task panicked".into()),
                duration_ms: 0,
            });
            tracing::info!(
                plan_id = %plan.id,
                stage = %outcome.action,
                success = outcome.success,
                duration_ms = outcome.duration_ms,
                "Refinement stage completed"
            );
            emitter.emit(GateEvent::RefinementStageCompleted {
                plan_id: plan.id.clone(),
                stage_id: outcome.stage_id.clone(),
                action: outcome.action.clone(),
                success: outcome.success,
            });
            completed.insert(stage.id.clone());
            outcomes.push(outcome);
        }
    }

    Ok(outcomes)
}

async fn run_stage(
    executor: Option<Arc<dyn StageExecutor>>,
    capability: String,
    task: StageTask,
    timeout: Duration,
) -> StageOutcome {
    let start = Instant::now();
    let result = match executor {
        None => Err(VigilError::StageExecution {
            stage: task.action.clone(),
            message: format!("no executor for capability '{capability}'"),
        }),
        Some(executor) => match tokio::time::timeout(timeout, executor.execute(&task)).await {
            Ok(result) => result,
            Err(_) => Err(VigilError::StageExecution {
                stage: task.action.clone(),
                message: format!("timed out after {}ms", timeout.as_millis()),
            }),
        },
    };

    let (success, detail, error) = match result {
        Ok(report) => (report.success, report.detail, None),
        Err(e) => {
            tracing::warn!(
                plan_id = %task.plan_id,
                stage = %task.action,
                capability = %capability,
                error = %e,
                "Refinement stage failed"
            );
            (false, serde_json::Value::Null, Some(e.to_string()))
        }
    };

    StageOutcome {
        stage_id: task.stage_id,
        action: task.action,
        category: task.category,
        success,
        detail,
        error,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StageReport;
    use crate::plan::BUILDER;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_types::Severity;

    /// Tracks the highest number of concurrently running stages.
    struct Gauge {
        running: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<String>>,
        fail: &'static str,
    }

    #[async_trait]
    impl StageExecutor for Gauge {
        fn capability(&self) -> &str {
            BUILDER
        }

        async fn execute(&self, task: &StageTask) -> Result<StageReport> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.order.lock().push(task.action.clone());
            if task.action == self.fail {
                return Ok(StageReport::failed(serde_json::json!("could not fix")));
            }
            Ok(StageReport::succeeded(serde_json::Value::Null))
        }
    }

    fn gauge(fail: &'static str) -> Arc<Gauge> {
        Arc::new(Gauge {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            order: Mutex::new(Vec::new()),
            fail,
        })
    }

    fn stage(id: &str, deps: &[&str]) -> RefinementStage {
        RefinementStage {
            id: id.into(),
            action: id.into(),
            description: String::new(),
            capability: BUILDER.into(),
            category: IssueCategory::Other,
            priority: Severity::High,
            issues: vec![],
            dependencies: deps.iter().map(|d| d.to_string()).collect::<BTreeSet<_>>(),
            estimated_effort: 0,
        }
    }

    fn plan(stages: Vec<RefinementStage>) -> RefinementPlan {
        RefinementPlan {
            id: "plan-1".into(),
            validation_id: None,
            priority: Severity::High,
            estimated_effort: 0,
            confidence: 0.5,
            stages,
            created_at: Utc::now(),
        }
    }

    fn router(executor: Arc<Gauge>) -> CapabilityRouter {
        let mut router = CapabilityRouter::new();
        router.register(executor);
        router
    }

    #[tokio::test(start_paused = true)]
    async fn parallelism_is_bounded() {
        let executor = gauge("");
        let plan = plan((0..7).map(|i| stage(&format!("s{i}"), &[])).collect());
        let outcomes = schedule_plan(
            &plan,
            &router(executor.clone()),
            &ScheduleOptions::default(),
            &EventEmitter::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcomes.len(), 7);
        assert_eq!(executor.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dependencies_run_first_and_failures_still_complete() {
        let executor = gauge("a");
        let plan = plan(vec![stage("c", &["b"]), stage("b", &["a"]), stage("a", &[])]);
        let outcomes = schedule_plan(
            &plan,
            &router(executor.clone()),
            &ScheduleOptions::default(),
            &EventEmitter::default(),
        )
        .await
        .unwrap();
        assert_eq!(*executor.order.lock(), vec!["a", "b", "c"]);
        assert!(!outcomes[0].success);
        assert!(outcomes[1].success && outcomes[2].success);
        assert!((improvement_score(&outcomes) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_runs_nothing() {
        let executor = gauge("");
        let plan = plan(vec![stage("free", &[]), stage("x", &["y"]), stage("y", &["x"])]);
        let err = schedule_plan(
            &plan,
            &router(executor.clone()),
            &ScheduleOptions::default(),
            &EventEmitter::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            VigilError::CircularDependency { remaining: 2, .. }
        ));
        assert!(executor.order.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_capability_and_timeout_fail_the_stage() {
        let mut orphan = stage("orphan", &[]);
        orphan.capability = "documenter".into();
        let plan = plan(vec![orphan, stage("slow", &[])]);
        let options = ScheduleOptions {
            max_parallel: 3,
            stage_timeout: Duration::from_millis(10),
        };
        let outcomes = schedule_plan(&plan, &router(gauge("")), &options, &EventEmitter::default())
            .await
            .unwrap();
        assert!(outcomes.iter().all(|o| !o.success));
        assert!(outcomes[0].error.as_deref().unwrap().contains("documenter"));
        assert!(outcomes[1].error.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn unknown_prerequisite_is_stuck() {
        let plan = plan(vec![stage("a", &["ghost"])]);
        assert!(matches!(
            check_acyclic(&plan),
            Err(VigilError::CircularDependency { remaining: 1, .. })
        ));
    }
}
