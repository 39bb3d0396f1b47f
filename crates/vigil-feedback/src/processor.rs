//! The feedback processor.
//!
//! Turns a failed verdict into an analysis and, when refinement is warranted,
//! a dependency-ordered plan that is executed through the stage-executor
//! capabilities. Each finished plan is folded into the learning store.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use vigil_types::{EventEmitter, GateEvent, Result, ValidationResult};

use crate::analysis::{analyze, FeedbackAnalysis};
use crate::executor::{CapabilityRouter, StageExecutor};
use crate::learning::{signature, LearningInsights, LearningStore};
use crate::plan::{build_plan, RefinementPlan};
use crate::scheduler::{improvement_score, schedule_plan, RefinementResult, ScheduleOptions};

// ---------------------------------------------------------------------------
// Config, options, outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Execute plans immediately rather than handing them back.
    pub auto_refine: bool,
    pub max_parallel_stages: usize,
    #[serde(with = "vigil_types::duration_serde")]
    pub stage_timeout: Duration,
    /// Capacity of the refinement history ring.
    pub history_limit: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            auto_refine: true,
            max_parallel_stages: 3,
            stage_timeout: Duration::from_secs(120),
            history_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackOptions {
    /// Plan even for a passing verdict or one with no urgent issues.
    pub force_refine: bool,
    /// Overrides [`FeedbackConfig::auto_refine`] for this call.
    pub auto_refine: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    pub feedback_id: String,
    pub validation_id: String,
    pub analysis: FeedbackAnalysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<RefinementPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement: Option<RefinementResult>,
    /// A plan was built but left for someone to carry out.
    pub requires_manual_action: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStatistics {
    pub total_feedback: u64,
    pub processed_feedback: u64,
    pub refinement_cycles: u64,
    pub successful_refinements: u64,
    pub failed_refinements: u64,
    pub average_improvement: f64,
    pub active_refinements: usize,
    pub learning_patterns: usize,
    pub history_size: usize,
}

#[derive(Default)]
struct Totals {
    total_feedback: u64,
    processed_feedback: u64,
    refinement_cycles: u64,
    successful_refinements: u64,
    failed_refinements: u64,
    average_improvement: f64,
}

// ---------------------------------------------------------------------------
// FeedbackProcessor
// ---------------------------------------------------------------------------

pub struct FeedbackProcessor {
    config: FeedbackConfig,
    router: RwLock<CapabilityRouter>,
    learning: LearningStore,
    emitter: EventEmitter,
    totals: Mutex<Totals>,
    history: Mutex<VecDeque<RefinementResult>>,
    active: Mutex<HashSet<String>>,
}

impl FeedbackProcessor {
    pub fn new(config: FeedbackConfig, emitter: EventEmitter) -> Self {
        Self {
            config,
            router: RwLock::new(CapabilityRouter::new()),
            learning: LearningStore::new(),
            emitter,
            totals: Mutex::new(Totals::default()),
            history: Mutex::new(VecDeque::new()),
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    pub fn register_executor(&self, executor: Arc<dyn StageExecutor>) {
        self.router.write().register(executor);
    }

    pub fn unregister_executor(&self, capability: &str) -> bool {
        self.router.write().unregister(capability)
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.router.read().capabilities()
    }

    // -- feedback -----------------------------------------------------------

    /// Analyze a verdict and, if warranted, plan and run a refinement.
    ///
    /// A plan is built when the verdict failed with high or critical issues,
    /// or when `force_refine` is set. It is executed when auto-refine is on;
    /// otherwise it is returned with `requires_manual_action` set.
    pub async fn process_feedback(
        &self,
        result: &ValidationResult,
        options: FeedbackOptions,
    ) -> Result<FeedbackOutcome> {
        let start = Instant::now();
        let feedback_id = uuid::Uuid::new_v4().to_string();
        self.totals.lock().total_feedback += 1;

        self.emitter.emit(GateEvent::FeedbackReceived {
            id: feedback_id.clone(),
            validation_id: result.id.clone(),
            issue_count: result.issues.len(),
        });
        tracing::info!(
            validation_id = %result.id,
            profile = %result.profile,
            passed = result.passed,
            issues = result.issues.len(),
            "Processing feedback"
        );

        let analysis = analyze(&result.issues);
        let wants_refinement =
            options.force_refine || (!result.passed && analysis.requires_refinement);

        let mut outcome = FeedbackOutcome {
            feedback_id,
            validation_id: result.id.clone(),
            analysis,
            plan: None,
            refinement: None,
            requires_manual_action: false,
            duration_ms: 0,
        };

        if !wants_refinement {
            self.totals.lock().processed_feedback += 1;
            tracing::debug!(validation_id = %result.id, "No refinement required");
            outcome.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(outcome);
        }

        let pattern = signature(&result.issues);
        let hint = self.learning.get(&pattern);
        let mut plan = build_plan(&outcome.analysis, hint.as_ref());
        plan.validation_id = Some(result.id.clone());
        tracing::info!(
            validation_id = %result.id,
            plan_id = %plan.id,
            stages = plan.stages.len(),
            effort = plan.estimated_effort,
            confidence = plan.confidence,
            "Refinement plan created"
        );

        if options.auto_refine.unwrap_or(self.config.auto_refine) {
            let refinement = self.execute_plan(&plan).await?;
            self.learning.record(&pattern, &refinement);
            outcome.refinement = Some(refinement);
        } else {
            outcome.requires_manual_action = true;
        }
        outcome.plan = Some(plan);
        outcome.duration_ms = start.elapsed().as_millis() as u64;
        Ok(outcome)
    }

    /// Run every stage of `plan`. A cyclic plan fails without running any
    /// stage; otherwise the result records each stage's outcome.
    pub async fn execute_plan(&self, plan: &RefinementPlan) -> Result<RefinementResult> {
        let start = Instant::now();
        self.active.lock().insert(plan.id.clone());
        self.totals.lock().refinement_cycles += 1;
        self.emitter.emit(GateEvent::RefinementStarted {
            plan_id: plan.id.clone(),
            stage_count: plan.stages.len(),
        });
        tracing::info!(plan_id = %plan.id, stages = plan.stages.len(), "Refinement started");

        let router = self.router.read().clone();
        let options = ScheduleOptions {
            max_parallel: self.config.max_parallel_stages,
            stage_timeout: self.config.stage_timeout,
        };
        let scheduled = schedule_plan(plan, &router, &options, &self.emitter).await;
        self.active.lock().remove(&plan.id);

        let stages = match scheduled {
            Ok(stages) => stages,
            Err(e) => {
                self.totals.lock().failed_refinements += 1;
                self.emitter.emit(GateEvent::RefinementFailed {
                    plan_id: plan.id.clone(),
                    error: e.to_string(),
                });
                tracing::error!(plan_id = %plan.id, error = %e, "Refinement failed");
                return Err(e);
            }
        };

        let score = improvement_score(&stages);
        let result = RefinementResult {
            plan_id: plan.id.clone(),
            success: score > 0.0,
            stages,
            improvement_score: score,
            duration_ms: start.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        };
        self.record(&result);

        self.emitter.emit(GateEvent::RefinementCompleted {
            plan_id: result.plan_id.clone(),
            improvement_score: result.improvement_score,
            duration_ms: result.duration_ms,
        });
        tracing::info!(
            plan_id = %result.plan_id,
            success = result.success,
            improvement = result.improvement_score,
            duration_ms = result.duration_ms,
            "Refinement completed"
        );
        Ok(result)
    }

    fn record(&self, result: &RefinementResult) {
        {
            let mut totals = self.totals.lock();
            totals.processed_feedback += 1;
            if result.success {
                totals.successful_refinements += 1;
                let n = totals.successful_refinements as f64;
                totals.average_improvement =
                    (totals.average_improvement * (n - 1.0) + result.improvement_score) / n;
            } else {
                totals.failed_refinements += 1;
            }
        }

        let mut history = self.history.lock();
        history.push_back(result.clone());
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    // -- introspection ------------------------------------------------------

    pub fn statistics(&self) -> FeedbackStatistics {
        let totals = self.totals.lock();
        FeedbackStatistics {
            total_feedback: totals.total_feedback,
            processed_feedback: totals.processed_feedback,
            refinement_cycles: totals.refinement_cycles,
            successful_refinements: totals.successful_refinements,
            failed_refinements: totals.failed_refinements,
            average_improvement: totals.average_improvement,
            active_refinements: self.active.lock().len(),
            learning_patterns: self.learning.len(),
            history_size: self.history.lock().len(),
        }
    }

    /// A finished refinement still in the history ring.
    pub fn refinement(&self, plan_id: &str) -> Option<RefinementResult> {
        self.history
            .lock()
            .iter()
            .find(|r| r.plan_id == plan_id)
            .cloned()
    }

    pub fn learning(&self) -> &LearningStore {
        &self.learning
    }

    pub fn learning_insights(&self) -> LearningInsights {
        self.learning.insights()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::IssueCategory;
    use crate::executor::{StageReport, StageTask};
    use crate::plan::{ARCHITECT, BUILDER};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_types::{Issue, Severity, VigilError};

    struct Succeeds {
        capability: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StageExecutor for Succeeds {
        fn capability(&self) -> &str {
            self.capability
        }

        async fn execute(&self, _task: &StageTask) -> Result<StageReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StageReport::succeeded(serde_json::Value::Null))
        }
    }

    fn processor(config: FeedbackConfig) -> (FeedbackProcessor, Arc<Succeeds>) {
        let processor = FeedbackProcessor::new(config, EventEmitter::default());
        let builder = Arc::new(Succeeds {
            capability: BUILDER,
            calls: AtomicUsize::new(0),
        });
        processor.register_executor(builder.clone());
        processor.register_executor(Arc::new(Succeeds {
            capability: ARCHITECT,
            calls: AtomicUsize::new(0),
        }));
        (processor, builder)
    }

    fn failed(issues: Vec<Issue>) -> ValidationResult {
        let mut result = ValidationResult::empty("code_quality", false);
        result.issues = issues;
        result
    }

    // Test 1: passing verdicts are analyzed but not refined
    #[tokio::test]
    async fn passing_verdict_is_not_refined() {
        let (processor, builder) = processor(FeedbackConfig::default());
        let mut result = failed(vec![Issue::new("security", Severity::High, "auth issue")]);
        result.passed = true;

        let outcome = processor
            .process_feedback(&result, FeedbackOptions::default())
            .await
            .unwrap();
        assert!(outcome.plan.is_none());
        assert!(outcome.analysis.requires_refinement);
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(processor.statistics().processed_feedback, 1);
    }

    // Test 2: failed verdict with urgent issues is planned and executed
    #[tokio::test]
    async fn failed_verdict_is_refined() {
        let (processor, builder) = processor(FeedbackConfig::default());
        let result = failed(vec![
            Issue::new("security", Severity::Critical, "sql injection"),
            Issue::new("style", Severity::Low, "naming"),
        ]);

        let outcome = processor
            .process_feedback(&result, FeedbackOptions::default())
            .await
            .unwrap();
        let plan = outcome.plan.unwrap();
        assert_eq!(plan.validation_id.as_deref(), Some(result.id.as_str()));
        assert_eq!(plan.stages[0].category, IssueCategory::Security);

        let refinement = outcome.refinement.unwrap();
        assert!(refinement.success);
        assert!((refinement.improvement_score - 1.0).abs() < 1e-9);
        assert_eq!(builder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(processor.refinement(&plan.id), Some(refinement));

        let stats = processor.statistics();
        assert_eq!(stats.refinement_cycles, 1);
        assert_eq!(stats.successful_refinements, 1);
        assert_eq!(stats.learning_patterns, 1);
        assert_eq!(stats.active_refinements, 0);
    }

    // Test 3: manual mode returns the plan without running it
    #[tokio::test]
    async fn manual_mode_returns_plan() {
        let (processor, builder) = processor(FeedbackConfig::default());
        let result = failed(vec![Issue::new("logic", Severity::High, "wrong flow")]);
        let outcome = processor
            .process_feedback(
                &result,
                FeedbackOptions {
                    force_refine: false,
                    auto_refine: Some(false),
                },
            )
            .await
            .unwrap();
        assert!(outcome.requires_manual_action);
        assert!(outcome.plan.is_some());
        assert!(outcome.refinement.is_none());
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(processor.statistics().refinement_cycles, 0);
    }

    // Test 4: force_refine plans even without urgent issues
    #[tokio::test]
    async fn force_refine_overrides_verdict() {
        let (processor, builder) = processor(FeedbackConfig::default());
        let mut result = failed(vec![Issue::new("style", Severity::Low, "format nit")]);
        result.passed = true;
        let outcome = processor
            .process_feedback(
                &result,
                FeedbackOptions {
                    force_refine: true,
                    auto_refine: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.refinement.unwrap().stages.len(), 1);
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
    }

    // Test 5: a cyclic plan fails and is counted
    #[tokio::test]
    async fn cyclic_plan_fails() {
        let (processor, builder) = processor(FeedbackConfig::default());
        let analysis = analyze(&[
            Issue::new("style", Severity::High, "naming"),
            Issue::new("coverage", Severity::High, "missing test"),
        ]);
        let mut plan = build_plan(&analysis, None);
        let a = plan.stages[0].id.clone();
        let b = plan.stages[1].id.clone();
        plan.stages[0].dependencies = BTreeSet::from([b]);
        plan.stages[1].dependencies = BTreeSet::from([a]);

        let err = processor.execute_plan(&plan).await.unwrap_err();
        assert!(matches!(err, VigilError::CircularDependency { .. }));
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(processor.statistics().failed_refinements, 1);
        assert!(processor.refinement(&plan.id).is_none());
    }
}
