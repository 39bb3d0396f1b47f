//! The check orchestrator.
//!
//! Runs a named profile against a target: obtains the profile's validator,
//! binds it read-only, executes each check in order under a timeout, then
//! aggregates the per-check results and applies the severity thresholds.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use vigil_types::{
    CheckResult, EventEmitter, GateEvent, Result, SeverityCounts, Target, ValidationRequest,
    ValidationResult, VigilError,
};

use crate::profiles::{check_strategy, default_profiles, ValidationProfile};
use crate::report::ValidationReport;
use crate::safeguard::{bind_validator, BoundValidator};
use crate::thresholds::{evaluate_verdict, SeverityThresholds};
use crate::validator::{CheckTask, Restrictions, Validator, ValidatorRegistry};

// ---------------------------------------------------------------------------
// Config and metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Medium-tier threshold gates only in strict mode.
    pub strict_mode: bool,
    /// Per-check validator timeout.
    #[serde(with = "vigil_types::duration_serde")]
    pub timeout: Duration,
    pub thresholds: SeverityThresholds,
    /// Whether the low-tier threshold gates at all.
    pub gate_low: bool,
    /// Capacity of the history ring.
    pub history_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            timeout: Duration::from_secs(30),
            thresholds: SeverityThresholds::default(),
            gate_low: false,
            history_limit: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub critical_issues: u64,
    pub average_duration_ms: f64,
    pub active: usize,
    pub history_size: usize,
    /// Percentage of runs that passed.
    pub success_rate: f64,
}

#[derive(Default)]
struct Totals {
    total: u64,
    passed: u64,
    failed: u64,
    critical_issues: u64,
    average_duration_ms: f64,
}

// ---------------------------------------------------------------------------
// CheckOrchestrator
// ---------------------------------------------------------------------------

pub struct CheckOrchestrator {
    config: OrchestratorConfig,
    profiles: RwLock<HashMap<String, ValidationProfile>>,
    validators: RwLock<ValidatorRegistry>,
    emitter: EventEmitter,
    totals: Mutex<Totals>,
    history: Mutex<VecDeque<ValidationResult>>,
    active: Mutex<HashSet<String>>,
}

impl CheckOrchestrator {
    /// Create an orchestrator loaded with the built-in profiles and no validators.
    pub fn new(config: OrchestratorConfig, emitter: EventEmitter) -> Self {
        let profiles = default_profiles()
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Self {
            config,
            profiles: RwLock::new(profiles),
            validators: RwLock::new(ValidatorRegistry::new()),
            emitter,
            totals: Mutex::new(Totals::default()),
            history: Mutex::new(VecDeque::new()),
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    // -- registration -------------------------------------------------------

    pub fn register_profile(&self, profile: ValidationProfile) {
        tracing::info!(profile = %profile.name, checks = ?profile.checks, "Profile registered");
        self.profiles.write().insert(profile.name.clone(), profile);
    }

    pub fn profile(&self, name: &str) -> Option<ValidationProfile> {
        self.profiles.read().get(name).cloned()
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.read().contains_key(name)
    }

    /// All registered profiles, sorted by name.
    pub fn profiles(&self) -> Vec<ValidationProfile> {
        let mut all: Vec<_> = self.profiles.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn register_validator(&self, validator: Arc<dyn Validator>) {
        let descriptor = validator.descriptor();
        tracing::info!(validator = %descriptor.name, model = %descriptor.model, "Validator registered");
        self.validators.write().register(validator);
    }

    pub fn unregister_validator(&self, name: &str) -> bool {
        self.validators.write().unregister(name)
    }

    // -- validation ---------------------------------------------------------

    /// Validate `target` against `profile`.
    pub async fn validate(
        &self,
        profile: &str,
        target: Target,
        automatic: bool,
    ) -> Result<ValidationResult> {
        let request = ValidationRequest::new(profile, target).automatic(automatic);
        self.validate_request(&request).await
    }

    /// Run one request. The returned result carries the request's id.
    pub async fn validate_request(&self, request: &ValidationRequest) -> Result<ValidationResult> {
        let start = Instant::now();
        self.active.lock().insert(request.id.clone());
        self.totals.lock().total += 1;

        self.emitter.emit(GateEvent::ValidationStarted {
            id: request.id.clone(),
            profile: request.profile.clone(),
            automatic: request.automatic,
        });
        tracing::info!(
            validation_id = %request.id,
            profile = %request.profile,
            automatic = request.automatic,
            trigger = request.metadata.trigger.as_deref().unwrap_or("manual"),
            "Starting validation"
        );

        let outcome = self.run(request, start).await;
        self.active.lock().remove(&request.id);

        match outcome {
            Ok(result) => {
                self.record(&result);
                self.emitter.emit(GateEvent::ValidationCompleted {
                    id: result.id.clone(),
                    profile: result.profile.clone(),
                    passed: result.passed,
                    issue_count: result.issues.len(),
                    duration_ms: result.duration_ms,
                });
                tracing::info!(
                    validation_id = %result.id,
                    profile = %result.profile,
                    passed = result.passed,
                    issues = result.issues.len(),
                    duration_ms = result.duration_ms,
                    "Validation completed"
                );
                Ok(result)
            }
            Err(e) => {
                self.emitter.emit(GateEvent::ValidationFailed {
                    id: request.id.clone(),
                    profile: request.profile.clone(),
                    error: e.to_string(),
                });
                tracing::error!(
                    validation_id = %request.id,
                    profile = %request.profile,
                    error = %e,
                    "Validation failed"
                );
                Err(e)
            }
        }
    }

    async fn run(&self, request: &ValidationRequest, start: Instant) -> Result<ValidationResult> {
        let profile = self
            .profile(&request.profile)
            .ok_or_else(|| VigilError::UnknownProfile {
                profile: request.profile.clone(),
            })?;
        let validator = self.obtain_validator(&profile)?;

        let mut checks = Vec::with_capacity(profile.checks.len());
        for check in &profile.checks {
            checks.push(
                self.run_check(&request.id, &validator, check, &request.target)
                    .await,
            );
        }

        let mut issues = Vec::new();
        let mut suggestions = Vec::new();
        let mut metrics = BTreeMap::new();
        for check in &checks {
            issues.extend(check.issues.iter().cloned());
            suggestions.extend(check.suggestions.iter().cloned());
            // Later checks overwrite same-named metrics.
            metrics.extend(check.metrics.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        ValidationResult::sort_issues(&mut issues);

        let counts = SeverityCounts::tally(&issues);
        let verdict = evaluate_verdict(
            &counts,
            &self.config.thresholds,
            self.config.strict_mode,
            self.config.gate_low,
        );

        Ok(ValidationResult {
            id: request.id.clone(),
            profile: profile.name,
            passed: verdict.passed,
            reason: verdict.reason,
            issues,
            suggestions,
            metrics,
            checks,
            counts,
            automatic: request.automatic,
            metadata: request.metadata.clone(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            completed_at: Utc::now(),
        })
    }

    fn obtain_validator(&self, profile: &ValidationProfile) -> Result<BoundValidator> {
        let validator = self
            .validators
            .read()
            .get(&profile.validator.name)
            .ok_or_else(|| VigilError::ValidatorUnavailable {
                validator: profile.validator.name.clone(),
            })?;
        bind_validator(&profile.validator, validator)
    }

    /// Execute one check. Never fails: errors and timeouts become an
    /// `error` status with no issues.
    async fn run_check(
        &self,
        validation_id: &str,
        validator: &BoundValidator,
        check: &str,
        target: &Target,
    ) -> CheckResult {
        self.emitter.emit(GateEvent::CheckStarted {
            validation_id: validation_id.to_string(),
            check: check.to_string(),
            validator: validator.name().to_string(),
        });

        let result = match self.execute_check(validation_id, validator, check, target).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(validation_id, check, error = %e, "Check errored");
                CheckResult::errored(check, e.to_string())
            }
        };

        self.emitter.emit(GateEvent::CheckCompleted {
            validation_id: validation_id.to_string(),
            check: check.to_string(),
            status: result.status,
        });
        result
    }

    async fn execute_check(
        &self,
        validation_id: &str,
        validator: &BoundValidator,
        check: &str,
        target: &Target,
    ) -> Result<CheckResult> {
        let strategy = check_strategy(check).ok_or_else(|| VigilError::CheckExecution {
            check: check.to_string(),
            message: format!("Unknown check type: {check}"),
        })?;

        let task = CheckTask {
            validation_id: validation_id.to_string(),
            target: target.clone(),
            check: check.to_string(),
            intent: strategy.intent.to_string(),
            focus: strategy.focus.iter().map(|f| f.to_string()).collect(),
            allowed_tools: validator.descriptor().tools.clone(),
            restrictions: Restrictions::analysis_only(),
        };

        let report = match tokio::time::timeout(self.config.timeout, validator.run_check(&task)).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                return Err(VigilError::CheckExecution {
                    check: check.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(VigilError::ValidationTimeout {
                    check: check.to_string(),
                    timeout_ms: u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        };

        let issues = report
            .issues
            .into_iter()
            .map(|issue| issue.into_issue(check))
            .collect();
        Ok(CheckResult::completed(
            check,
            issues,
            report.suggestions,
            report.metrics,
        ))
    }

    fn record(&self, result: &ValidationResult) {
        {
            let mut totals = self.totals.lock();
            if result.passed {
                totals.passed += 1;
            } else {
                totals.failed += 1;
            }
            totals.critical_issues += result.counts.critical as u64;
            let n = (totals.passed + totals.failed) as f64;
            totals.average_duration_ms =
                (totals.average_duration_ms * (n - 1.0) + result.duration_ms as f64) / n;
        }

        let mut history = self.history.lock();
        history.push_back(result.clone());
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    // -- introspection ------------------------------------------------------

    pub fn metrics(&self) -> OrchestratorMetrics {
        let totals = self.totals.lock();
        OrchestratorMetrics {
            total: totals.total,
            passed: totals.passed,
            failed: totals.failed,
            critical_issues: totals.critical_issues,
            average_duration_ms: totals.average_duration_ms,
            active: self.active.lock().len(),
            history_size: self.history.lock().len(),
            success_rate: if totals.total > 0 {
                totals.passed as f64 / totals.total as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    /// Number of validations currently running.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Completed results, oldest first.
    pub fn history(&self) -> Vec<ValidationResult> {
        self.history.lock().iter().cloned().collect()
    }

    /// Summary report for a validation still in the history ring.
    pub fn report(&self, validation_id: &str) -> Option<ValidationReport> {
        self.history
            .lock()
            .iter()
            .find(|r| r.id == validation_id)
            .map(ValidationReport::from_result)
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
        tracing::info!("Validation history cleared");
    }
}
