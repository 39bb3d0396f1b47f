//! The trigger dispatcher.
//!
//! Each incoming event is matched against the rule set and then routed:
//! blocking or critical requests run immediately, others are debounced per
//! key when a delay is configured, and the rest go through the batch queue.
//! A pending-validation registry suppresses duplicates on every path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use vigil_types::{EventEmitter, GateEvent, Result, Severity, Target, ValidationResult, VigilError};
use vigil_validation::{CheckOrchestrator, OrchestratorMetrics};

use crate::checkpoints::{
    self, is_creation_stage, pre_commit_groups, workflow_profile, CheckpointFlags,
    PRE_DEPLOYMENT_BATTERY, PRE_PUSH_BATTERY,
};
use crate::debounce::Debouncer;
use crate::dedup::PendingRegistry;
use crate::queue::BatchQueue;
use crate::request::TriggerRequest;
use crate::rules::{EventKind, RuleSet, TriggerRule};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub enabled: bool,
    /// Zero disables debouncing.
    #[serde(with = "vigil_types::duration_serde")]
    pub debounce: Duration,
    pub batch_size: usize,
    /// Pause between queue batches.
    #[serde(with = "vigil_types::duration_serde")]
    pub batch_pause: Duration,
    #[serde(with = "vigil_types::duration_serde")]
    pub dedup_window: Duration,
    pub checkpoints: CheckpointFlags,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce: Duration::from_millis(500),
            batch_size: 5,
            batch_pause: Duration::from_millis(100),
            dedup_window: Duration::from_secs(5),
            checkpoints: CheckpointFlags::default(),
        }
    }
}

/// An occurrence reported by a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// File path, code text, stage name, checkpoint kind, or environment.
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(kind: EventKind, subject: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    fn payload_str(&self, field: &str) -> Option<String> {
        self.payload
            .get(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// The artifact a file or code event refers to.
    fn target(&self) -> Target {
        if self.kind.is_code() {
            Target::Code {
                code: self.subject.clone(),
                context: self.payload.get("context").cloned(),
            }
        } else {
            Target::File {
                path: self.subject.clone(),
                content: self.payload_str("content"),
            }
        }
    }

    /// An explicit `target` in the payload, else an opaque wrapper around it.
    fn payload_target(&self) -> Target {
        self.payload
            .get("target")
            .and_then(|t| serde_json::from_value(t.clone()).ok())
            .unwrap_or_else(|| Target::Opaque {
                payload: self.payload.clone(),
            })
    }
}

/// What happened to a dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// No rule matched.
    Discarded,
    /// Disabled, gated off, or a duplicate of a pending run.
    Skipped { reason: String },
    Completed(Box<ValidationResult>),
    Debounced { delay: Duration },
    Queued { position: usize },
    /// Results of a checkpoint battery, in battery order.
    Battery(Vec<ValidationResult>),
}

impl DispatchOutcome {
    pub fn result(&self) -> Option<&ValidationResult> {
        match self {
            DispatchOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherStatistics {
    pub total_triggers: u64,
    pub automatic_validations: u64,
    pub manual_validations: u64,
    pub skipped_validations: u64,
    pub failed_validations: u64,
    pub debounced: u64,
    pub queued: u64,
    pub queue_length: usize,
    pub pending_validations: usize,
    pub pending_timers: usize,
    pub processing: bool,
    pub orchestrator: OrchestratorMetrics,
}

#[derive(Default)]
struct Counters {
    total_triggers: AtomicU64,
    automatic: AtomicU64,
    manual: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    debounced: AtomicU64,
    queued: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ---------------------------------------------------------------------------
// TriggerDispatcher
// ---------------------------------------------------------------------------

struct Inner {
    orchestrator: Arc<CheckOrchestrator>,
    config: RwLock<DispatcherConfig>,
    rules: RwLock<RuleSet>,
    pending: PendingRegistry,
    debouncer: Debouncer,
    queue: BatchQueue,
    processing: AtomicBool,
    counters: Counters,
    emitter: EventEmitter,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TriggerDispatcher {
    inner: Arc<Inner>,
}

impl TriggerDispatcher {
    pub fn new(
        orchestrator: Arc<CheckOrchestrator>,
        config: DispatcherConfig,
        rules: RuleSet,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                orchestrator,
                config: RwLock::new(config),
                rules: RwLock::new(rules),
                pending: PendingRegistry::new(),
                debouncer: Debouncer::new(),
                queue: BatchQueue::new(),
                processing: AtomicBool::new(false),
                counters: Counters::default(),
                emitter,
            }),
        }
    }

    pub fn orchestrator(&self) -> &Arc<CheckOrchestrator> {
        &self.inner.orchestrator
    }

    pub fn config(&self) -> DispatcherConfig {
        self.inner.config.read().clone()
    }

    // -- events -------------------------------------------------------------

    /// Route one producer event.
    pub async fn handle_event(&self, event: Event) -> Result<DispatchOutcome> {
        tracing::debug!(kind = %event.kind, subject = %event.subject, "Event received");
        match event.kind {
            kind if kind.is_rule_matched() => {
                if !self.inner.config.read().enabled {
                    return Ok(self.skip(kind.as_str(), "-", "dispatcher disabled"));
                }
                if event.subject.is_empty() {
                    return Ok(DispatchOutcome::Discarded);
                }
                let rule = self
                    .inner
                    .rules
                    .read()
                    .resolve(kind, &event.subject)
                    .cloned();
                let Some(rule) = rule else {
                    tracing::debug!(kind = %kind, subject = %event.subject, "No rule matched");
                    return Ok(DispatchOutcome::Discarded);
                };
                let request = TriggerRequest::new(kind.as_str(), rule.profile.clone(), event.target())
                    .with_rule(rule.name.clone())
                    .with_priority(rule.priority);
                self.trigger(request).await
            }
            EventKind::StageCompleted => {
                let output = event.payload.get("output").cloned().unwrap_or(event.payload);
                self.stage_completed(&event.subject, output).await
            }
            EventKind::WorkflowCheckpoint => {
                let target = event.payload_target();
                self.workflow_checkpoint(&event.subject, target).await
            }
            EventKind::PreCommit => {
                let files: Vec<String> = match event.payload.get("files") {
                    Some(files) => serde_json::from_value(files.clone())?,
                    None => event.subject.lines().map(str::to_string).collect(),
                };
                self.pre_commit(files).await.map(DispatchOutcome::Battery)
            }
            EventKind::PrePush => {
                let target = event.payload_target();
                self.pre_push(target).await.map(DispatchOutcome::Battery)
            }
            EventKind::PreDeployment => {
                let target = event.payload_target();
                self.pre_deployment(&event.subject, target)
                    .await
                    .map(DispatchOutcome::Battery)
            }
            EventKind::PostDeployment => {
                let version = event.payload_str("version");
                Ok(match self.post_deployment(&event.subject, version).await? {
                    Some(result) => DispatchOutcome::Completed(Box::new(result)),
                    None => DispatchOutcome::Skipped {
                        reason: "checkpoint disabled".into(),
                    },
                })
            }
            _ => Ok(DispatchOutcome::Discarded),
        }
    }

    /// Admit a request and route it.
    pub async fn trigger(&self, request: TriggerRequest) -> Result<DispatchOutcome> {
        bump(&self.inner.counters.total_triggers);

        let (enabled, debounce, window, gated) = {
            let config = self.inner.config.read();
            let gated = request
                .checkpoint
                .as_deref()
                .is_some_and(|c| !config.checkpoints.is_enabled(c));
            (config.enabled, config.debounce, config.dedup_window, gated)
        };
        if !enabled {
            return Ok(self.skip(&request.trigger, &request.profile, "dispatcher disabled"));
        }
        if gated {
            return Ok(self.skip(&request.trigger, &request.profile, "checkpoint disabled"));
        }

        let key = request.validation_key();
        if self.inner.pending.is_pending(&key, window) {
            return Ok(self.skip(&request.trigger, &request.profile, "duplicate pending"));
        }

        if request.is_immediate() {
            let Some(token) = self.inner.pending.try_accept(&key, window) else {
                return Ok(self.skip(&request.trigger, &request.profile, "duplicate pending"));
            };
            let result = self.execute(request, key, token).await?;
            return Ok(DispatchOutcome::Completed(Box::new(result)));
        }

        if !debounce.is_zero() {
            bump(&self.inner.counters.debounced);
            tracing::debug!(key = %key, request_id = %request.id, "Debouncing request");
            let dispatcher = self.clone();
            let request_id = request.id.clone();
            self.inner.debouncer.schedule(
                key.clone(),
                request_id,
                debounce,
                async move { dispatcher.fire(request, key).await },
            );
            return Ok(DispatchOutcome::Debounced { delay: debounce });
        }

        bump(&self.inner.counters.queued);
        let position = self.inner.queue.push(request);
        self.ensure_draining();
        Ok(DispatchOutcome::Queued { position })
    }

    /// Run a profile on behalf of a person rather than an event.
    pub async fn validate_manually(&self, profile: &str, target: Target) -> Result<ValidationResult> {
        bump(&self.inner.counters.manual);
        self.inner.orchestrator.validate(profile, target, false).await
    }

    // -- execution ----------------------------------------------------------

    /// A debounce timer fired.
    async fn fire(&self, request: TriggerRequest, key: String) {
        let window = self.inner.config.read().dedup_window;
        match self.inner.pending.try_accept(&key, window) {
            Some(token) => {
                // Failures are already counted and emitted.
                let _ = self.execute(request, key, token).await;
            }
            None => {
                self.skip(&request.trigger, &request.profile, "duplicate pending");
            }
        }
    }

    async fn execute(
        &self,
        request: TriggerRequest,
        key: String,
        token: u64,
    ) -> Result<ValidationResult> {
        let validation = request.to_validation_request();
        let outcome = self.inner.orchestrator.validate_request(&validation).await;
        self.inner.pending.complete(&key, token);

        match outcome {
            Ok(result) => {
                bump(&self.inner.counters.automatic);
                self.inner.emitter.emit(GateEvent::ValidationTriggered {
                    request_id: request.id.clone(),
                    trigger: request.trigger.clone(),
                    profile: request.profile.clone(),
                    result: Box::new(result.clone()),
                });
                Ok(result)
            }
            Err(e) => {
                bump(&self.inner.counters.failed);
                tracing::error!(
                    request_id = %request.id,
                    trigger = %request.trigger,
                    profile = %request.profile,
                    rule = request.rule.as_deref().unwrap_or("-"),
                    error = %e,
                    "Triggered validation errored"
                );
                self.inner.emitter.emit(GateEvent::ValidationError {
                    request_id: request.id,
                    trigger: request.trigger,
                    profile: request.profile,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn ensure_draining(&self) {
        if self.inner.processing.swap(true, Ordering::AcqRel) {
            return;
        }
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.drain().await });
    }

    /// Pull batches off the queue until it is empty, running each batch
    /// concurrently and pausing between batches.
    async fn drain(&self) {
        loop {
            let (batch_size, pause, window) = {
                let config = self.inner.config.read();
                (config.batch_size, config.batch_pause, config.dedup_window)
            };
            let batch = self.inner.queue.take_batch(batch_size);
            if batch.is_empty() {
                self.inner.processing.store(false, Ordering::Release);
                // A push may have raced the flag reset.
                if !self.inner.queue.is_empty()
                    && !self.inner.processing.swap(true, Ordering::AcqRel)
                {
                    continue;
                }
                return;
            }

            tracing::debug!(size = batch.len(), "Draining batch");
            let mut set = JoinSet::new();
            for queued in batch {
                let request = queued.request;
                let key = request.validation_key();
                // Accept synchronously so duplicates within one batch are caught.
                match self.inner.pending.try_accept(&key, window) {
                    Some(token) => {
                        let dispatcher = self.clone();
                        set.spawn(async move {
                            let _ = dispatcher.execute(request, key, token).await;
                        });
                    }
                    None => {
                        self.skip(&request.trigger, &request.profile, "duplicate pending");
                    }
                }
            }
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Queued validation task panicked");
                }
            }

            if !self.inner.queue.is_empty() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    fn skip(&self, trigger: &str, profile: &str, reason: &str) -> DispatchOutcome {
        bump(&self.inner.counters.skipped);
        tracing::debug!(trigger, profile, reason, "Validation skipped");
        self.inner.emitter.emit(GateEvent::ValidationSkipped {
            trigger: trigger.to_string(),
            profile: profile.to_string(),
            reason: reason.to_string(),
        });
        DispatchOutcome::Skipped {
            reason: reason.to_string(),
        }
    }

    // -- checkpoints --------------------------------------------------------

    fn checkpoint_enabled(&self, name: &str) -> bool {
        let config = self.inner.config.read();
        config.enabled && config.checkpoints.is_enabled(name)
    }

    /// Run a battery concurrently and return one result per member, in
    /// battery order. A member that could not produce a verdict is recorded
    /// as a failed result so the battery blocks.
    async fn run_battery(&self, requests: Vec<TriggerRequest>) -> Vec<ValidationResult> {
        let profiles: Vec<String> = requests.iter().map(|r| r.profile.clone()).collect();
        let mut set = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let dispatcher = self.clone();
            set.spawn(async move { (index, dispatcher.run_member(request).await) });
        }

        let mut slots: Vec<Option<ValidationResult>> = vec![None; profiles.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "Checkpoint task panicked"),
            }
        }
        slots
            .into_iter()
            .zip(profiles)
            .map(|(slot, profile)| {
                slot.unwrap_or_else(|| ValidationResult::errored(profile, "checkpoint task panicked"))
            })
            .collect()
    }

    /// Run one battery member. Checkpoints are never deduplicated: the member
    /// takes over any pending record for its key and always runs.
    async fn run_member(&self, request: TriggerRequest) -> ValidationResult {
        bump(&self.inner.counters.total_triggers);
        let key = request.validation_key();
        let token = self.inner.pending.claim(&key);
        let profile = request.profile.clone();
        let metadata = request.to_validation_request().metadata;
        match self.execute(request, key, token).await {
            Ok(result) => result,
            Err(e) => {
                let mut result = ValidationResult::errored(profile, e.to_string());
                result.metadata = metadata;
                result
            }
        }
    }

    fn failed_profiles(results: &[ValidationResult]) -> Vec<String> {
        results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.profile.clone())
            .collect()
    }

    /// Validate staged files. Fails with `CommitBlocked` if any profile fails.
    pub async fn pre_commit(&self, files: Vec<String>) -> Result<Vec<ValidationResult>> {
        if !self.checkpoint_enabled(checkpoints::PRE_COMMIT) {
            self.skip(checkpoints::PRE_COMMIT, "-", "checkpoint disabled");
            return Ok(Vec::new());
        }
        let requests = pre_commit_groups(&files)
            .into_iter()
            .map(|(profile, files)| {
                TriggerRequest::new(checkpoints::PRE_COMMIT, profile, Target::Files { files })
                    .with_priority(Severity::Critical)
                    .blocking()
            })
            .collect();
        let results = self.run_battery(requests).await;

        let failed = Self::failed_profiles(&results);
        if !failed.is_empty() {
            tracing::warn!(failed = ?failed, "Commit blocked");
            self.inner.emitter.emit(GateEvent::CommitBlocked {
                failed_profiles: failed,
                result_count: results.len(),
            });
            return Err(VigilError::CommitBlocked { results });
        }
        Ok(results)
    }

    /// Fails with `PushBlocked` if any profile fails.
    pub async fn pre_push(&self, target: Target) -> Result<Vec<ValidationResult>> {
        if !self.checkpoint_enabled(checkpoints::PRE_PUSH) {
            self.skip(checkpoints::PRE_PUSH, "-", "checkpoint disabled");
            return Ok(Vec::new());
        }
        let requests = PRE_PUSH_BATTERY
            .iter()
            .map(|entry| {
                TriggerRequest::new(checkpoints::PRE_PUSH, entry.profile, target.clone())
                    .with_priority(entry.priority)
                    .blocking()
            })
            .collect();
        let results = self.run_battery(requests).await;

        let failed = Self::failed_profiles(&results);
        if !failed.is_empty() {
            tracing::warn!(failed = ?failed, "Push blocked");
            self.inner.emitter.emit(GateEvent::PushBlocked {
                failed_profiles: failed,
                result_count: results.len(),
            });
            return Err(VigilError::PushBlocked { results });
        }
        Ok(results)
    }

    /// Fails with `DeploymentBlocked` if any profile fails.
    pub async fn pre_deployment(
        &self,
        environment: &str,
        target: Target,
    ) -> Result<Vec<ValidationResult>> {
        if !self.checkpoint_enabled(checkpoints::PRE_DEPLOYMENT) {
            self.skip(checkpoints::PRE_DEPLOYMENT, "-", "checkpoint disabled");
            return Ok(Vec::new());
        }
        let requests = PRE_DEPLOYMENT_BATTERY
            .iter()
            .map(|entry| {
                TriggerRequest::new(checkpoints::PRE_DEPLOYMENT, entry.profile, target.clone())
                    .with_priority(entry.priority)
                    .blocking()
            })
            .collect();
        let results = self.run_battery(requests).await;

        let failed = Self::failed_profiles(&results);
        if !failed.is_empty() {
            tracing::warn!(environment, failed = ?failed, "Deployment blocked");
            self.inner.emitter.emit(GateEvent::DeploymentBlocked {
                environment: environment.to_string(),
                failed_profiles: failed,
                result_count: results.len(),
            });
            return Err(VigilError::DeploymentBlocked {
                environment: environment.to_string(),
                results,
            });
        }
        Ok(results)
    }

    /// Compliance pass after a deployment. A failure is reported through a
    /// `DeploymentIssue` event, never as an error.
    pub async fn post_deployment(
        &self,
        environment: &str,
        version: Option<String>,
    ) -> Result<Option<ValidationResult>> {
        let target = Target::Deployment {
            environment: environment.to_string(),
            version,
        };
        let request = TriggerRequest::new(checkpoints::POST_DEPLOYMENT, "compliance", target)
            .with_priority(Severity::High)
            .with_checkpoint(checkpoints::POST_DEPLOYMENT)
            .blocking();
        let result = match self.trigger(request).await? {
            DispatchOutcome::Completed(result) => *result,
            _ => return Ok(None),
        };
        if !result.passed {
            tracing::warn!(environment, validation_id = %result.id, "Deployment issue detected");
            self.inner.emitter.emit(GateEvent::DeploymentIssue {
                environment: environment.to_string(),
                validation_id: result.id.clone(),
            });
        }
        Ok(Some(result))
    }

    /// Quality pass for the output of a code-producing stage.
    pub async fn stage_completed(
        &self,
        stage: &str,
        output: serde_json::Value,
    ) -> Result<DispatchOutcome> {
        if !is_creation_stage(stage) {
            return Ok(DispatchOutcome::Discarded);
        }
        let target = Target::StageOutput {
            stage: stage.to_string(),
            output,
        };
        let request = TriggerRequest::new("stage_completed", "code_quality", target)
            .with_priority(Severity::Medium)
            .with_checkpoint(checkpoints::POST_CREATION);
        self.trigger(request).await
    }

    /// Validation at a named workflow checkpoint.
    pub async fn workflow_checkpoint(&self, kind: &str, target: Target) -> Result<DispatchOutcome> {
        let request = TriggerRequest::new("checkpoint", workflow_profile(kind), target)
            .with_priority(Severity::High)
            .with_checkpoint(kind);
        self.trigger(request).await
    }

    // -- control ------------------------------------------------------------

    /// Cancel a request that is still debounced or queued.
    pub fn cancel(&self, request_id: &str) -> bool {
        let cancelled = self.inner.debouncer.cancel_request(request_id)
            || self.inner.queue.remove(request_id).is_some();
        if cancelled {
            tracing::info!(request_id, "Request cancelled");
        }
        cancelled
    }

    /// Drop queued requests, pending timers, and dedup records.
    pub fn clear_queue(&self) -> usize {
        let dropped = self.inner.queue.clear() + self.inner.debouncer.cancel_all();
        self.inner.pending.clear();
        tracing::info!(dropped, "Validation queue cleared");
        self.inner.emitter.emit(GateEvent::QueueCleared { dropped });
        dropped
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.config.write().enabled = enabled;
        tracing::info!(enabled, "Triggers updated");
    }

    pub fn update_checkpoints(&self, flags: &CheckpointFlags) {
        self.inner.config.write().checkpoints.merge(flags);
        tracing::info!(checkpoints = ?flags, "Checkpoints updated");
    }

    pub fn add_rule(&self, rule: TriggerRule) {
        let name = rule.name.clone();
        self.inner.rules.write().add(rule);
        tracing::info!(rule = %name, "Rule added");
        self.inner.emitter.emit(GateEvent::RuleAdded { name });
    }

    pub fn remove_rule(&self, name: &str) -> bool {
        let removed = self.inner.rules.write().remove(name);
        if removed {
            tracing::info!(rule = name, "Rule removed");
            self.inner.emitter.emit(GateEvent::RuleRemoved {
                name: name.to_string(),
            });
        }
        removed
    }

    pub fn rules(&self) -> Vec<TriggerRule> {
        self.inner.rules.read().rules().to_vec()
    }

    pub fn statistics(&self) -> DispatcherStatistics {
        let c = &self.inner.counters;
        DispatcherStatistics {
            total_triggers: c.total_triggers.load(Ordering::Relaxed),
            automatic_validations: c.automatic.load(Ordering::Relaxed),
            manual_validations: c.manual.load(Ordering::Relaxed),
            skipped_validations: c.skipped.load(Ordering::Relaxed),
            failed_validations: c.failed.load(Ordering::Relaxed),
            debounced: c.debounced.load(Ordering::Relaxed),
            queued: c.queued.load(Ordering::Relaxed),
            queue_length: self.inner.queue.len(),
            pending_validations: self.inner.pending.len(),
            pending_timers: self.inner.debouncer.pending_count(),
            processing: self.inner.processing.load(Ordering::Acquire),
            orchestrator: self.inner.orchestrator.metrics(),
        }
    }

    /// Wait until no request is debounced, queued, or pending.
    pub async fn wait_idle(&self) {
        loop {
            let stats = self.statistics();
            if stats.pending_timers == 0
                && stats.queue_length == 0
                && stats.pending_validations == 0
                && !stats.processing
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use vigil_validation::{
        CheckReport, CheckTask, OrchestratorConfig, ReportedIssue, ValidationProfile, Validator,
        ValidatorDescriptor,
    };

    /// Counts runs; reports a critical issue when the target subject contains "bad".
    struct Counting {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Validator for Counting {
        fn descriptor(&self) -> ValidatorDescriptor {
            ValidatorDescriptor {
                name: "gemini-advisor".into(),
                model: "gemini-test".into(),
                tools: vec![],
            }
        }

        async fn run_check(&self, task: &CheckTask) -> Result<CheckReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if task.target.subject().contains("bad") {
                return Ok(CheckReport::clean()
                    .with_issue(ReportedIssue::new(Severity::Critical, "bad artifact")));
            }
            Ok(CheckReport::clean())
        }
    }

    fn setup(config: DispatcherConfig) -> (TriggerDispatcher, Arc<Counting>) {
        let emitter = EventEmitter::new(256);
        let orchestrator = Arc::new(CheckOrchestrator::new(
            OrchestratorConfig::default(),
            emitter.clone(),
        ));
        // One check per profile keeps call counts equal to run counts.
        for name in ["code_quality", "security", "testing", "compliance", "architecture"] {
            orchestrator.register_profile(ValidationProfile::new(name, &["syntax"], Severity::Medium));
        }
        let validator = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(20),
        });
        orchestrator.register_validator(validator.clone());
        let dispatcher = TriggerDispatcher::new(
            orchestrator,
            config,
            RuleSet::with_defaults().unwrap(),
            emitter,
        );
        (dispatcher, validator)
    }

    fn no_debounce() -> DispatcherConfig {
        DispatcherConfig {
            debounce: Duration::ZERO,
            ..Default::default()
        }
    }

    // Test 1: unmatched events are discarded without side effects
    #[tokio::test(start_paused = true)]
    async fn unmatched_event_is_discarded() {
        let (dispatcher, validator) = setup(DispatcherConfig::default());
        let outcome = dispatcher
            .handle_event(Event::new(EventKind::FileModified, "src/app.ts"))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Discarded);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    // Test 2: critical rule runs immediately
    #[tokio::test(start_paused = true)]
    async fn critical_rule_runs_immediately() {
        let (dispatcher, validator) = setup(DispatcherConfig::default());
        let outcome = dispatcher
            .handle_event(Event::new(EventKind::FileModified, "config/app.json"))
            .await
            .unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.profile, "compliance");
        assert_eq!(result.metadata.rule.as_deref(), Some("config_change"));
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    }

    // Test 3: non-critical events are debounced
    #[tokio::test(start_paused = true)]
    async fn medium_rule_is_debounced() {
        let (dispatcher, validator) = setup(DispatcherConfig::default());
        let outcome = dispatcher
            .handle_event(Event::new(EventKind::FileCreated, "src/app.ts"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Debounced {
                delay: Duration::from_millis(500)
            }
        );
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);

        dispatcher.wait_idle().await;
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    }

    // Test 4: queue path when debounce is off
    #[tokio::test(start_paused = true)]
    async fn queue_path_runs_all_requests() {
        let (dispatcher, validator) = setup(no_debounce());
        for i in 0..7 {
            let outcome = dispatcher
                .handle_event(Event::new(EventKind::FileCreated, format!("src/f{i}.ts")))
                .await
                .unwrap();
            assert!(matches!(outcome, DispatchOutcome::Queued { .. }));
        }
        dispatcher.wait_idle().await;
        assert_eq!(validator.calls.load(Ordering::SeqCst), 7);
        assert_eq!(dispatcher.statistics().automatic_validations, 7);
    }

    // Test 5: disabled dispatcher skips everything
    #[tokio::test(start_paused = true)]
    async fn disabled_dispatcher_skips() {
        let (dispatcher, validator) = setup(DispatcherConfig::default());
        dispatcher.set_enabled(false);
        let outcome = dispatcher
            .handle_event(Event::new(EventKind::FileModified, "config/app.json"))
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Skipped { .. }));
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.statistics().skipped_validations, 1);
    }

    // Test 6: cancelling a debounced request
    #[tokio::test(start_paused = true)]
    async fn cancel_debounced_request() {
        let (dispatcher, validator) = setup(DispatcherConfig::default());
        let request = TriggerRequest::new("file_created", "code_quality", Target::file("a.ts"));
        let id = request.id.clone();
        dispatcher.trigger(request).await.unwrap();

        assert!(dispatcher.cancel(&id));
        assert!(!dispatcher.cancel(&id));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    // Test 7: disabled post_creation checkpoint gates stage validation
    #[tokio::test(start_paused = true)]
    async fn stage_completed_respects_checkpoint_flag() {
        let (dispatcher, validator) = setup(no_debounce());
        let outcome = dispatcher
            .stage_completed("planning", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Discarded);

        let mut flags = CheckpointFlags::default();
        flags.set(checkpoints::POST_CREATION, false);
        dispatcher.update_checkpoints(&flags);
        let outcome = dispatcher
            .stage_completed("implementation", serde_json::json!({"files": 3}))
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Skipped { .. }));
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    // Test 8: unknown profile errors are counted and emitted, not fatal
    #[tokio::test(start_paused = true)]
    async fn orchestrator_errors_become_events() {
        let (dispatcher, _) = setup(no_debounce());
        let mut rx = dispatcher.inner.emitter.subscribe();

        let request = TriggerRequest::new("manual", "nonexistent", Target::file("a.ts")).blocking();
        let err = dispatcher.trigger(request).await.unwrap_err();
        assert!(matches!(err, VigilError::UnknownProfile { .. }));
        assert_eq!(dispatcher.statistics().failed_validations, 1);
        assert_eq!(dispatcher.statistics().pending_validations, 0);

        let mut saw_error = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, GateEvent::ValidationError { .. }) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}
