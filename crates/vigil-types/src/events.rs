//! Gate event system for observability.
//!
//! Emits [`GateEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (reporters, a council layer, the CLI) can follow
//! validation and refinement progress without coupling to component internals.

use serde::{Deserialize, Serialize};

use crate::{CheckStatus, ValidationResult};

/// Every event produced by the orchestrator, dispatcher, and feedback processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GateEvent {
    // === Check Orchestrator ===
    ValidationStarted {
        id: String,
        profile: String,
        automatic: bool,
    },
    CheckStarted {
        validation_id: String,
        check: String,
        validator: String,
    },
    CheckCompleted {
        validation_id: String,
        check: String,
        status: CheckStatus,
    },
    ValidationCompleted {
        id: String,
        profile: String,
        passed: bool,
        issue_count: usize,
        duration_ms: u64,
    },
    ValidationFailed {
        id: String,
        profile: String,
        error: String,
    },

    // === Trigger Dispatcher ===
    ValidationTriggered {
        request_id: String,
        trigger: String,
        profile: String,
        result: Box<ValidationResult>,
    },
    ValidationError {
        request_id: String,
        trigger: String,
        profile: String,
        error: String,
    },
    ValidationSkipped {
        trigger: String,
        profile: String,
        reason: String,
    },
    CommitBlocked {
        failed_profiles: Vec<String>,
        result_count: usize,
    },
    PushBlocked {
        failed_profiles: Vec<String>,
        result_count: usize,
    },
    DeploymentBlocked {
        environment: String,
        failed_profiles: Vec<String>,
        result_count: usize,
    },
    DeploymentIssue {
        environment: String,
        validation_id: String,
    },
    RuleAdded {
        name: String,
    },
    RuleRemoved {
        name: String,
    },
    QueueCleared {
        dropped: usize,
    },

    // === Feedback Processor ===
    FeedbackReceived {
        id: String,
        validation_id: String,
        issue_count: usize,
    },
    RefinementStarted {
        plan_id: String,
        stage_count: usize,
    },
    RefinementStageCompleted {
        plan_id: String,
        stage_id: String,
        action: String,
        success: bool,
    },
    RefinementCompleted {
        plan_id: String,
        improvement_score: f64,
        duration_ms: u64,
    },
    RefinementFailed {
        plan_id: String,
        error: String,
    },
}

impl GateEvent {
    /// Short snake_case name of the variant, for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            GateEvent::ValidationStarted { .. } => "validation_started",
            GateEvent::CheckStarted { .. } => "check_started",
            GateEvent::CheckCompleted { .. } => "check_completed",
            GateEvent::ValidationCompleted { .. } => "validation_completed",
            GateEvent::ValidationFailed { .. } => "validation_failed",
            GateEvent::ValidationTriggered { .. } => "validation_triggered",
            GateEvent::ValidationError { .. } => "validation_error",
            GateEvent::ValidationSkipped { .. } => "validation_skipped",
            GateEvent::CommitBlocked { .. } => "commit_blocked",
            GateEvent::PushBlocked { .. } => "push_blocked",
            GateEvent::DeploymentBlocked { .. } => "deployment_blocked",
            GateEvent::DeploymentIssue { .. } => "deployment_issue",
            GateEvent::RuleAdded { .. } => "rule_added",
            GateEvent::RuleRemoved { .. } => "rule_removed",
            GateEvent::QueueCleared { .. } => "queue_cleared",
            GateEvent::FeedbackReceived { .. } => "feedback_received",
            GateEvent::RefinementStarted { .. } => "refinement_started",
            GateEvent::RefinementStageCompleted { .. } => "refinement_stage_completed",
            GateEvent::RefinementCompleted { .. } => "refinement_completed",
            GateEvent::RefinementFailed { .. } => "refinement_failed",
        }
    }
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<GateEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: GateEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<GateEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(GateEvent::ValidationStarted {
            id: "v1".into(),
            profile: "security".into(),
            automatic: true,
        });

        match rx.recv().await.unwrap() {
            GateEvent::ValidationStarted {
                id,
                profile,
                automatic,
            } => {
                assert_eq!(id, "v1");
                assert_eq!(profile, "security");
                assert!(automatic);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let emitter = EventEmitter::new(16);
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();

        emitter.emit(GateEvent::RuleAdded {
            name: "code_creation".into(),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.name(), "rule_added");
        assert_eq!(
            serde_json::to_string(&e1).unwrap(),
            serde_json::to_string(&e2).unwrap()
        );
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        emitter.emit(GateEvent::RefinementFailed {
            plan_id: "p".into(),
            error: "cycle".into(),
        });
    }

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let event = GateEvent::CheckCompleted {
            validation_id: "v".into(),
            check: "syntax".into(),
            status: CheckStatus::PassedWithWarnings,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "check_completed");
        assert_eq!(json["status"], "passed_with_warnings");
    }
}
