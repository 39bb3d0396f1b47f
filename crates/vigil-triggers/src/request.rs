use serde::{Deserialize, Serialize};
use vigil_types::{stable_hash, RequestMetadata, Severity, Target, ValidationRequest};

/// A dispatch request produced from an event, a hook, or a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub id: String,
    pub trigger: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub profile: String,
    pub priority: Severity,
    pub target: Target,
    /// Run now and hand the result back to the caller.
    #[serde(default)]
    pub blocking: bool,
    /// Name of the checkpoint flag that gates this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
}

impl TriggerRequest {
    pub fn new(trigger: impl Into<String>, profile: impl Into<String>, target: Target) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            trigger: trigger.into(),
            rule: None,
            profile: profile.into(),
            priority: Severity::Medium,
            target,
            blocking: false,
            checkpoint: None,
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    pub fn with_priority(mut self, priority: Severity) -> Self {
        self.priority = priority;
        self
    }

    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: impl Into<String>) -> Self {
        self.checkpoint = Some(checkpoint.into());
        self
    }

    /// Runs synchronously rather than through debounce or the queue.
    pub fn is_immediate(&self) -> bool {
        self.blocking || self.priority == Severity::Critical
    }

    /// Dedup and debounce key over (profile, trigger, target signature).
    pub fn validation_key(&self) -> String {
        stable_hash(&format!(
            "{}\u{1f}{}\u{1f}{}",
            self.profile,
            self.trigger,
            self.target.signature()
        ))
    }

    /// The orchestrator request this dispatch turns into. Shares the id.
    pub fn to_validation_request(&self) -> ValidationRequest {
        let mut request = ValidationRequest::new(self.profile.clone(), self.target.clone())
            .automatic(true)
            .with_metadata(RequestMetadata {
                trigger: Some(self.trigger.clone()),
                rule: self.rule.clone(),
                priority: Some(self.priority),
            });
        request.id = self.id.clone();
        request
    }
}
