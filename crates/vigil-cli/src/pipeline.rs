//! Wires the orchestrator, dispatcher, and feedback processor onto one event
//! bus, and bridges failed automatic validations into the feedback processor.

use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use vigil_feedback::{FeedbackOptions, FeedbackOutcome, FeedbackProcessor};
use vigil_triggers::{RuleSet, TriggerDispatcher};
use vigil_types::{EventEmitter, GateEvent, Result};
use vigil_validation::CheckOrchestrator;

use crate::command::{CommandStageExecutor, CommandValidator};
use crate::config::VigilConfig;

pub struct Pipeline {
    pub emitter: EventEmitter,
    pub orchestrator: Arc<CheckOrchestrator>,
    pub dispatcher: TriggerDispatcher,
    pub feedback: Arc<FeedbackProcessor>,
}

impl Pipeline {
    pub fn build(config: &VigilConfig) -> anyhow::Result<Self> {
        let emitter = EventEmitter::default();

        let orchestrator = Arc::new(CheckOrchestrator::new(
            config.orchestrator.clone(),
            emitter.clone(),
        ));
        for profile in &config.profiles {
            orchestrator.register_profile(profile.clone());
        }
        for validator in &config.validators {
            tracing::info!(name = %validator.name, model = %validator.model, "Registering validator");
            orchestrator.register_validator(Arc::new(CommandValidator::new(validator)));
        }

        let rules = match &config.rules {
            Some(rules) => RuleSet::new(rules.clone()),
            None => RuleSet::with_defaults()?,
        };
        let dispatcher = TriggerDispatcher::new(
            orchestrator.clone(),
            config.dispatcher.clone(),
            rules,
            emitter.clone(),
        );

        let feedback = Arc::new(FeedbackProcessor::new(
            config.feedback.clone(),
            emitter.clone(),
        ));
        for executor in &config.executors {
            tracing::info!(capability = %executor.capability, "Registering stage executor");
            feedback.register_executor(Arc::new(CommandStageExecutor::new(executor)));
        }

        Ok(Self {
            emitter,
            orchestrator,
            dispatcher,
            feedback,
        })
    }

    /// Log every gate event until the bus closes or the handle is aborted.
    pub fn spawn_event_logger(&self) -> JoinHandle<()> {
        let mut events = BroadcastStream::new(self.emitter.subscribe());
        tokio::spawn(async move {
            while let Some(item) = events.next().await {
                match item {
                    Ok(event) => log_event(&event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event logger lagged");
                    }
                }
            }
        })
    }

    /// Feed failed automatic validations into the feedback processor.
    pub fn spawn_feedback_bridge(&self) -> FeedbackBridge {
        let mut rx = self.emitter.subscribe();
        let processor = self.feedback.clone();
        let (shutdown, mut stop) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut running: JoinSet<Result<FeedbackOutcome>> = JoinSet::new();
            loop {
                tokio::select! {
                    _ = &mut stop => {
                        // Events emitted before shutdown are still buffered.
                        loop {
                            match rx.try_recv() {
                                Ok(event) => bridge_event(&processor, &mut running, event),
                                Err(TryRecvError::Lagged(skipped)) => {
                                    tracing::warn!(skipped, "Feedback bridge lagged");
                                }
                                Err(_) => break,
                            }
                        }
                        break;
                    }
                    received = rx.recv() => match received {
                        Ok(event) => bridge_event(&processor, &mut running, event),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Feedback bridge lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            let mut outcomes = Vec::new();
            while let Some(joined) = running.join_next().await {
                match joined {
                    Ok(Ok(outcome)) => outcomes.push(outcome),
                    Ok(Err(e)) => tracing::error!(error = %e, "Feedback processing failed"),
                    Err(e) => tracing::error!(error = %e, "Feedback task panicked"),
                }
            }
            outcomes
        });

        FeedbackBridge { shutdown, handle }
    }
}

fn bridge_event(
    processor: &Arc<FeedbackProcessor>,
    running: &mut JoinSet<Result<FeedbackOutcome>>,
    event: GateEvent,
) {
    let GateEvent::ValidationTriggered {
        trigger, result, ..
    } = event
    else {
        return;
    };
    if result.passed {
        return;
    }
    tracing::info!(trigger = %trigger, validation_id = %result.id, "Forwarding failed validation to feedback");
    let processor = processor.clone();
    running.spawn(async move {
        processor
            .process_feedback(&result, FeedbackOptions::default())
            .await
    });
}

fn log_event(event: &GateEvent) {
    match event {
        GateEvent::ValidationCompleted {
            id,
            profile,
            passed,
            issue_count,
            duration_ms,
        } => tracing::info!(
            id = %id,
            profile = %profile,
            passed,
            issue_count,
            duration_ms,
            "Validation completed"
        ),
        GateEvent::ValidationSkipped {
            trigger,
            profile,
            reason,
        } => tracing::info!(trigger = %trigger, profile = %profile, reason = %reason, "Validation skipped"),
        GateEvent::DeploymentIssue {
            environment,
            validation_id,
        } => tracing::warn!(environment = %environment, validation_id = %validation_id, "Deployment issue"),
        other => tracing::debug!(event = other.name(), "Gate event"),
    }
}

/// Handle to a running feedback bridge.
pub struct FeedbackBridge {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Vec<FeedbackOutcome>>,
}

impl FeedbackBridge {
    /// Stop listening, then wait for in-flight feedback runs.
    pub async fn finish(self) -> Vec<FeedbackOutcome> {
        let _ = self.shutdown.send(());
        match self.handle.await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                tracing::error!(error = %e, "Feedback bridge panicked");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutorCommandConfig, ValidatorCommandConfig};
    use vigil_triggers::{Event, EventKind};

    fn config(validator: &str) -> VigilConfig {
        let mut config = VigilConfig::default();
        config.dispatcher.debounce = std::time::Duration::ZERO;
        config.validators.push(ValidatorCommandConfig {
            name: "gemini-advisor".into(),
            model: "gemini-cli".into(),
            command: validator.into(),
            tools: vec![],
        });
        config.executors.push(ExecutorCommandConfig {
            capability: "builder".into(),
            command: r#"cat >/dev/null; echo '{"success":true}'"#.into(),
        });
        config
    }

    #[tokio::test]
    async fn build_registers_capabilities() {
        let pipeline = Pipeline::build(&config("cat >/dev/null; echo '{}'")).unwrap();
        assert_eq!(pipeline.feedback.capabilities(), vec!["builder".to_string()]);
        assert!(pipeline.orchestrator.profile("code_quality").is_some());
        assert!(!pipeline.dispatcher.rules().is_empty());
    }

    #[tokio::test]
    async fn failed_automatic_validation_reaches_feedback() {
        let pipeline = Pipeline::build(&config(
            r#"cat >/dev/null; echo '{"issues":[{"severity":"critical","message":"syntax error: unexpected token"}]}'"#,
        ))
        .unwrap();
        let bridge = pipeline.spawn_feedback_bridge();

        let event = Event::new(EventKind::FileCreated, "src/app.ts")
            .with_payload(serde_json::json!({ "content": "let x = ;" }));
        pipeline.dispatcher.handle_event(event).await.unwrap();
        pipeline.dispatcher.wait_idle().await;

        let outcomes = bridge.finish().await;
        assert_eq!(outcomes.len(), 1);
        let refinement = outcomes[0].refinement.as_ref().unwrap();
        assert!(refinement.success);
        assert_eq!(pipeline.feedback.statistics().total_feedback, 1);
    }

    #[tokio::test]
    async fn passing_validation_is_not_forwarded() {
        let pipeline = Pipeline::build(&config("cat >/dev/null; echo '{}'")).unwrap();
        let bridge = pipeline.spawn_feedback_bridge();

        let event = Event::new(EventKind::FileCreated, "src/app.ts");
        pipeline.dispatcher.handle_event(event).await.unwrap();
        pipeline.dispatcher.wait_idle().await;

        assert!(bridge.finish().await.is_empty());
    }
}
