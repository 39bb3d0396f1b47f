//! Shell-command capabilities.
//!
//! Both adapters run `sh -c <command>`, write the task as JSON to stdin, and
//! parse a JSON document from stdout. The child is killed when the future is
//! dropped, so orchestrator and scheduler timeouts reap it.

use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use vigil_feedback::{StageExecutor, StageReport, StageTask};
use vigil_types::{Result, VigilError};
use vigil_validation::{CheckReport, CheckTask, Validator, ValidatorDescriptor};

use crate::config::{ExecutorCommandConfig, ValidatorCommandConfig};

/// Run `command` with `input` on stdin and decode its stdout.
async fn run_json<I, O>(command: &str, input: &I) -> std::result::Result<O, String>
where
    I: Serialize + Sync,
    O: DeserializeOwned,
{
    let payload = serde_json::to_vec(input).map_err(|e| format!("encoding task: {e}"))?;

    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| format!("failed to spawn command: {e}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        // A command that ignores its input may exit before reading it.
        if let Err(e) = stdin.write_all(&payload).await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(format!("writing task: {e}"));
            }
        }
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| format!("command execution failed: {e}"))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    tracing::debug!(
        command = %command,
        exit_code = output.status.code().unwrap_or(-1),
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "Capability command completed"
    );

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        return Err(format!("exit code {code}: {}", stderr.trim()));
    }
    serde_json::from_str(stdout.trim()).map_err(|e| format!("invalid JSON output: {e}"))
}

// ---------------------------------------------------------------------------
// CommandValidator
// ---------------------------------------------------------------------------

pub struct CommandValidator {
    descriptor: ValidatorDescriptor,
    command: String,
}

impl CommandValidator {
    pub fn new(config: &ValidatorCommandConfig) -> Self {
        Self {
            descriptor: ValidatorDescriptor {
                name: config.name.clone(),
                model: config.model.clone(),
                tools: config.tools.clone(),
            },
            command: config.command.clone(),
        }
    }
}

#[async_trait]
impl Validator for CommandValidator {
    fn descriptor(&self) -> ValidatorDescriptor {
        self.descriptor.clone()
    }

    async fn run_check(&self, task: &CheckTask) -> Result<CheckReport> {
        run_json(&self.command, task)
            .await
            .map_err(|message| VigilError::CheckExecution {
                check: task.check.clone(),
                message,
            })
    }
}

// ---------------------------------------------------------------------------
// CommandStageExecutor
// ---------------------------------------------------------------------------

pub struct CommandStageExecutor {
    capability: String,
    command: String,
}

impl CommandStageExecutor {
    pub fn new(config: &ExecutorCommandConfig) -> Self {
        Self {
            capability: config.capability.clone(),
            command: config.command.clone(),
        }
    }
}

#[async_trait]
impl StageExecutor for CommandStageExecutor {
    fn capability(&self) -> &str {
        &self.capability
    }

    async fn execute(&self, task: &StageTask) -> Result<StageReport> {
        run_json(&self.command, task)
            .await
            .map_err(|message| VigilError::StageExecution {
                stage: task.stage_id.clone(),
                message,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_feedback::{IssueCategory, StageContext};
    use vigil_types::{Severity, Target};
    use vigil_validation::Restrictions;

    fn check_task() -> CheckTask {
        CheckTask {
            validation_id: "v1".into(),
            target: Target::code("fn main() {}"),
            check: "syntax".into(),
            intent: "find syntax errors".into(),
            focus: vec![],
            allowed_tools: vec!["read_file".into()],
            restrictions: Restrictions::analysis_only(),
        }
    }

    fn validator(command: &str) -> CommandValidator {
        CommandValidator::new(&ValidatorCommandConfig {
            name: "gemini-advisor".into(),
            model: "gemini-cli".into(),
            command: command.into(),
            tools: vec![],
        })
    }

    #[tokio::test]
    async fn validator_parses_report() {
        let report = validator(
            r#"cat >/dev/null; echo '{"issues":[{"severity":"high","message":"unclosed brace"}]}'"#,
        )
        .run_check(&check_task())
        .await
        .unwrap();
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].severity, Some(Severity::High));
    }

    #[tokio::test]
    async fn validator_receives_task_on_stdin() {
        // Echo back the check name as a suggestion.
        let command = r#"check=$(grep -o '"check":"[a-z]*"' | cut -d'"' -f4); echo "{\"suggestions\":[\"$check\"]}""#;
        let report = validator(command).run_check(&check_task()).await.unwrap();
        assert_eq!(report.suggestions, vec!["syntax"]);
    }

    #[tokio::test]
    async fn nonzero_exit_is_check_error() {
        let err = validator("cat >/dev/null; echo boom >&2; exit 3")
            .run_check(&check_task())
            .await
            .unwrap_err();
        match err {
            VigilError::CheckExecution { check, message } => {
                assert_eq!(check, "syntax");
                assert!(message.contains("exit code 3"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn executor_reports_stage_failure() {
        let executor = CommandStageExecutor::new(&ExecutorCommandConfig {
            capability: "builder".into(),
            command: "cat >/dev/null; echo 'not json'".into(),
        });
        let task = StageTask {
            plan_id: "p1".into(),
            stage_id: "s1".into(),
            action: "format_code".into(),
            description: "Format".into(),
            category: IssueCategory::Style,
            issues: vec![],
            context: StageContext {
                automatic: true,
                priority: Severity::Medium,
            },
        };
        assert_eq!(executor.capability(), "builder");
        let err = executor.execute(&task).await.unwrap_err();
        assert!(matches!(err, VigilError::StageExecution { ref stage, .. } if stage == "s1"));

        let executor = CommandStageExecutor::new(&ExecutorCommandConfig {
            capability: "builder".into(),
            command: r#"cat >/dev/null; echo '{"success":false}'"#.into(),
        });
        let report = executor.execute(&task).await.unwrap();
        assert!(!report.success);
    }
}
