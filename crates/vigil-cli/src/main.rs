//! CLI binary for the Vigil quality gate.

mod command;
mod config;
mod pipeline;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use vigil_feedback::FeedbackOptions;
use vigil_triggers::{DispatchOutcome, Event};
use vigil_types::{Target, ValidationResult, VigilError};

use crate::config::VigilConfig;
use crate::pipeline::Pipeline;

/// Exit code when a checkpoint blocks the operation.
const EXIT_BLOCKED: i32 = 2;

#[derive(Parser)]
#[command(name = "vigil", version, about = "Quality gate for generated artifacts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ./vigil.json if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one file against a profile
    Validate {
        /// Profile name (e.g. code_quality, security)
        profile: String,

        /// File to validate
        path: PathBuf,

        /// Build a refinement plan even when the run passed
        #[arg(long)]
        refine: bool,
    },

    /// Read JSON-lines events from stdin and dispatch them
    Watch,

    /// Run a checkpoint battery
    Checkpoint {
        #[command(subcommand)]
        checkpoint: Checkpoint,
    },

    /// List validation profiles
    Profiles,
}

#[derive(Subcommand)]
enum Checkpoint {
    /// Validate the files about to be committed
    PreCommit {
        files: Vec<String>,
    },
    /// Security and testing gate before a push
    PrePush {
        files: Vec<String>,
    },
    /// Full battery before deploying to an environment
    PreDeploy {
        environment: String,
        /// Release being deployed
        #[arg(long = "release")]
        version: Option<String>,
    },
    /// Compliance pass after a deployment
    PostDeploy {
        environment: String,
        /// Release being deployed
        #[arg(long = "release")]
        version: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = VigilConfig::load(cli.config.as_deref())?;
    let pipeline = Pipeline::build(&config)?;

    match cli.command {
        Commands::Validate {
            profile,
            path,
            refine,
        } => cmd_validate(&pipeline, &profile, &path, refine).await?,
        Commands::Watch => cmd_watch(&pipeline).await?,
        Commands::Checkpoint { checkpoint } => cmd_checkpoint(&pipeline, checkpoint).await?,
        Commands::Profiles => cmd_profiles(&pipeline)?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

async fn cmd_validate(
    pipeline: &Pipeline,
    profile: &str,
    path: &Path,
    refine: bool,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let target = Target::File {
        path: path.display().to_string(),
        content: Some(content),
    };

    let result = pipeline.dispatcher.validate_manually(profile, target).await?;
    let report = pipeline.orchestrator.report(&result.id);

    let feedback = if refine || !result.passed {
        let options = FeedbackOptions {
            force_refine: refine,
            auto_refine: None,
        };
        Some(pipeline.feedback.process_feedback(&result, options).await?)
    } else {
        None
    };

    print_json(&serde_json::json!({
        "report": report,
        "feedback": feedback,
    }))?;

    if !result.passed {
        tracing::error!(
            profile,
            reason = result.reason.as_deref().unwrap_or(""),
            "Validation failed"
        );
        std::process::exit(1);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// watch
// ---------------------------------------------------------------------------

async fn cmd_watch(pipeline: &Pipeline) -> anyhow::Result<()> {
    let logger = pipeline.spawn_event_logger();
    let bridge = pipeline.spawn_feedback_bridge();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: Event = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed event");
                continue;
            }
        };
        match pipeline.dispatcher.handle_event(event).await {
            Ok(outcome) => log_outcome(line_no, &outcome),
            Err(e) if e.is_blocking() => {
                tracing::error!(line = line_no, error = %e, "Checkpoint blocked");
            }
            Err(e) => tracing::error!(line = line_no, error = %e, "Dispatch failed"),
        }
    }

    pipeline.dispatcher.wait_idle().await;
    let outcomes = bridge.finish().await;
    logger.abort();

    print_json(&serde_json::json!({
        "dispatcher": pipeline.dispatcher.statistics(),
        "feedback": pipeline.feedback.statistics(),
        "refinements": outcomes,
        "learning": pipeline.feedback.learning_insights(),
    }))
}

fn log_outcome(line: usize, outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Discarded => tracing::debug!(line, "No rule matched"),
        DispatchOutcome::Skipped { reason } => tracing::debug!(line, reason = %reason, "Skipped"),
        DispatchOutcome::Completed(result) => {
            tracing::info!(line, profile = %result.profile, passed = result.passed, "Validated")
        }
        DispatchOutcome::Debounced { delay } => {
            tracing::debug!(line, delay_ms = delay.as_millis() as u64, "Debounced")
        }
        DispatchOutcome::Queued { position } => tracing::debug!(line, position, "Queued"),
        DispatchOutcome::Battery(results) => {
            tracing::info!(line, profiles = results.len(), "Checkpoint passed")
        }
    }
}

// ---------------------------------------------------------------------------
// checkpoint
// ---------------------------------------------------------------------------

async fn cmd_checkpoint(pipeline: &Pipeline, checkpoint: Checkpoint) -> anyhow::Result<()> {
    let outcome: Result<Vec<ValidationResult>, VigilError> = match checkpoint {
        Checkpoint::PreCommit { files } => pipeline.dispatcher.pre_commit(files).await,
        Checkpoint::PrePush { files } => {
            pipeline.dispatcher.pre_push(Target::Files { files }).await
        }
        Checkpoint::PreDeploy {
            environment,
            version,
        } => {
            let target = Target::Deployment {
                environment: environment.clone(),
                version,
            };
            pipeline.dispatcher.pre_deployment(&environment, target).await
        }
        Checkpoint::PostDeploy {
            environment,
            version,
        } => pipeline
            .dispatcher
            .post_deployment(&environment, version)
            .await
            .map(|result| result.into_iter().collect()),
    };

    match outcome {
        Ok(results) => print_json(&results),
        Err(e) if e.is_blocking() => {
            if let Some(results) = e.blocked_results() {
                print_json(&results)?;
            }
            tracing::error!(error = %e, "Checkpoint blocked");
            std::process::exit(EXIT_BLOCKED);
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// profiles
// ---------------------------------------------------------------------------

fn cmd_profiles(pipeline: &Pipeline) -> anyhow::Result<()> {
    let mut profiles = pipeline.orchestrator.profiles();
    profiles.sort_by(|a, b| a.name.cmp(&b.name));
    for profile in &profiles {
        println!(
            "{:<15} {:<9} {}",
            profile.name,
            profile.severity.as_str(),
            profile.checks.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_checkpoint_subcommands() {
        let cli = Cli::parse_from(["vigil", "checkpoint", "pre-deploy", "prod", "--release", "1.2"]);
        match cli.command {
            Commands::Checkpoint {
                checkpoint: Checkpoint::PreDeploy {
                    environment,
                    version,
                },
            } => {
                assert_eq!(environment, "prod");
                assert_eq!(version.as_deref(), Some("1.2"));
            }
            _ => panic!("expected pre-deploy"),
        }

        let cli = Cli::parse_from(["vigil", "-v", "checkpoint", "pre-commit", "a.rs", "b.rs"]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Checkpoint {
                checkpoint: Checkpoint::PreCommit { ref files }
            } if files.len() == 2
        ));
    }
}
