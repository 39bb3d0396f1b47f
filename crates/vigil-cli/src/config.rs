//! JSON configuration for the `vigil` binary.

use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use vigil_feedback::FeedbackConfig;
use vigil_triggers::{DispatcherConfig, TriggerRule};
use vigil_validation::{OrchestratorConfig, ValidationProfile};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "vigil.json";

/// A validator backed by a shell command. The command receives the check
/// task as JSON on stdin and prints a check report as JSON on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorCommandConfig {
    #[serde(default = "default_validator_name")]
    pub name: String,
    #[serde(default = "default_validator_model")]
    pub model: String,
    pub command: String,
    /// Tools the command claims; mutating ones are stripped on binding.
    #[serde(default)]
    pub tools: Vec<String>,
}

fn default_validator_name() -> String {
    "gemini-advisor".into()
}

fn default_validator_model() -> String {
    "gemini-cli".into()
}

/// A stage executor backed by a shell command, keyed by capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorCommandConfig {
    pub capability: String,
    pub command: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    pub orchestrator: OrchestratorConfig,
    pub dispatcher: DispatcherConfig,
    pub feedback: FeedbackConfig,
    /// Replaces the built-in rules when present.
    pub rules: Option<Vec<TriggerRule>>,
    /// Added to, or replacing by name, the built-in profiles.
    pub profiles: Vec<ValidationProfile>,
    pub validators: Vec<ValidatorCommandConfig>,
    pub executors: Vec<ExecutorCommandConfig>,
}

impl VigilConfig {
    pub fn from_json(source: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Load `path`, or `vigil.json` when no path is given. A missing default
    /// file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_FILE), false),
        };
        if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_json(&source)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}
