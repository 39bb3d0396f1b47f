//! Checkpoint flags and the fixed validation batteries run at lifecycle points.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vigil_types::Severity;

pub const PRE_COMMIT: &str = "pre_commit";
pub const PRE_PUSH: &str = "pre_push";
pub const POST_CREATION: &str = "post_creation";
pub const PRE_DEPLOYMENT: &str = "pre_deployment";
pub const POST_DEPLOYMENT: &str = "post_deployment";

/// Named on/off switches for checkpoint flows. Names absent from the map are enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointFlags(BTreeMap<String, bool>);

impl Default for CheckpointFlags {
    fn default() -> Self {
        let names = [
            PRE_COMMIT,
            PRE_PUSH,
            POST_CREATION,
            PRE_DEPLOYMENT,
            POST_DEPLOYMENT,
            "architecture_change",
            "dependency_update",
            "security_critical",
        ];
        Self(names.iter().map(|n| (n.to_string(), true)).collect())
    }
}

impl CheckpointFlags {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(true)
    }

    pub fn set(&mut self, name: impl Into<String>, enabled: bool) {
        self.0.insert(name.into(), enabled);
    }

    /// Overlay `other` onto these flags.
    pub fn merge(&mut self, other: &CheckpointFlags) {
        for (name, enabled) in &other.0 {
            self.0.insert(name.clone(), *enabled);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// One profile run in a checkpoint battery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatteryEntry {
    pub profile: &'static str,
    pub priority: Severity,
}

const fn entry(profile: &'static str, priority: Severity) -> BatteryEntry {
    BatteryEntry { profile, priority }
}

pub const PRE_PUSH_BATTERY: [BatteryEntry; 3] = [
    entry("security", Severity::Critical),
    entry("testing", Severity::High),
    entry("compliance", Severity::High),
];

pub const PRE_DEPLOYMENT_BATTERY: [BatteryEntry; 4] = [
    entry("security", Severity::Critical),
    entry("compliance", Severity::Critical),
    entry("performance", Severity::High),
    entry("testing", Severity::High),
];

fn extension(file: &str) -> Option<&str> {
    Path::new(file).extension().and_then(|e| e.to_str())
}

fn is_code_file(file: &str) -> bool {
    matches!(
        extension(file),
        Some("js" | "ts" | "jsx" | "tsx" | "py" | "java" | "go" | "rs")
    )
}

fn is_config_file(file: &str) -> bool {
    matches!(
        extension(file),
        Some("json" | "yaml" | "yml" | "env" | "toml")
    ) || Path::new(file).file_name().and_then(|n| n.to_str()) == Some(".env")
}

fn is_test_file(file: &str) -> bool {
    let Some(name) = Path::new(file).file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    matches!(extension(file), Some("js" | "ts" | "jsx" | "tsx"))
        && (name.contains(".test.") || name.contains(".spec."))
}

/// Group staged files into the pre-commit battery: code → code_quality,
/// config → compliance, tests → testing. A file may land in several groups.
pub fn pre_commit_groups(files: &[String]) -> Vec<(&'static str, Vec<String>)> {
    let select = |pred: fn(&str) -> bool| -> Vec<String> {
        files.iter().filter(|f| pred(f)).cloned().collect()
    };
    [
        ("code_quality", select(is_code_file)),
        ("compliance", select(is_config_file)),
        ("testing", select(is_test_file)),
    ]
    .into_iter()
    .filter(|(_, group)| !group.is_empty())
    .collect()
}

/// Stage names that produce code and deserve a quality pass.
pub fn is_creation_stage(stage: &str) -> bool {
    ["implementation", "code", "build"]
        .iter()
        .any(|marker| stage.contains(marker))
}

/// Profile for a workflow checkpoint kind.
pub fn workflow_profile(kind: &str) -> &'static str {
    match kind {
        "architecture" => "architecture",
        "security" => "security",
        "performance" => "performance",
        "testing" => "testing",
        "deployment" => "compliance",
        _ => "code_quality",
    }
}
