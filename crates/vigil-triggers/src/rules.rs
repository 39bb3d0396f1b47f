//! Trigger rules: which event kinds on which subjects start which profile.

use std::fmt;

use serde::{Deserialize, Serialize};
use vigil_types::{Result, Severity, VigilError};

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FileCreated,
    FileModified,
    FileDeleted,
    CodeCreated,
    CodeModified,
    StageCompleted,
    WorkflowCheckpoint,
    PreCommit,
    PrePush,
    PreDeployment,
    PostDeployment,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::FileCreated => "file_created",
            EventKind::FileModified => "file_modified",
            EventKind::FileDeleted => "file_deleted",
            EventKind::CodeCreated => "code_created",
            EventKind::CodeModified => "code_modified",
            EventKind::StageCompleted => "stage_completed",
            EventKind::WorkflowCheckpoint => "workflow_checkpoint",
            EventKind::PreCommit => "pre_commit",
            EventKind::PrePush => "pre_push",
            EventKind::PreDeployment => "pre_deployment",
            EventKind::PostDeployment => "post_deployment",
        }
    }

    /// File and code kinds are routed through the rule set.
    pub fn is_rule_matched(self) -> bool {
        matches!(
            self,
            EventKind::FileCreated
                | EventKind::FileModified
                | EventKind::FileDeleted
                | EventKind::CodeCreated
                | EventKind::CodeModified
        )
    }

    pub fn is_code(self) -> bool {
        matches!(self, EventKind::CodeCreated | EventKind::CodeModified)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RulePattern
// ---------------------------------------------------------------------------

/// Serialized form of a pattern: `{"regex": ".."}`, `{"glob": ".."}` or `{"contains": ".."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternSpec {
    Regex(String),
    Glob(String),
    Contains(String),
}

/// A compiled subject matcher.
#[derive(Debug, Clone)]
pub enum RulePattern {
    Regex(regex::Regex),
    Glob {
        source: String,
        matcher: globset::GlobMatcher,
    },
    Contains(String),
}

impl RulePattern {
    pub fn regex(pattern: &str) -> Result<Self> {
        Self::try_from(PatternSpec::Regex(pattern.to_string()))
    }

    pub fn glob(pattern: &str) -> Result<Self> {
        Self::try_from(PatternSpec::Glob(pattern.to_string()))
    }

    pub fn contains(needle: impl Into<String>) -> Self {
        RulePattern::Contains(needle.into())
    }

    pub fn is_match(&self, subject: &str) -> bool {
        match self {
            RulePattern::Regex(re) => re.is_match(subject),
            RulePattern::Glob { matcher, .. } => matcher.is_match(subject),
            RulePattern::Contains(needle) => subject.contains(needle.as_str()),
        }
    }
}

impl TryFrom<PatternSpec> for RulePattern {
    type Error = VigilError;

    fn try_from(spec: PatternSpec) -> Result<Self> {
        match spec {
            PatternSpec::Regex(src) => regex::Regex::new(&src)
                .map(RulePattern::Regex)
                .map_err(|e| VigilError::InvalidRule {
                    rule: src,
                    message: e.to_string(),
                }),
            PatternSpec::Glob(src) => match globset::Glob::new(&src) {
                Ok(glob) => Ok(RulePattern::Glob {
                    matcher: glob.compile_matcher(),
                    source: src,
                }),
                Err(e) => Err(VigilError::InvalidRule {
                    rule: src,
                    message: e.to_string(),
                }),
            },
            PatternSpec::Contains(needle) => Ok(RulePattern::Contains(needle)),
        }
    }
}

impl From<RulePattern> for PatternSpec {
    fn from(pattern: RulePattern) -> Self {
        match pattern {
            RulePattern::Regex(re) => PatternSpec::Regex(re.as_str().to_string()),
            RulePattern::Glob { source, .. } => PatternSpec::Glob(source),
            RulePattern::Contains(needle) => PatternSpec::Contains(needle),
        }
    }
}

impl Serialize for RulePattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        PatternSpec::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RulePattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let spec = PatternSpec::deserialize(deserializer)?;
        RulePattern::try_from(spec).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// TriggerRule and RuleSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRule {
    pub name: String,
    pub pattern: RulePattern,
    pub event: EventKind,
    pub profile: String,
    #[serde(default)]
    pub priority: Severity,
}

impl TriggerRule {
    pub fn new(
        name: impl Into<String>,
        pattern: RulePattern,
        event: EventKind,
        profile: impl Into<String>,
        priority: Severity,
    ) -> Self {
        Self {
            name: name.into(),
            pattern,
            event,
            profile: profile.into(),
            priority,
        }
    }

    pub fn matches(&self, kind: EventKind, subject: &str) -> bool {
        self.event == kind && self.pattern.is_match(subject)
    }
}

/// The eight built-in rules.
pub fn default_rules() -> Result<Vec<TriggerRule>> {
    Ok(vec![
        TriggerRule::new(
            "code_creation",
            RulePattern::regex(r"\.(js|ts|jsx|tsx|py|java|go|rs)$")?,
            EventKind::FileCreated,
            "code_quality",
            Severity::Medium,
        ),
        TriggerRule::new(
            "api_endpoint",
            RulePattern::regex(r"/(routes|controllers|api)/")?,
            EventKind::FileModified,
            "security",
            Severity::High,
        ),
        TriggerRule::new(
            "database_change",
            RulePattern::regex(r"/(models|schemas|migrations)/")?,
            EventKind::FileModified,
            "architecture",
            Severity::High,
        ),
        TriggerRule::new(
            "test_creation",
            RulePattern::regex(r"\.(test|spec)\.(js|ts|jsx|tsx)$")?,
            EventKind::FileCreated,
            "testing",
            Severity::Medium,
        ),
        TriggerRule::new(
            "config_change",
            RulePattern::regex(r"\.(json|yaml|yml|env|config)$")?,
            EventKind::FileModified,
            "compliance",
            Severity::Critical,
        ),
        TriggerRule::new(
            "authentication",
            RulePattern::regex(r"(?i)(auth|login|session|token)")?,
            EventKind::CodeModified,
            "security",
            Severity::Critical,
        ),
        TriggerRule::new(
            "deployment_files",
            RulePattern::regex(r"(Dockerfile|docker-compose|k8s|deploy)")?,
            EventKind::FileModified,
            "compliance",
            Severity::High,
        ),
        TriggerRule::new(
            "ui_components",
            RulePattern::regex(r"/(components|views|pages)/")?,
            EventKind::FileCreated,
            "accessibility",
            Severity::Medium,
        ),
    ])
}

/// Ordered rule list. Declaration order breaks priority ties.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<TriggerRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<TriggerRule>) -> Self {
        Self { rules }
    }

    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(default_rules()?))
    }

    /// Append a rule, replacing any existing rule with the same name in place.
    pub fn add(&mut self, rule: TriggerRule) {
        match self.rules.iter_mut().find(|r| r.name == rule.name) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.name != name);
        self.rules.len() != before
    }

    pub fn replace(&mut self, rules: Vec<TriggerRule>) {
        self.rules = rules;
    }

    pub fn rules(&self) -> &[TriggerRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The highest-priority rule matching `kind` and `subject`.
    pub fn resolve(&self, kind: EventKind, subject: &str) -> Option<&TriggerRule> {
        let mut best: Option<&TriggerRule> = None;
        for rule in self.rules.iter().filter(|r| r.matches(kind, subject)) {
            match best {
                Some(current) if rule.priority <= current.priority => {}
                _ => best = Some(rule),
            }
        }
        best
    }
}
