//! Validator capability trait and registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vigil_types::{Issue, IssueLocation, Result, Severity, Target};

/// What a validator declares about itself when it is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDescriptor {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub tools: Vec<String>,
}

/// Hard restrictions stamped on every task a bound validator receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Restrictions {
    pub no_code_generation: bool,
    pub analysis_only: bool,
    pub read_only: bool,
}

impl Restrictions {
    pub fn analysis_only() -> Self {
        Self {
            no_code_generation: true,
            analysis_only: true,
            read_only: true,
        }
    }
}

/// One check to run against a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckTask {
    pub validation_id: String,
    pub target: Target,
    pub check: String,
    pub intent: String,
    pub focus: Vec<String>,
    pub allowed_tools: Vec<String>,
    pub restrictions: Restrictions,
}

/// An issue as returned by a validator, before it is stamped with its check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportedIssue {
    #[serde(default)]
    pub severity: Option<Severity>,
    pub message: String,
    #[serde(default)]
    pub location: Option<IssueLocation>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

impl ReportedIssue {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity: Some(severity),
            message: message.into(),
            location: None,
            suggestion: None,
        }
    }

    /// Missing severity defaults to medium.
    pub fn into_issue(self, check: &str) -> Issue {
        Issue {
            kind: check.to_string(),
            severity: self.severity.unwrap_or_default(),
            message: self.message,
            location: self.location,
            suggestion: self.suggestion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckReport {
    pub issues: Vec<ReportedIssue>,
    pub suggestions: Vec<String>,
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl CheckReport {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn with_issue(mut self, issue: ReportedIssue) -> Self {
        self.issues.push(issue);
        self
    }
}

// ---------------------------------------------------------------------------
// Validator trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Validator: Send + Sync {
    fn descriptor(&self) -> ValidatorDescriptor;

    /// Run one check. Errors are absorbed by the orchestrator into an
    /// `error` check status.
    async fn run_check(&self, task: &CheckTask) -> Result<CheckReport>;
}

// ---------------------------------------------------------------------------
// ValidatorRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Arc<dyn Validator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, validator: Arc<dyn Validator>) {
        let name = validator.descriptor().name;
        self.validators.insert(name, validator);
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.validators.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Validator>> {
        self.validators.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.validators.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}
