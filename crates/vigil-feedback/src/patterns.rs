//! Clustering of related issues into patterns.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use vigil_types::Issue;

/// Issues sharing one location needed to form a cluster.
pub const LOCATION_CLUSTER_MIN: usize = 2;
/// Occurrences of one normalized message needed to count as repeated.
pub const REPEATED_ISSUE_MIN: usize = 3;

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssuePattern {
    LocationCluster { location: String, count: usize },
    RepeatedIssue { message: String, count: usize },
}

impl IssuePattern {
    pub fn count(&self) -> usize {
        match self {
            IssuePattern::LocationCluster { count, .. } | IssuePattern::RepeatedIssue { count, .. } => {
                *count
            }
        }
    }

    pub fn description(&self) -> String {
        match self {
            IssuePattern::LocationCluster { location, .. } => {
                format!("Multiple issues in {location}")
            }
            IssuePattern::RepeatedIssue { message, .. } => format!("Repeated issue: {message}"),
        }
    }
}

/// Lowercase, digits runs to `N`, quotes stripped, whitespace collapsed.
pub fn normalize_message(message: &str) -> String {
    let lowered = message.to_lowercase();
    let numbered = DIGIT_RUN.replace_all(&lowered, "N");
    let unquoted: String = numbered
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | '`'))
        .collect();
    unquoted.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Location clusters first, then repeated messages, each ordered by key.
pub fn identify_patterns(issues: &[Issue]) -> Vec<IssuePattern> {
    let mut by_location: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_message: BTreeMap<String, usize> = BTreeMap::new();

    for issue in issues {
        if let Some(location) = &issue.location {
            *by_location.entry(location.cluster_key()).or_default() += 1;
        }
        *by_message.entry(normalize_message(&issue.message)).or_default() += 1;
    }

    let clusters = by_location
        .into_iter()
        .filter(|(_, count)| *count >= LOCATION_CLUSTER_MIN)
        .map(|(location, count)| IssuePattern::LocationCluster { location, count });
    let repeats = by_message
        .into_iter()
        .filter(|(_, count)| *count >= REPEATED_ISSUE_MIN)
        .map(|(message, count)| IssuePattern::RepeatedIssue { message, count });
    clusters.chain(repeats).collect()
}
