//! Keyword-driven issue taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};
use vigil_types::Issue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Syntax,
    Logic,
    Security,
    Performance,
    Style,
    Structure,
    Testing,
    Documentation,
    Other,
}

impl IssueCategory {
    pub const ALL: [IssueCategory; 9] = [
        IssueCategory::Syntax,
        IssueCategory::Logic,
        IssueCategory::Security,
        IssueCategory::Performance,
        IssueCategory::Style,
        IssueCategory::Structure,
        IssueCategory::Testing,
        IssueCategory::Documentation,
        IssueCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IssueCategory::Syntax => "syntax",
            IssueCategory::Logic => "logic",
            IssueCategory::Security => "security",
            IssueCategory::Performance => "performance",
            IssueCategory::Style => "style",
            IssueCategory::Structure => "structure",
            IssueCategory::Testing => "testing",
            IssueCategory::Documentation => "documentation",
            IssueCategory::Other => "other",
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories in match order with their keywords. The first category with a
/// keyword found in the issue text wins; nothing matching means `Other`.
pub const CATEGORY_KEYWORDS: &[(IssueCategory, &[&str])] = &[
    (IssueCategory::Syntax, &["syntax", "parse", "compile"]),
    (IssueCategory::Logic, &["logic", "algorithm", "flow"]),
    (
        IssueCategory::Security,
        &["security", "vulnerability", "auth", "injection"],
    ),
    (
        IssueCategory::Performance,
        &["performance", "slow", "memory", "optimization"],
    ),
    (IssueCategory::Style, &["style", "format", "naming", "convention"]),
    (
        IssueCategory::Structure,
        &["structure", "architecture", "pattern", "design"],
    ),
    (IssueCategory::Testing, &["test", "coverage", "assertion", "mock"]),
    (
        IssueCategory::Documentation,
        &["documentation", "comment", "readme", "api"],
    ),
];

/// Categorize an issue by substring match over its message and type.
pub fn categorize(issue: &Issue) -> IssueCategory {
    let text = format!("{} {}", issue.message, issue.kind).to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(IssueCategory::Other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::Severity;

    fn issue(kind: &str, message: &str) -> Issue {
        Issue::new(kind, Severity::Medium, message)
    }

    #[test]
    fn message_and_type_both_count() {
        assert_eq!(
            categorize(&issue("general", "SQL Injection in query builder")),
            IssueCategory::Security
        );
        assert_eq!(
            categorize(&issue("coverage", "branch never exercised")),
            IssueCategory::Testing
        );
    }

    #[test]
    fn table_order_breaks_ties() {
        // "parse" (syntax) precedes "design" (structure).
        assert_eq!(
            categorize(&issue("x", "cannot parse design document")),
            IssueCategory::Syntax
        );
    }

    #[test]
    fn unmatched_is_other() {
        assert_eq!(categorize(&issue("misc", "something odd")), IssueCategory::Other);
    }
}
