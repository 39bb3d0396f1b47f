//! Built-in validation profiles and the per-check strategy table.
//!
//! A [`ValidationProfile`] names an ordered list of checks and the validator
//! capability that must run them. Each check maps to a [`CheckStrategy`]: the
//! natural-language intent handed to the validator plus the sub-aspects it
//! should focus on.

use serde::{Deserialize, Serialize};
use vigil_types::Severity;

/// The validator capability a profile requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRequirement {
    /// Registry name of the validator (e.g. "gemini-advisor").
    pub name: String,
    /// Substring the validator's declared model must contain.
    pub model_class: String,
}

impl ValidatorRequirement {
    pub fn new(name: impl Into<String>, model_class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_class: model_class.into(),
        }
    }
}

impl Default for ValidatorRequirement {
    fn default() -> Self {
        Self::new("gemini-advisor", "gemini")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationProfile {
    pub name: String,
    #[serde(default)]
    pub validator: ValidatorRequirement,
    pub checks: Vec<String>,
    /// Default severity classification for this concern.
    #[serde(default)]
    pub severity: Severity,
}

impl ValidationProfile {
    pub fn new(name: impl Into<String>, checks: &[&str], severity: Severity) -> Self {
        Self {
            name: name.into(),
            validator: ValidatorRequirement::default(),
            checks: checks.iter().map(|c| c.to_string()).collect(),
            severity,
        }
    }

    pub fn with_validator(mut self, validator: ValidatorRequirement) -> Self {
        self.validator = validator;
        self
    }
}

/// The eight built-in profiles.
pub fn default_profiles() -> Vec<ValidationProfile> {
    vec![
        ValidationProfile::new(
            "code_quality",
            &["syntax", "style", "complexity", "maintainability"],
            Severity::Medium,
        ),
        ValidationProfile::new(
            "security",
            &["vulnerabilities", "authentication", "authorization", "injection"],
            Severity::Critical,
        ),
        ValidationProfile::new(
            "performance",
            &["time_complexity", "space_complexity", "bottlenecks", "optimization"],
            Severity::High,
        ),
        ValidationProfile::new(
            "architecture",
            &["patterns", "dependencies", "coupling", "cohesion"],
            Severity::High,
        ),
        ValidationProfile::new(
            "testing",
            &["coverage", "edge_cases", "mocking", "assertions"],
            Severity::Medium,
        ),
        ValidationProfile::new(
            "documentation",
            &["completeness", "clarity", "examples", "api_docs"],
            Severity::Low,
        ),
        ValidationProfile::new(
            "compliance",
            &["licenses", "standards", "regulations", "policies"],
            Severity::Critical,
        ),
        ValidationProfile::new(
            "accessibility",
            &["wcag", "aria", "keyboard", "screen_reader"],
            Severity::High,
        ),
    ]
}

// ---------------------------------------------------------------------------
// Check strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckStrategy {
    pub intent: &'static str,
    pub focus: &'static [&'static str],
}

const STRATEGIES: &[(&str, CheckStrategy)] = &[
    // code quality
    ("syntax", CheckStrategy {
        intent: "Analyze code syntax and identify any errors or issues",
        focus: &["syntax_errors", "typos", "missing_brackets"],
    }),
    ("style", CheckStrategy {
        intent: "Check code style and formatting consistency",
        focus: &["indentation", "naming_conventions", "formatting"],
    }),
    ("complexity", CheckStrategy {
        intent: "Analyze code complexity and identify overly complex sections",
        focus: &["cyclomatic_complexity", "nesting_depth", "function_length"],
    }),
    ("maintainability", CheckStrategy {
        intent: "Assess code maintainability and readability",
        focus: &["clarity", "documentation", "modularity"],
    }),
    // security
    ("vulnerabilities", CheckStrategy {
        intent: "Identify security vulnerabilities and risks",
        focus: &["injection", "xss", "csrf", "exposure"],
    }),
    ("authentication", CheckStrategy {
        intent: "Review authentication implementation and security",
        focus: &["password_handling", "session_management", "tokens"],
    }),
    ("authorization", CheckStrategy {
        intent: "Check authorization and access control",
        focus: &["permissions", "roles", "access_control"],
    }),
    ("injection", CheckStrategy {
        intent: "Check for injection vulnerabilities",
        focus: &["sql_injection", "command_injection", "ldap_injection"],
    }),
    // performance
    ("time_complexity", CheckStrategy {
        intent: "Analyze time complexity of algorithms",
        focus: &["big_o", "nested_loops", "recursion"],
    }),
    ("space_complexity", CheckStrategy {
        intent: "Analyze space complexity and memory usage",
        focus: &["memory_leaks", "large_allocations", "caching"],
    }),
    ("bottlenecks", CheckStrategy {
        intent: "Identify performance bottlenecks",
        focus: &["slow_operations", "blocking_calls", "inefficient_queries"],
    }),
    ("optimization", CheckStrategy {
        intent: "Suggest performance optimizations",
        focus: &["caching", "lazy_loading", "batch_processing"],
    }),
    // architecture
    ("patterns", CheckStrategy {
        intent: "Review design patterns and architectural decisions",
        focus: &["design_patterns", "anti_patterns", "best_practices"],
    }),
    ("dependencies", CheckStrategy {
        intent: "Analyze dependencies and coupling",
        focus: &["circular_dependencies", "version_conflicts", "unused_dependencies"],
    }),
    ("coupling", CheckStrategy {
        intent: "Check coupling between components",
        focus: &["tight_coupling", "loose_coupling", "interfaces"],
    }),
    ("cohesion", CheckStrategy {
        intent: "Assess component cohesion",
        focus: &["single_responsibility", "module_cohesion", "class_cohesion"],
    }),
    // testing
    ("coverage", CheckStrategy {
        intent: "Review test coverage and completeness",
        focus: &["line_coverage", "branch_coverage", "untested_code"],
    }),
    ("edge_cases", CheckStrategy {
        intent: "Identify missing edge case tests",
        focus: &["boundary_conditions", "error_cases", "null_checks"],
    }),
    ("mocking", CheckStrategy {
        intent: "Review mocking and test isolation",
        focus: &["mock_usage", "test_isolation", "dependencies"],
    }),
    ("assertions", CheckStrategy {
        intent: "Check test assertions and expectations",
        focus: &["assertion_quality", "meaningful_tests", "false_positives"],
    }),
    // documentation
    ("completeness", CheckStrategy {
        intent: "Check that public interfaces and behavior are documented",
        focus: &["missing_docs", "undocumented_parameters", "outdated_docs"],
    }),
    ("clarity", CheckStrategy {
        intent: "Assess whether documentation is clear and accurate",
        focus: &["ambiguity", "terminology", "structure"],
    }),
    ("examples", CheckStrategy {
        intent: "Review usage examples for coverage and correctness",
        focus: &["missing_examples", "broken_examples", "realistic_usage"],
    }),
    ("api_docs", CheckStrategy {
        intent: "Review API reference documentation",
        focus: &["endpoints", "parameters", "error_responses"],
    }),
    // compliance
    ("licenses", CheckStrategy {
        intent: "Check license headers and dependency license compatibility",
        focus: &["license_headers", "incompatible_licenses", "attribution"],
    }),
    ("standards", CheckStrategy {
        intent: "Check adherence to project and industry coding standards",
        focus: &["coding_standards", "conventions", "lint_rules"],
    }),
    ("regulations", CheckStrategy {
        intent: "Identify regulatory concerns in data handling",
        focus: &["personal_data", "data_retention", "audit_logging"],
    }),
    ("policies", CheckStrategy {
        intent: "Check compliance with organizational policies",
        focus: &["secrets_in_code", "approved_dependencies", "review_requirements"],
    }),
    // accessibility
    ("wcag", CheckStrategy {
        intent: "Check conformance with WCAG guidelines",
        focus: &["contrast", "text_alternatives", "semantic_structure"],
    }),
    ("aria", CheckStrategy {
        intent: "Review ARIA roles and attributes",
        focus: &["roles", "labels", "live_regions"],
    }),
    ("keyboard", CheckStrategy {
        intent: "Check keyboard navigation and focus handling",
        focus: &["focus_order", "focus_visibility", "keyboard_traps"],
    }),
    ("screen_reader", CheckStrategy {
        intent: "Assess screen reader compatibility",
        focus: &["announcements", "reading_order", "hidden_content"],
    }),
];

/// Look up the strategy for a check id.
pub fn check_strategy(check: &str) -> Option<CheckStrategy> {
    STRATEGIES
        .iter()
        .find(|(name, _)| *name == check)
        .map(|(_, strategy)| *strategy)
}
