//! Severity thresholds and the pass/fail verdict.

use serde::{Deserialize, Serialize};
use vigil_types::{Severity, SeverityCounts};

/// Maximum tolerated issue count per tier. A count strictly greater than the
/// threshold fails the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            critical: 0,
            high: 3,
            medium: 5,
            low: 10,
        }
    }
}

impl SeverityThresholds {
    pub fn limit(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub reason: Option<String>,
}

impl Verdict {
    fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }
}

fn tier_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Critical issues",
        Severity::High => "High severity issues",
        Severity::Medium => "Medium severity issues",
        Severity::Low => "Low severity issues",
    }
}

/// Apply thresholds critical → high → medium → low; the first tier over its
/// threshold fails the run. Medium only gates in strict mode, low only when
/// `gate_low` is set.
pub fn evaluate_verdict(
    counts: &SeverityCounts,
    thresholds: &SeverityThresholds,
    strict_mode: bool,
    gate_low: bool,
) -> Verdict {
    for severity in Severity::ALL {
        let gated = match severity {
            Severity::Critical | Severity::High => true,
            Severity::Medium => strict_mode,
            Severity::Low => gate_low,
        };
        if !gated {
            continue;
        }
        let count = counts.count(severity);
        let limit = thresholds.limit(severity);
        if count > limit {
            return Verdict {
                passed: false,
                reason: Some(format!(
                    "{} exceed threshold ({} > {})",
                    tier_label(severity),
                    count,
                    limit
                )),
            };
        }
    }
    Verdict::pass()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(critical: usize, high: usize, medium: usize, low: usize) -> SeverityCounts {
        SeverityCounts {
            critical,
            high,
            medium,
            low,
        }
    }

    #[test]
    fn clean_run_passes() {
        let v = evaluate_verdict(&counts(0, 0, 0, 0), &SeverityThresholds::default(), true, true);
        assert!(v.passed);
        assert!(v.reason.is_none());
    }

    #[test]
    fn single_critical_fails_with_reason() {
        let v = evaluate_verdict(&counts(1, 0, 0, 0), &SeverityThresholds::default(), false, false);
        assert!(!v.passed);
        assert_eq!(
            v.reason.as_deref(),
            Some("Critical issues exceed threshold (1 > 0)")
        );
    }

    #[test]
    fn critical_reported_before_high() {
        let v = evaluate_verdict(&counts(2, 9, 0, 0), &SeverityThresholds::default(), false, false);
        assert_eq!(
            v.reason.as_deref(),
            Some("Critical issues exceed threshold (2 > 0)")
        );
    }

    #[test]
    fn high_at_threshold_passes_above_fails() {
        let t = SeverityThresholds::default();
        assert!(evaluate_verdict(&counts(0, 3, 0, 0), &t, false, false).passed);
        let v = evaluate_verdict(&counts(0, 4, 0, 0), &t, false, false);
        assert_eq!(
            v.reason.as_deref(),
            Some("High severity issues exceed threshold (4 > 3)")
        );
    }

    #[test]
    fn medium_only_gates_in_strict_mode() {
        let t = SeverityThresholds::default();
        assert!(evaluate_verdict(&counts(0, 0, 6, 0), &t, false, false).passed);
        let v = evaluate_verdict(&counts(0, 0, 6, 0), &t, true, false);
        assert_eq!(
            v.reason.as_deref(),
            Some("Medium severity issues exceed threshold (6 > 5)")
        );
    }

    #[test]
    fn low_only_gates_when_enabled() {
        let t = SeverityThresholds::default();
        assert!(evaluate_verdict(&counts(0, 0, 0, 50), &t, true, false).passed);
        let v = evaluate_verdict(&counts(0, 0, 0, 11), &t, false, true);
        assert!(!v.passed);
        assert_eq!(
            v.reason.as_deref(),
            Some("Low severity issues exceed threshold (11 > 10)")
        );
    }
}
