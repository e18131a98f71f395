//! Per-device audit outcomes and diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::finding::Finding;

/// The step of a device audit at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connect,
    Fetch,
    Evaluate,
    Write,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Connect => "connect",
            Stage::Fetch => "fetch",
            Stage::Evaluate => "evaluate",
            Stage::Write => "write",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one device audit. Never a mix of both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Findings in rule evaluation order; empty means no issues.
    Success { findings: Vec<Finding> },
    Failure { stage: Stage, reason: String },
}

/// Exactly one per inventory device per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    pub hostname: String,
    pub outcome: Outcome,
}

/// Reason recorded for devices whose audit was cut short by run cancellation.
pub const CANCELLED_REASON: &str = "cancelled";

impl AuditResult {
    pub fn success(hostname: impl Into<String>, findings: Vec<Finding>) -> Self {
        Self {
            hostname: hostname.into(),
            outcome: Outcome::Success { findings },
        }
    }

    pub fn failure(hostname: impl Into<String>, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            outcome: Outcome::Failure {
                stage,
                reason: reason.into(),
            },
        }
    }

    pub fn cancelled(hostname: impl Into<String>, stage: Stage) -> Self {
        Self::failure(hostname, stage, CANCELLED_REASON)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&self.outcome, Outcome::Failure { reason, .. } if reason == CANCELLED_REASON)
    }

    /// Findings of a successful audit; empty for failures.
    pub fn findings(&self) -> &[Finding] {
        match &self.outcome {
            Outcome::Success { findings } => findings,
            Outcome::Failure { .. } => &[],
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { stage, .. } => Some(*stage),
        }
    }
}

/// Severity of a diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warn,
}

/// Structured diagnostic produced by a worker.
///
/// Workers return these instead of logging; the caller emits them once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub hostname: String,
    pub severity: Severity,
    pub stage: Option<Stage>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        hostname: impl Into<String>,
        severity: Severity,
        stage: Option<Stage>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            severity,
            stage,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(rule_id: &str) -> Finding {
        Finding {
            hostname: "edge-1".to_string(),
            rule_id: rule_id.to_string(),
            recommendation: format!("fix {rule_id}"),
        }
    }

    #[test]
    fn test_success_exposes_findings() {
        let result = AuditResult::success("edge-1", vec![finding("a"), finding("b")]);
        assert!(result.is_success());
        assert_eq!(result.findings().len(), 2);
        assert_eq!(result.failed_stage(), None);
    }

    #[test]
    fn test_failure_has_no_findings() {
        let result = AuditResult::failure("edge-1", Stage::Fetch, "empty output");
        assert!(!result.is_success());
        assert!(result.findings().is_empty());
        assert_eq!(result.failed_stage(), Some(Stage::Fetch));
        assert!(!result.is_cancelled());
    }

    #[test]
    fn test_cancelled_is_a_failure() {
        let result = AuditResult::cancelled("edge-1", Stage::Connect);
        assert!(result.is_cancelled());
        assert_eq!(result.failed_stage(), Some(Stage::Connect));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let result = AuditResult::failure("edge-1", Stage::Connect, "auth");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"]["status"], "failure");
        assert_eq!(json["outcome"]["stage"], "connect");
    }
}
