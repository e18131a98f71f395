//! Machine-readable run summary (`--summary-json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::coordinator::{AuditRun, RunSummary};
use crate::domain::{AuditResult, WriteError};
use crate::rules::RuleSet;

pub const SUMMARY_SCHEMA_VERSION: &str = "1";

/// Rule set identity recorded alongside the results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSetArtifact {
    pub version: u32,
    pub digest: String,
    pub rules: usize,
}

/// Persisted summary of one audit run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummaryArtifact {
    pub schema_version: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub cancelled: bool,
    pub timed_out: bool,
    pub rule_set: RuleSetArtifact,
    pub summary: RunSummary,
    pub results: Vec<AuditResult>,
}

impl RunSummaryArtifact {
    pub fn new(run: &AuditRun, rules: &RuleSet) -> Self {
        Self {
            schema_version: SUMMARY_SCHEMA_VERSION.to_string(),
            run_id: run.run_id,
            started_at: run.started_at,
            duration_ms: run.duration.as_millis() as u64,
            cancelled: run.cancelled,
            timed_out: run.timed_out,
            rule_set: RuleSetArtifact {
                version: rules.version(),
                digest: rules.digest(),
                rules: rules.len(),
            },
            summary: run.summary(),
            results: run.results.clone(),
        }
    }
}

/// Write the summary as pretty JSON.
pub fn write_run_summary_json(path: &Path, artifact: &RunSummaryArtifact) -> Result<(), WriteError> {
    let content = serde_json::to_string_pretty(artifact).map_err(|e| WriteError::Serialize {
        what: "run summary".to_string(),
        detail: e.to_string(),
    })?;
    std::fs::write(path, content).map_err(|e| WriteError::io(path, e))?;
    Ok(())
}
