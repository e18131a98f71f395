//! Structured observability hooks for audit run lifecycle events.
//!
//! Events use a stable `event` field so log pipelines can filter on it:
//! `audit.run_started`, `audit.device_finished`, `audit.run_timed_out`,
//! `audit.run_finished`, `audit.diagnostic`.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::coordinator::RunSummary;
use crate::domain::{AuditResult, Diagnostic, Outcome, Severity};

/// Emit event: run started.
pub fn emit_run_started(run_id: &Uuid, devices: usize, max_parallel: usize) {
    info!(
        event = "audit.run_started",
        run_id = %run_id,
        devices = devices,
        max_parallel = max_parallel,
    );
}

/// Emit event: one device reached its terminal outcome.
pub fn emit_device_finished(result: &AuditResult, duration: Duration) {
    match &result.outcome {
        Outcome::Success { findings } => debug!(
            event = "audit.device_finished",
            hostname = %result.hostname,
            status = "success",
            findings = findings.len(),
            duration_ms = duration.as_millis() as u64,
        ),
        Outcome::Failure { stage, reason } => debug!(
            event = "audit.device_finished",
            hostname = %result.hostname,
            status = "failure",
            stage = %stage,
            reason = %reason,
            duration_ms = duration.as_millis() as u64,
        ),
    }
}

/// Emit event: the run-level timeout fired and cancellation began.
pub fn emit_run_timed_out(run_id: &Uuid, limit: Duration) {
    warn!(
        event = "audit.run_timed_out",
        run_id = %run_id,
        limit_secs = limit.as_secs(),
    );
}

/// Emit event: run finished with per-outcome counts.
pub fn emit_run_finished(run_id: &Uuid, summary: &RunSummary, duration: Duration) {
    info!(
        event = "audit.run_finished",
        run_id = %run_id,
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        cancelled = summary.cancelled,
        findings = summary.findings,
        duration_ms = duration.as_millis() as u64,
    );
}

/// Emit worker diagnostics, once per run, at their own severity.
pub fn emit_diagnostics(diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        let stage = d.stage.map(|s| s.as_str()).unwrap_or("release");
        match d.severity {
            Severity::Debug => {
                debug!(event = "audit.diagnostic", hostname = %d.hostname, stage, "{}", d.message)
            }
            Severity::Info => {
                info!(event = "audit.diagnostic", hostname = %d.hostname, stage, "{}", d.message)
            }
            Severity::Warn => {
                warn!(event = "audit.diagnostic", hostname = %d.hostname, stage, "{}", d.message)
            }
        }
    }
}

/// Log one warning per failed device.
pub fn emit_failures(results: &[AuditResult]) {
    for result in results {
        if let Outcome::Failure { stage, reason } = &result.outcome {
            warn!(
                event = "audit.device_failed",
                hostname = %result.hostname,
                stage = %stage,
                reason = %reason,
            );
        }
    }
}
