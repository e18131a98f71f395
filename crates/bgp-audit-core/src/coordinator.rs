//! Bounded-concurrency dispatch of device workers.
//!
//! At most `max_parallel` workers run at once; pending devices queue for a
//! slot as slots free up. Results are collected as they complete
//! and re-assembled into input order, so the output is always 1:1 with the
//! inventory regardless of completion order.
//!
//! Cancellation (external token or run timeout) gives in-flight workers a
//! grace period to reach a terminal stage and release their session. Workers
//! still running after that are abandoned and reported as cancelled at the
//! stage they were in.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::{AuditResult, Device, Diagnostic, Severity, Stage};
use crate::obs;
use crate::worker::{self, AuditContext, StageProbe, WorkerReport};

/// Overall verdict of a run, used for the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every device succeeded (or the inventory was empty).
    Succeeded,
    /// Some, but not all, devices failed.
    PartialFailure,
    /// Every device failed.
    Failed,
}

/// Counts over a run's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub findings: usize,
    pub status: RunStatus,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct AuditRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// One per input device, in input order.
    pub results: Vec<AuditResult>,
    /// Worker diagnostics, grouped by device in input order.
    pub diagnostics: Vec<Diagnostic>,
    /// Whether the run was cancelled (externally or by the run timeout).
    pub cancelled: bool,
    pub timed_out: bool,
}

impl AuditRun {
    pub fn summary(&self) -> RunSummary {
        let total = self.results.len();
        let succeeded = self.results.iter().filter(|r| r.is_success()).count();
        let cancelled = self.results.iter().filter(|r| r.is_cancelled()).count();
        let findings = self.results.iter().map(|r| r.findings().len()).sum();
        let failed = total - succeeded;

        let status = if failed == 0 {
            RunStatus::Succeeded
        } else if succeeded == 0 {
            RunStatus::Failed
        } else {
            RunStatus::PartialFailure
        };

        RunSummary {
            total,
            succeeded,
            failed,
            cancelled,
            findings,
            status,
        }
    }
}

/// Dispatches workers across an inventory.
pub struct Coordinator {
    ctx: Arc<AuditContext>,
}

impl Coordinator {
    pub fn new(ctx: AuditContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &AuditContext {
        &self.ctx
    }

    /// Audit every device and return exactly one result per device, in
    /// input order.
    ///
    /// `cancel` stops the run early; the caller's token is never cancelled
    /// by the coordinator itself (the run timeout uses a child token).
    pub async fn run_audit(&self, devices: Vec<Device>, cancel: &CancellationToken) -> AuditRun {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("audit.run", run_id = %run_id);
        self.run_inner(run_id, devices, cancel.child_token())
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        devices: Vec<Device>,
        cancel: CancellationToken,
    ) -> AuditRun {
        let started_at = Utc::now();
        let start = Instant::now();
        let options = &self.ctx.options;
        obs::emit_run_started(&run_id, devices.len(), options.max_parallel);

        let semaphore = Arc::new(Semaphore::new(options.max_parallel));
        let mut join_set = JoinSet::new();
        let mut probes = Vec::with_capacity(devices.len());

        for (idx, device) in devices.iter().cloned().enumerate() {
            let probe = StageProbe::new();
            probes.push(probe.clone());

            let ctx = Arc::clone(&self.ctx);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            join_set.spawn(async move {
                // The semaphore queues waiters FIFO, but tasks reach it in
                // scheduler order, so start order is only input order on a
                // single-threaded runtime.
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return (idx, not_dispatched(&device));
                };
                let report = worker::run(&device, &ctx, &probe, &cancel).await;
                (idx, report)
            });
        }

        let mut slots: Vec<Option<WorkerReport>> = vec![None; devices.len()];
        // A deadline past the clock's range is treated as no deadline.
        let run_deadline = options.run_timeout.and_then(|t| start.checked_add(t));
        let mut grace_started = false;
        let mut grace_deadline: Option<Instant> = None;
        let mut timed_out = false;
        let mut abandoned = false;

        while !join_set.is_empty() {
            tokio::select! {
                joined = join_set.join_next() => match joined {
                    Some(Ok((idx, report))) => slots[idx] = Some(report),
                    // Panicked task; its slot is filled from its probe below.
                    Some(Err(_join_err)) => {}
                    None => break,
                },
                _ = cancel.cancelled(), if !grace_started => {
                    grace_started = true;
                    grace_deadline = Instant::now().checked_add(options.grace_period);
                }
                _ = sleep_until_opt(run_deadline), if !cancel.is_cancelled() => {
                    timed_out = true;
                    obs::emit_run_timed_out(&run_id, options.run_timeout.unwrap_or_default());
                    cancel.cancel();
                }
                _ = sleep_until_opt(grace_deadline) => {
                    abandoned = true;
                    join_set.abort_all();
                    while let Some(joined) = join_set.join_next().await {
                        if let Ok((idx, report)) = joined {
                            slots[idx] = Some(report);
                        }
                    }
                }
            }
        }

        let mut results = Vec::with_capacity(devices.len());
        let mut diagnostics = Vec::new();
        for ((device, slot), probe) in devices.iter().zip(slots).zip(&probes) {
            let report = slot.unwrap_or_else(|| lost_worker(device, probe, abandoned));
            obs::emit_device_finished(&report.result, report.duration);
            diagnostics.extend(report.diagnostics);
            results.push(report.result);
        }

        let run = AuditRun {
            run_id,
            started_at,
            duration: start.elapsed(),
            results,
            diagnostics,
            cancelled: cancel.is_cancelled(),
            timed_out,
        };
        obs::emit_run_finished(&run.run_id, &run.summary(), run.duration);
        run
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Result for a device whose worker never acquired a slot.
fn not_dispatched(device: &Device) -> WorkerReport {
    WorkerReport {
        result: AuditResult::cancelled(&device.hostname, Stage::Connect),
        diagnostics: vec![Diagnostic::new(
            &device.hostname,
            Severity::Info,
            Some(Stage::Connect),
            "run cancelled before device was dispatched",
        )],
        duration: Duration::ZERO,
    }
}

/// Result for a worker that was abandoned or died without reporting.
fn lost_worker(device: &Device, probe: &StageProbe, abandoned: bool) -> WorkerReport {
    let stage = probe.current();
    let (result, message) = if abandoned {
        (
            AuditResult::cancelled(&device.hostname, stage),
            "worker abandoned after grace period",
        )
    } else {
        (
            AuditResult::failure(&device.hostname, stage, "worker terminated unexpectedly"),
            "worker terminated without a result",
        )
    };
    WorkerReport {
        result,
        diagnostics: vec![Diagnostic::new(
            &device.hostname,
            Severity::Warn,
            Some(stage),
            message,
        )],
        duration: Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Finding, Outcome};

    fn result(hostname: &str, outcome: Outcome) -> AuditResult {
        AuditResult {
            hostname: hostname.to_string(),
            outcome,
        }
    }

    fn run_with(results: Vec<AuditResult>) -> AuditRun {
        AuditRun {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            results,
            diagnostics: Vec::new(),
            cancelled: false,
            timed_out: false,
        }
    }

    #[test]
    fn test_summary_all_succeeded() {
        let finding = Finding {
            hostname: "a".to_string(),
            rule_id: "ttl-security".to_string(),
            recommendation: "enable ttl-security check".to_string(),
        };
        let run = run_with(vec![
            AuditResult::success("a", vec![finding]),
            AuditResult::success("b", vec![]),
        ]);
        let summary = run.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.findings, 1);
        assert_eq!(summary.status, RunStatus::Succeeded);
    }

    #[test]
    fn test_summary_partial_and_total_failure() {
        let partial = run_with(vec![
            AuditResult::success("a", vec![]),
            AuditResult::cancelled("b", Stage::Fetch),
        ]);
        let summary = partial.summary();
        assert_eq!(summary.status, RunStatus::PartialFailure);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.failed, 1);

        let failed = run_with(vec![result(
            "a",
            Outcome::Failure {
                stage: Stage::Connect,
                reason: "auth".to_string(),
            },
        )]);
        assert_eq!(failed.summary().status, RunStatus::Failed);
    }

    #[test]
    fn test_summary_empty_inventory_succeeds() {
        assert_eq!(run_with(vec![]).summary().status, RunStatus::Succeeded);
    }

    #[test]
    fn test_lost_worker_uses_probe_stage() {
        let device = Device::new(
            "edge-9",
            "203.0.113.9",
            crate::domain::Credentials::new("netops"),
            "cisco_ios",
        );
        let probe = StageProbe::new();
        probe.set(Stage::Fetch);

        let report = lost_worker(&device, &probe, true);
        assert_eq!(report.result, AuditResult::cancelled("edge-9", Stage::Fetch));

        let report = lost_worker(&device, &probe, false);
        assert!(!report.result.is_cancelled());
        assert_eq!(report.result.failed_stage(), Some(Stage::Fetch));
    }
}
