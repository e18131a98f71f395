//! Device session worker: the full lifecycle of one device's audit.
//!
//! Connect, fetch, evaluate, then release the session on every exit path.
//! Each failure point maps to its own [`Stage`]; nothing a single device does
//! can abort its siblings. Workers never log directly: they return
//! [`Diagnostic`] records alongside the result.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::AuditOptions;
use crate::domain::{
    AuditResult, ConnectError, Device, Diagnostic, FetchError, RawConfig, Severity, Stage,
};
use crate::rules::{evaluate, RuleSet};
use crate::session::{RemoteClient, Session};
use crate::snapshot::SnapshotStore;

/// Output prefixes a network OS prints when it rejects a command.
const CLI_ERROR_MARKERS: &[&str] = &[
    "% Invalid input",
    "% Incomplete command",
    "% Ambiguous command",
    "% Unknown command",
];

/// Everything a worker needs besides its device. Shared read-only by all workers.
pub struct AuditContext {
    pub client: Arc<dyn RemoteClient>,
    pub rules: Arc<RuleSet>,
    pub options: AuditOptions,
    pub snapshots: Option<SnapshotStore>,
}

impl AuditContext {
    pub fn new(client: Arc<dyn RemoteClient>, rules: Arc<RuleSet>, options: AuditOptions) -> Self {
        Self {
            client,
            rules,
            options,
            snapshots: None,
        }
    }

    pub fn with_snapshots(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }
}

/// Stage a worker is currently in, readable by the coordinator.
///
/// Used to attribute a failure to the right stage when a worker has to be
/// abandoned after cancellation.
#[derive(Debug, Clone, Default)]
pub struct StageProbe(Arc<AtomicU8>);

impl StageProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, stage: Stage) {
        let raw = match stage {
            Stage::Connect => 0,
            Stage::Fetch => 1,
            Stage::Evaluate => 2,
            Stage::Write => 3,
        };
        self.0.store(raw, Ordering::Release);
    }

    pub fn current(&self) -> Stage {
        match self.0.load(Ordering::Acquire) {
            1 => Stage::Fetch,
            2 => Stage::Evaluate,
            3 => Stage::Write,
            _ => Stage::Connect,
        }
    }
}

/// What a worker hands back to the coordinator.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub result: AuditResult,
    pub diagnostics: Vec<Diagnostic>,
    pub duration: Duration,
}

/// Audit one device.
///
/// Always returns a terminal result. Cancellation is observed at every
/// suspension point; a cancelled worker still releases its session, bounded
/// by the grace period.
pub async fn run(
    device: &Device,
    ctx: &AuditContext,
    probe: &StageProbe,
    cancel: &CancellationToken,
) -> WorkerReport {
    let start = Instant::now();
    let mut worker = Worker {
        device,
        ctx,
        diagnostics: Vec::new(),
    };

    probe.set(Stage::Connect);
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        r = worker.connect() => Some(r),
    };

    let result = match connected {
        None => AuditResult::cancelled(&device.hostname, Stage::Connect),
        Some(Err(e)) => AuditResult::failure(&device.hostname, Stage::Connect, e.to_string()),
        Some(Ok(mut session)) => {
            worker.note(Severity::Debug, Some(Stage::Connect), "session established");

            let audited = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = worker.audit(session.as_mut(), probe) => Some(r),
            };
            let result = audited
                .unwrap_or_else(|| AuditResult::cancelled(&device.hostname, probe.current()));

            let release_limit = if cancel.is_cancelled() {
                ctx.options.grace_period.min(ctx.options.device_timeout)
            } else {
                ctx.options.device_timeout
            };
            worker.release(session.as_mut(), release_limit).await;
            result
        }
    };

    WorkerReport {
        result,
        diagnostics: worker.diagnostics,
        duration: start.elapsed(),
    }
}

struct Worker<'a> {
    device: &'a Device,
    ctx: &'a AuditContext,
    diagnostics: Vec<Diagnostic>,
}

impl Worker<'_> {
    fn note(&mut self, severity: Severity, stage: Option<Stage>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(
            &self.device.hostname,
            severity,
            stage,
            message,
        ));
    }

    /// Open a session, retrying timeouts and transport errors with
    /// exponential backoff. Authentication failures are final.
    async fn connect(&mut self) -> Result<Box<dyn Session>, ConnectError> {
        let ctx = self.ctx;
        let options = &ctx.options;
        let max_attempts = options.connect_retries + 1;

        let mut attempt = 1;
        loop {
            let err = match tokio::time::timeout(
                options.device_timeout,
                ctx.client.connect(self.device),
            )
            .await
            {
                Ok(Ok(session)) => return Ok(session),
                Ok(Err(e)) => ConnectError::from(e),
                Err(_elapsed) => ConnectError::Timeout(options.device_timeout),
            };

            if !err.is_retryable() || attempt >= max_attempts {
                return Err(err);
            }

            let delay = options
                .retry_backoff
                .saturating_mul(2u32.saturating_pow(attempt - 1));
            self.note(
                Severity::Warn,
                Some(Stage::Connect),
                format!(
                    "connect attempt {attempt}/{max_attempts} failed: {err}; retrying in {}ms",
                    delay.as_millis()
                ),
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Fetch, evaluate and optionally snapshot, over an open session.
    async fn audit(&mut self, session: &mut dyn Session, probe: &StageProbe) -> AuditResult {
        let ctx = self.ctx;
        let device = self.device;
        let hostname = &device.hostname;

        probe.set(Stage::Fetch);
        let config = match self.fetch(session).await {
            Ok(config) => config,
            Err(e) => return AuditResult::failure(hostname, Stage::Fetch, e.to_string()),
        };
        self.note(
            Severity::Debug,
            Some(Stage::Fetch),
            format!("fetched {} bytes", config.text.len()),
        );

        probe.set(Stage::Evaluate);
        let findings = evaluate(&config, &ctx.rules);

        if let Some(store) = &ctx.snapshots {
            probe.set(Stage::Write);
            match store.persist(&config).await {
                Ok(path) => self.note(
                    Severity::Debug,
                    Some(Stage::Write),
                    format!("snapshot written to {}", path.display()),
                ),
                Err(e) => return AuditResult::failure(hostname, Stage::Write, e.to_string()),
            }
        }

        AuditResult::success(hostname, findings)
    }

    async fn fetch(&self, session: &mut dyn Session) -> Result<RawConfig, FetchError> {
        let limit = self.ctx.options.device_timeout;
        let output = tokio::time::timeout(limit, session.execute(&self.ctx.options.fetch_command))
            .await
            .map_err(|_elapsed| FetchError::Timeout(limit))??;

        check_output(&output)?;
        Ok(RawConfig::new(&self.device.hostname, output))
    }

    /// Close the session. Errors are recorded, never propagated.
    async fn release(&mut self, session: &mut dyn Session, limit: Duration) {
        match tokio::time::timeout(limit, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.note(Severity::Warn, None, format!("session release failed: {e}")),
            Err(_elapsed) => self.note(
                Severity::Warn,
                None,
                format!("session release timed out after {}ms", limit.as_millis()),
            ),
        }
    }
}

/// Reject output that cannot be a configuration.
fn check_output(output: &str) -> Result<(), FetchError> {
    if output.trim().is_empty() {
        return Err(FetchError::EmptyOutput);
    }
    let rejected = output
        .lines()
        .find(|line| CLI_ERROR_MARKERS.iter().any(|m| line.contains(m)));
    if let Some(line) = rejected {
        return Err(FetchError::Malformed(format!(
            "device rejected command: {}",
            line.trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Credentials, Outcome, SessionError};
    use crate::fakes::{DeviceScript, ScriptedClient};

    fn device(hostname: &str) -> Device {
        Device::new(hostname, "192.0.2.1", Credentials::new("netops"), "cisco_ios")
    }

    fn context(client: Arc<ScriptedClient>, options: AuditOptions) -> AuditContext {
        AuditContext::new(client, Arc::new(RuleSet::builtin()), options)
    }

    async fn run_one(ctx: &AuditContext, hostname: &str) -> WorkerReport {
        run(
            &device(hostname),
            ctx,
            &StageProbe::new(),
            &CancellationToken::new(),
        )
        .await
    }

    #[test]
    fn test_check_output_rejects_empty_and_cli_errors() {
        assert_eq!(check_output("  \n\t"), Err(FetchError::EmptyOutput));

        let rejected = "show running-config router bgp\n% Invalid input detected at '^' marker.\n";
        let err = check_output(rejected).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(ref m) if m.contains("% Invalid input")));

        assert!(check_output("router bgp 65000\n").is_ok());
    }

    #[test]
    fn test_stage_probe_roundtrip() {
        let probe = StageProbe::new();
        assert_eq!(probe.current(), Stage::Connect);
        for stage in [Stage::Fetch, Stage::Evaluate, Stage::Write, Stage::Connect] {
            probe.set(stage);
            assert_eq!(probe.current(), stage);
        }
    }

    #[tokio::test]
    async fn test_success_closes_session() {
        let client = Arc::new(
            ScriptedClient::new().with_device("edge-1", DeviceScript::config("router bgp 65000\n")),
        );
        let ctx = context(client.clone(), AuditOptions::default());

        let report = run_one(&ctx, "edge-1").await;

        assert!(report.result.is_success());
        assert_eq!(report.result.findings().len(), 10);
        assert_eq!(client.closed_count(), 1);
        assert_eq!(client.commands_for("edge-1"), vec!["show running-config router bgp"]);
    }

    #[tokio::test]
    async fn test_auth_failure_is_connect_failure_without_retry() {
        let client = Arc::new(ScriptedClient::new().with_device(
            "edge-1",
            DeviceScript::connect_error(SessionError::Auth("bad password".to_string())),
        ));
        let options = AuditOptions {
            connect_retries: 3,
            ..AuditOptions::default()
        };
        let ctx = context(client.clone(), options);

        let report = run_one(&ctx, "edge-1").await;

        assert_eq!(report.result.failed_stage(), Some(Stage::Connect));
        assert_eq!(client.connect_attempts("edge-1"), 1);
        assert_eq!(client.closed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_retries_with_backoff() {
        let client = Arc::new(ScriptedClient::new().with_device(
            "edge-1",
            DeviceScript::config("router bgp 1\n").with_connect_latency(Duration::from_secs(60)),
        ));
        let options = AuditOptions {
            device_timeout: Duration::from_secs(1),
            connect_retries: 2,
            retry_backoff: Duration::from_millis(100),
            ..AuditOptions::default()
        };
        let ctx = context(client.clone(), options);

        let report = run_one(&ctx, "edge-1").await;

        match &report.result.outcome {
            Outcome::Failure { stage, reason } => {
                assert_eq!(*stage, Stage::Connect);
                assert!(reason.contains("timed out"), "reason: {reason}");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(client.connect_attempts("edge-1"), 3);
        // 3 timeouts of 1s plus backoff of 100ms and 200ms.
        assert!(report.duration >= Duration::from_millis(3300));
        assert!(report.duration < Duration::from_millis(3400));
        let retries = report
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warn)
            .count();
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn test_fetch_error_still_releases_session() {
        let client = Arc::new(ScriptedClient::new().with_device(
            "edge-1",
            DeviceScript::fetch_error(SessionError::Transport("channel closed".to_string())),
        ));
        let ctx = context(client.clone(), AuditOptions::default());

        let report = run_one(&ctx, "edge-1").await;

        match &report.result.outcome {
            Outcome::Failure { stage, reason } => {
                assert_eq!(*stage, Stage::Fetch);
                assert!(reason.contains("channel closed"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(client.closed_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_fails_fetch_and_releases_session() {
        let client = Arc::new(ScriptedClient::new().with_device(
            "edge-1",
            DeviceScript::config("router bgp 1\n").with_fetch_latency(Duration::from_secs(60)),
        ));
        let options = AuditOptions {
            device_timeout: Duration::from_secs(1),
            ..AuditOptions::default()
        };
        let ctx = context(client.clone(), options);

        let report = run_one(&ctx, "edge-1").await;

        assert_eq!(
            report.result,
            AuditResult::failure("edge-1", Stage::Fetch, "fetch timed out after 1s")
        );
        assert_eq!(client.closed_count(), 1);
        assert!(report.duration < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_empty_output_is_fetch_failure() {
        let client =
            Arc::new(ScriptedClient::new().with_device("edge-1", DeviceScript::config("\n")));
        let ctx = context(client, AuditOptions::default());

        let report = run_one(&ctx, "edge-1").await;
        assert_eq!(
            report.result,
            AuditResult::failure("edge-1", Stage::Fetch, "device returned empty output")
        );
    }

    #[tokio::test]
    async fn test_release_failure_does_not_change_outcome() {
        let client = Arc::new(ScriptedClient::new().with_device(
            "edge-1",
            DeviceScript::config("router bgp 1\n")
                .with_close_error(SessionError::Transport("reset".to_string())),
        ));
        let ctx = context(client, AuditOptions::default());

        let report = run_one(&ctx, "edge-1").await;

        assert!(report.result.is_success());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warn && d.message.contains("release failed")));
    }

    #[tokio::test]
    async fn test_snapshot_written_and_failure_mapped_to_write_stage() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(
            ScriptedClient::new().with_device("edge-1", DeviceScript::config("router bgp 1\n")),
        );

        let ctx = context(client.clone(), AuditOptions::default())
            .with_snapshots(SnapshotStore::new(dir.path()));
        let report = run_one(&ctx, "edge-1").await;
        assert!(report.result.is_success());
        let written = std::fs::read_to_string(dir.path().join("edge-1_bgp.txt")).unwrap();
        assert_eq!(written, "router bgp 1\n");

        // A regular file where the snapshot directory should be.
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let ctx =
            context(client, AuditOptions::default()).with_snapshots(SnapshotStore::new(&blocker));
        let report = run_one(&ctx, "edge-1").await;
        assert_eq!(report.result.failed_stage(), Some(Stage::Write));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_fetch_reports_fetch_stage() {
        let client = Arc::new(ScriptedClient::new().with_device(
            "edge-1",
            DeviceScript::config("router bgp 1\n").with_fetch_latency(Duration::from_secs(600)),
        ));
        let ctx = context(client.clone(), AuditOptions::default());
        let cancel = CancellationToken::new();
        let probe = StageProbe::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = run(&device("edge-1"), &ctx, &probe, &cancel).await;

        assert_eq!(report.result, AuditResult::cancelled("edge-1", Stage::Fetch));
        assert_eq!(client.closed_count(), 1);
    }
}
