//! bgp-audit - BGP configuration auditor
//!
//! Connects to every router in an inventory, fetches its BGP configuration
//! and appends best-practice recommendations to a report.
//!
//! ## Commands
//!
//! - `audit`: run an audit and append to the report
//! - `rules`: list the active rule set and its digest
//! - `validate`: check inventory and rules without contacting any device
//!
//! ## Exit status
//!
//! `0` every device succeeded, `2` some devices failed, `3` every device
//! failed, `1` the run could not start or the report could not be written.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use bgp_audit_core::{
    inventory, obs, write_run_summary_json, AuditConfig, AuditContext, Coordinator, RemoteClient,
    ReportSink, RuleSet, RunStatus, RunSummaryArtifact, SnapshotStore,
};
use bgp_audit_ssh::{HostKeyPolicy, SshClient, SshOptions};

const EXIT_FATAL: u8 = 1;
const EXIT_PARTIAL_FAILURE: u8 = 2;
const EXIT_ALL_FAILED: u8 = 3;

#[derive(Parser)]
#[command(name = "bgp-audit")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Audit router BGP configurations against best practices", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit every device in the inventory and append to the report
    Audit(AuditArgs),

    /// List the active rules and the rule set digest
    Rules {
        /// Rule file (default: built-in rules)
        #[arg(long, env = "BGP_AUDIT_RULES")]
        rules: Option<PathBuf>,
    },

    /// Load and validate inventory and rules without contacting any device
    Validate {
        /// Config file (TOML)
        #[arg(short, long, env = "BGP_AUDIT_CONFIG")]
        config: Option<PathBuf>,

        /// Inventory file (.toml or .json)
        #[arg(short, long, env = "BGP_AUDIT_INVENTORY")]
        inventory: Option<PathBuf>,

        /// Rule file (default: built-in rules)
        #[arg(long, env = "BGP_AUDIT_RULES")]
        rules: Option<PathBuf>,
    },
}

/// Flags for `audit`. Each one overrides the config file.
#[derive(Args, Debug, Default)]
struct AuditArgs {
    /// Config file (TOML)
    #[arg(short, long, env = "BGP_AUDIT_CONFIG")]
    config: Option<PathBuf>,

    /// Inventory file (.toml or .json)
    #[arg(short, long, env = "BGP_AUDIT_INVENTORY")]
    inventory: Option<PathBuf>,

    /// Rule file (default: built-in rules)
    #[arg(long, env = "BGP_AUDIT_RULES")]
    rules: Option<PathBuf>,

    /// Report file, opened in append mode
    #[arg(short, long, env = "BGP_AUDIT_REPORT")]
    report: Option<PathBuf>,

    /// Directory for raw `<hostname>_bgp.txt` snapshots
    #[arg(long, env = "BGP_AUDIT_SNAPSHOT_DIR")]
    snapshot_dir: Option<PathBuf>,

    /// Maximum devices audited at once
    #[arg(short = 'p', long, env = "BGP_AUDIT_MAX_PARALLEL")]
    max_parallel: Option<usize>,

    /// Seconds allowed for each connect and fetch call
    #[arg(long, env = "BGP_AUDIT_DEVICE_TIMEOUT")]
    device_timeout: Option<u64>,

    /// Seconds allowed for the whole run
    #[arg(long, env = "BGP_AUDIT_RUN_TIMEOUT")]
    run_timeout: Option<u64>,

    /// Seconds in-flight devices get to finish after cancellation
    #[arg(long, env = "BGP_AUDIT_GRACE_PERIOD")]
    grace_period: Option<u64>,

    /// Extra connect attempts after a timeout or transport error
    #[arg(long, env = "BGP_AUDIT_CONNECT_RETRIES")]
    connect_retries: Option<u32>,

    /// Write a JSON run summary to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// OpenSSH client binary
    #[arg(long, env = "BGP_AUDIT_SSH", default_value = "ssh")]
    ssh_program: PathBuf,

    /// Host key verification for devices
    #[arg(long, value_enum, default_value_t = HostKeys::AcceptNew)]
    host_keys: HostKeys,

    /// known_hosts file used instead of the user's default
    #[arg(long, env = "BGP_AUDIT_KNOWN_HOSTS")]
    known_hosts: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum HostKeys {
    Strict,
    #[default]
    AcceptNew,
    Off,
}

impl From<HostKeys> for HostKeyPolicy {
    fn from(value: HostKeys) -> Self {
        match value {
            HostKeys::Strict => HostKeyPolicy::Strict,
            HostKeys::AcceptNew => HostKeyPolicy::AcceptNew,
            HostKeys::Off => HostKeyPolicy::Off,
        }
    }
}

impl AuditArgs {
    /// Config file contents (or defaults) with flags applied on top.
    fn resolve_config(&self) -> Result<AuditConfig> {
        let mut cfg = load_config(self.config.as_deref())?;

        if let Some(inventory) = &self.inventory {
            cfg.inventory = Some(inventory.clone());
        }
        if let Some(rules) = &self.rules {
            cfg.rules = Some(rules.clone());
        }
        if let Some(report) = &self.report {
            cfg.report = report.clone();
        }
        if let Some(dir) = &self.snapshot_dir {
            cfg.snapshot_dir = Some(dir.clone());
        }
        if let Some(n) = self.max_parallel {
            cfg.max_parallel = n;
        }
        if let Some(secs) = self.device_timeout {
            cfg.device_timeout_secs = secs;
        }
        if let Some(secs) = self.run_timeout {
            cfg.run_timeout_secs = Some(secs);
        }
        if let Some(secs) = self.grace_period {
            cfg.grace_period_secs = secs;
        }
        if let Some(n) = self.connect_retries {
            cfg.connect_retries = n;
        }
        Ok(cfg)
    }

    fn ssh_options(&self, cfg: &AuditConfig) -> SshOptions {
        SshOptions {
            program: self.ssh_program.clone(),
            connect_timeout: Duration::from_secs(cfg.device_timeout_secs),
            host_key_policy: self.host_keys.into(),
            known_hosts_file: self.known_hosts.clone(),
            ..SshOptions::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    bgp_audit_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Audit(args) => cmd_audit(args).await,
        Commands::Rules { rules } => cmd_rules(rules.as_deref()).map(|_| ExitCode::SUCCESS),
        Commands::Validate {
            config,
            inventory,
            rules,
        } => cmd_validate(config.as_deref(), inventory, rules).map(|_| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AuditConfig> {
    match path {
        Some(path) => AuditConfig::load(path).context("failed to load config"),
        None => Ok(AuditConfig::default()),
    }
}

fn load_rules(path: Option<&Path>) -> Result<RuleSet> {
    match path {
        Some(path) => RuleSet::load(path).context("failed to load rules"),
        None => Ok(RuleSet::builtin()),
    }
}

fn exit_code(status: RunStatus) -> u8 {
    match status {
        RunStatus::Succeeded => 0,
        RunStatus::PartialFailure => EXIT_PARTIAL_FAILURE,
        RunStatus::Failed => EXIT_ALL_FAILED,
    }
}

async fn cmd_audit(args: AuditArgs) -> Result<ExitCode> {
    let cfg = args.resolve_config()?;
    let client = Arc::new(SshClient::new(args.ssh_options(&cfg)));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let status = execute_audit(&cfg, client, args.summary_json.as_deref(), &cancel).await?;
    Ok(ExitCode::from(exit_code(status)))
}

/// Run one audit end to end: validate, dispatch, report.
///
/// Configuration and report errors are returned before any device is
/// contacted; a report write failure after the run is returned as an error.
async fn execute_audit(
    cfg: &AuditConfig,
    client: Arc<dyn RemoteClient>,
    summary_json: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<RunStatus> {
    let options = cfg.validate().context("invalid configuration")?;
    let inventory_path = cfg
        .inventory
        .as_deref()
        .context("no inventory given (use --inventory or set `inventory` in the config file)")?;
    let devices = inventory::load(inventory_path).context("failed to load inventory")?;
    let rules = Arc::new(load_rules(cfg.rules.as_deref())?);

    let sink = ReportSink::open(&cfg.report)
        .await
        .context("failed to open report")?;

    info!(
        devices = devices.len(),
        rules = rules.len(),
        rule_set_digest = %rules.digest(),
        report = %cfg.report.display(),
        "starting audit"
    );

    let mut ctx = AuditContext::new(client, Arc::clone(&rules), options);
    if let Some(dir) = &cfg.snapshot_dir {
        ctx = ctx.with_snapshots(SnapshotStore::new(dir));
    }
    let coordinator = Coordinator::new(ctx);
    let run = coordinator.run_audit(devices, cancel).await;

    obs::emit_diagnostics(&run.diagnostics);
    obs::emit_failures(&run.results);

    sink.record(&run.results)
        .await
        .context("failed to write report")?;

    if let Some(path) = summary_json {
        write_run_summary_json(path, &RunSummaryArtifact::new(&run, &rules))
            .context("failed to write run summary")?;
    }

    let summary = run.summary();
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "audit complete"
    );
    println!(
        "Audited {} device(s): {} succeeded, {} failed ({} cancelled). Report: {}",
        summary.total,
        summary.succeeded,
        summary.failed,
        summary.cancelled,
        sink.path().display()
    );

    Ok(summary.status)
}

fn cmd_rules(path: Option<&Path>) -> Result<()> {
    let rules = load_rules(path)?;

    println!("Rule set version {} ({} rules)", rules.version(), rules.len());
    println!("Digest: {}", rules.digest());
    println!();
    for rule in rules.rules() {
        let marker = &rule.definition().marker;
        println!(
            "{:<24} {:<8} {:<28} {}",
            rule.id(),
            marker.kind(),
            marker.pattern(),
            rule.recommendation()
        );
    }

    Ok(())
}

fn cmd_validate(
    config: Option<&Path>,
    inventory: Option<PathBuf>,
    rules: Option<PathBuf>,
) -> Result<()> {
    let mut cfg = load_config(config)?;
    if inventory.is_some() {
        cfg.inventory = inventory;
    }
    if rules.is_some() {
        cfg.rules = rules;
    }

    cfg.validate().context("invalid configuration")?;
    let rule_set = load_rules(cfg.rules.as_deref())?;
    println!(
        "Rules: {} (version {}, digest {})",
        rule_set.len(),
        rule_set.version(),
        rule_set.digest()
    );

    match cfg.inventory.as_deref() {
        Some(path) => {
            let devices = inventory::load(path).context("failed to load inventory")?;
            println!("Inventory: {} device(s) in {}", devices.len(), path.display());
        }
        None => println!("Inventory: not configured"),
    }

    Ok(())
}
