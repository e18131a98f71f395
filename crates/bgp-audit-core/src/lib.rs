//! BGP configuration auditing.
//!
//! Fetches the BGP configuration of every router in an inventory with a
//! bounded number of concurrent sessions, checks it against an ordered set
//! of best-practice rules and appends per-device recommendations to a report.
//!
//! The pieces, bottom-up:
//!
//! - [`rules`]: pure rule engine over configuration text
//! - [`session`]: the remote command-execution client seam
//! - [`worker`]: one device, connect → fetch → evaluate → release
//! - [`coordinator`]: bounded fan-out with input-ordered results
//! - [`sink`]: single-writer recommendation report

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod fakes;
pub mod inventory;
pub mod obs;
pub mod reporting;
pub mod rules;
pub mod session;
pub mod sink;
pub mod snapshot;
pub mod telemetry;
pub mod worker;

pub use config::{AuditConfig, AuditOptions};
pub use coordinator::{AuditRun, Coordinator, RunStatus, RunSummary};
pub use domain::{
    AuditError, AuditResult, ConfigError, ConnectError, Credentials, Device, Diagnostic,
    FetchError, Finding, Outcome, RawConfig, SessionError, Severity, Stage, WriteError,
};
pub use reporting::{write_run_summary_json, RunSummaryArtifact};
pub use rules::{evaluate, RuleSet};
pub use session::{RemoteClient, Session};
pub use sink::ReportSink;
pub use snapshot::SnapshotStore;
pub use telemetry::init_tracing;
pub use worker::AuditContext;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
