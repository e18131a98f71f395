//! Tracing initialisation for the `bgp-audit` binaries.
//!
//! Without `RUST_LOG`, only this workspace's crates log at the requested
//! level; everything else is held at `warn`. Only the first call installs a
//! subscriber; later calls are ignored.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const AUDIT_TARGETS: &[&str] = &["bgp_audit", "bgp_audit_core", "bgp_audit_ssh"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(AUDIT_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Install the global subscriber, writing to stderr so stdout stays free
/// for the run summary line.
///
/// * `json`: newline-delimited JSON with the enclosing run span attached.
/// * `level`: verbosity for audit targets when `RUST_LOG` is unset.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    if json {
        registry
            .with(layer.json().with_current_span(true))
            .try_init()
            .ok();
    } else {
        registry.with(layer).try_init().ok();
    }
}
