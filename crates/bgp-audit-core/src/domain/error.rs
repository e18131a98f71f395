//! Error taxonomy for audit runs.
//!
//! Per-device errors (`SessionError`, `ConnectError`, `FetchError`) are
//! recovered by the worker into a `Failure` outcome. `ConfigError` and
//! `WriteError` abort the whole run and surface as `AuditError`.

use std::path::PathBuf;
use std::time::Duration;

/// Errors reported by a remote command-execution client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure while establishing a session with a device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("connect timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<SessionError> for ConnectError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Auth(msg) => ConnectError::Auth(msg),
            // A client-side timeout carries no duration; report it as transport detail.
            SessionError::Timeout(msg) => ConnectError::Transport(format!("timed out: {msg}")),
            SessionError::Transport(msg) => ConnectError::Transport(msg),
        }
    }
}

impl ConnectError {
    /// Whether another connect attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ConnectError::Auth(_))
    }
}

/// Failure while retrieving configuration over an open session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("fetch timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("device returned empty output")]
    EmptyOutput,

    #[error("malformed output: {0}")]
    Malformed(String),
}

impl From<SessionError> for FetchError {
    fn from(err: SessionError) -> Self {
        match err {
            // Auth errors after a successful connect are a transport-level fault.
            SessionError::Auth(msg) => FetchError::Transport(format!("authentication: {msg}")),
            SessionError::Timeout(msg) => FetchError::Transport(format!("timed out: {msg}")),
            SessionError::Transport(msg) => FetchError::Transport(msg),
        }
    }
}

/// Failure persisting an audit artifact (report or raw config snapshot).
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {detail}")]
    Serialize { what: String, detail: String },
}

impl WriteError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WriteError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Malformed inventory, rule definitions or run options.
///
/// Always raised before any device is contacted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("inventory record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("duplicate hostname '{hostname}' (records {first} and {second})")]
    DuplicateHostname {
        hostname: String,
        first: usize,
        second: usize,
    },

    #[error(
        "hostnames '{first}' and '{second}' share snapshot file '{file_name}' (records {first_index} and {second_index})"
    )]
    SnapshotNameClash {
        first: String,
        second: String,
        file_name: String,
        first_index: usize,
        second_index: usize,
    },

    #[error("rule '{id}': {reason}")]
    InvalidRule { id: String, reason: String },

    #[error("rule set defines no rules")]
    EmptyRuleSet,

    #[error("invalid option {option}: {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that abort an audit run.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("report write error: {0}")]
    Write(#[from] WriteError),
}

/// Result type for run-level operations.
pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_maps_to_connect_error() {
        let err: ConnectError = SessionError::Auth("bad password".to_string()).into();
        assert_eq!(err, ConnectError::Auth("bad password".to_string()));
        assert!(!err.is_retryable());

        let err: ConnectError = SessionError::Transport("no route to host".to_string()).into();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("no route to host"));
    }

    #[test]
    fn test_timeout_display_includes_duration() {
        let err = FetchError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "fetch timed out after 30s");

        let err = ConnectError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "connect timed out after 1.5s");
    }

    #[test]
    fn test_config_error_names_record() {
        let err = ConfigError::DuplicateHostname {
            hostname: "edge-1".to_string(),
            first: 0,
            second: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("edge-1"));
        assert!(msg.contains("records 0 and 3"));
    }

    #[test]
    fn test_audit_error_wraps_write_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: AuditError = WriteError::io("/tmp/report.txt", io).into();
        assert!(err.to_string().contains("report write error"));
        assert!(err.to_string().contains("/tmp/report.txt"));
    }
}
