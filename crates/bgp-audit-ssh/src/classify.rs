//! Mapping ssh and sshpass exit status to [`SessionError`].

use bgp_audit_core::SessionError;

/// ssh reserves this exit status for its own errors.
pub(crate) const SSH_ERROR_STATUS: i32 = 255;

// sshpass exit codes.
const SSHPASS_WRONG_PASSWORD: i32 = 5;
const SSHPASS_HOST_KEY_UNKNOWN: i32 = 6;
const SSHPASS_HOST_KEY_CHANGED: i32 = 7;

const AUTH_MARKERS: &[&str] = &[
    "Permission denied",
    "Authentication failed",
    "Too many authentication failures",
    "no more authentication methods",
];

const TIMEOUT_MARKERS: &[&str] = &["timed out", "Connection timeout"];

/// Classify a failed ssh invocation.
///
/// `code` is the process exit status (`None` when killed by a signal) and
/// `stderr` its captured error output.
pub fn classify_failure(code: Option<i32>, stderr: &str, via_sshpass: bool) -> SessionError {
    let detail = last_line(stderr)
        .map(str::to_string)
        .unwrap_or_else(|| match code {
            Some(code) => format!("ssh exited with status {code}"),
            None => "ssh terminated by signal".to_string(),
        });

    if via_sshpass {
        match code {
            Some(SSHPASS_WRONG_PASSWORD) => return SessionError::Auth(detail),
            Some(SSHPASS_HOST_KEY_UNKNOWN) => {
                return SessionError::Transport(format!("host key unknown: {detail}"))
            }
            Some(SSHPASS_HOST_KEY_CHANGED) => {
                return SessionError::Transport(format!("host key changed: {detail}"))
            }
            _ => {}
        }
    }

    if AUTH_MARKERS.iter().any(|m| stderr.contains(m)) {
        SessionError::Auth(detail)
    } else if TIMEOUT_MARKERS.iter().any(|m| stderr.contains(m)) {
        SessionError::Timeout(detail)
    } else {
        SessionError::Transport(detail)
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}
