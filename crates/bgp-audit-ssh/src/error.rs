use std::path::PathBuf;

use bgp_audit_core::SessionError;

/// Local failures around the ssh process, before any device answers.
#[derive(Debug, thiserror::Error)]
pub enum SshError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create control socket directory: {0}")]
    ControlDir(#[source] std::io::Error),

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<SshError> for SessionError {
    fn from(err: SshError) -> Self {
        SessionError::Transport(err.to_string())
    }
}
