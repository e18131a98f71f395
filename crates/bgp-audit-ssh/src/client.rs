use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use bgp_audit_core::{Device, RemoteClient, Session, SessionError};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::args::{HostKeyPolicy, SshTarget};
use crate::classify::{classify_failure, SSH_ERROR_STATUS};
use crate::error::SshError;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MASTER_EXIT_WAIT: Duration = Duration::from_secs(5);

/// Settings shared by every session the client opens.
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// The OpenSSH client binary.
    pub program: PathBuf,
    /// Used only for devices with a password.
    pub sshpass_program: PathBuf,
    /// Passed to ssh as `ConnectTimeout`. The worker's device timeout still
    /// bounds the whole connect.
    pub connect_timeout: Duration,
    pub host_key_policy: HostKeyPolicy,
    pub known_hosts_file: Option<PathBuf>,
    /// Appended to the master's arguments before the host.
    pub extra_args: Vec<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ssh"),
            sshpass_program: PathBuf::from("sshpass"),
            connect_timeout: Duration::from_secs(10),
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_file: None,
            extra_args: Vec::new(),
        }
    }
}

/// Opens one OpenSSH ControlMaster per device session.
#[derive(Debug, Clone, Default)]
pub struct SshClient {
    options: SshOptions,
}

impl SshClient {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SshOptions {
        &self.options
    }

    fn spawn_master(
        &self,
        target: &SshTarget,
        control_path: &Path,
        password: Option<&str>,
    ) -> Result<Child, SshError> {
        let args = target.master_args(control_path, &self.options);
        let (program, mut cmd) = match password {
            Some(password) => {
                let mut cmd = Command::new(&self.options.sshpass_program);
                cmd.arg("-e")
                    .arg(&self.options.program)
                    .env("SSHPASS", password);
                (&self.options.sshpass_program, cmd)
            }
            None => (&self.options.program, Command::new(&self.options.program)),
        };

        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SshError::Spawn {
                program: program.clone(),
                source,
            })
    }

    /// Poll the control socket until the master accepts requests or exits.
    async fn wait_ready(
        &self,
        target: &SshTarget,
        control_path: &Path,
        master: &mut Child,
        via_sshpass: bool,
    ) -> Result<(), SessionError> {
        let check = target.check_args(control_path);
        loop {
            let exited = master.try_wait().map_err(|source| SshError::Wait {
                program: self.options.program.clone(),
                source,
            })?;
            if let Some(status) = exited {
                let stderr = read_stderr(master).await;
                if status.success() {
                    return Err(SessionError::Transport(
                        "ssh master exited before accepting sessions".to_string(),
                    ));
                }
                return Err(classify_failure(status.code(), &stderr, via_sshpass));
            }

            let output = run_ssh(&self.options.program, &check).await?;
            if output.status.success() {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl RemoteClient for SshClient {
    async fn connect(&self, device: &Device) -> Result<Box<dyn Session>, SessionError> {
        let target = SshTarget::from_device(device);
        let control_dir = tempfile::Builder::new()
            .prefix("bgp-audit-")
            .tempdir()
            .map_err(SshError::ControlDir)?;
        let control_path = control_dir.path().join("ctl");

        let password = device.credentials.password.as_deref();
        let mut master = self.spawn_master(&target, &control_path, password)?;
        self.wait_ready(&target, &control_path, &mut master, password.is_some())
            .await?;

        debug!(
            hostname = %device.hostname,
            address = %target.host,
            port = target.port,
            "ssh master ready"
        );
        Ok(Box::new(SshSession {
            hostname: device.hostname.clone(),
            program: self.options.program.clone(),
            target,
            control_path,
            master,
            _control_dir: control_dir,
        }))
    }
}

struct SshSession {
    hostname: String,
    program: PathBuf,
    target: SshTarget,
    control_path: PathBuf,
    master: Child,
    // Removed on drop, after the master is gone.
    _control_dir: TempDir,
}

#[async_trait]
impl Session for SshSession {
    async fn execute(&mut self, command: &str) -> Result<String, SessionError> {
        let args = self.target.exec_args(&self.control_path, command);
        let output = run_ssh(&self.program, &args).await?;

        // Any other status belongs to the remote command, not to ssh.
        let code = output.status.code();
        if code.is_none() || code == Some(SSH_ERROR_STATUS) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(code, &stderr, false));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let exit = run_ssh(&self.program, &self.target.exit_args(&self.control_path)).await;

        if matches!(&exit, Ok(output) if output.status.success()) {
            if let Ok(Ok(_)) = tokio::time::timeout(MASTER_EXIT_WAIT, self.master.wait()).await {
                debug!(hostname = %self.hostname, "ssh master closed");
                return Ok(());
            }
        }

        // The master ignored or never received the exit request.
        self.master.start_kill().ok();
        self.master.wait().await.ok();

        match exit {
            Ok(output) if output.status.success() => Err(SessionError::Transport(
                "ssh master did not exit after request".to_string(),
            )),
            Ok(output) => Err(classify_failure(
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
                false,
            )),
            Err(e) => Err(e.into()),
        }
    }
}

async fn run_ssh(program: &Path, args: &[String]) -> Result<Output, SshError> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| SshError::Spawn {
            program: program.to_path_buf(),
            source,
        })
}

async fn read_stderr(child: &mut Child) -> String {
    let mut buf = Vec::new();
    if let Some(mut stderr) = child.stderr.take() {
        stderr.read_to_end(&mut buf).await.ok();
    }
    String::from_utf8_lossy(&buf).into_owned()
}
