//! Command lines for the ssh invocations of one session.

use std::path::{Path, PathBuf};

use bgp_audit_core::Device;

use crate::client::SshOptions;

/// Host key verification for new masters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Only hosts already in known_hosts.
    Strict,
    /// Record unknown hosts, reject changed keys.
    #[default]
    AcceptNew,
    /// No verification. Lab use only.
    Off,
}

impl HostKeyPolicy {
    fn as_ssh_value(&self) -> &'static str {
        match self {
            HostKeyPolicy::Strict => "yes",
            HostKeyPolicy::AcceptNew => "accept-new",
            HostKeyPolicy::Off => "no",
        }
    }
}

/// Where and as whom to log in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub key_path: Option<PathBuf>,
    pub uses_password: bool,
}

impl SshTarget {
    pub fn from_device(device: &Device) -> Self {
        Self {
            host: device.address.clone(),
            port: device.port.unwrap_or(22),
            username: device.credentials.username.clone(),
            key_path: device.credentials.key_path.clone(),
            uses_password: device.credentials.password.is_some(),
        }
    }

    fn common(&self, control_path: &Path) -> Vec<String> {
        vec![
            "-o".to_string(),
            format!("ControlPath={}", control_path.display()),
            "-p".to_string(),
            self.port.to_string(),
            "-l".to_string(),
            self.username.clone(),
        ]
    }

    /// Start a master that stays in the foreground for the session's lifetime.
    pub(crate) fn master_args(&self, control_path: &Path, options: &SshOptions) -> Vec<String> {
        let mut args = vec!["-M".to_string(), "-N".to_string()];
        args.extend(self.common(control_path));

        let mut opt = |value: String| {
            args.push("-o".to_string());
            args.push(value);
        };
        opt(format!(
            "ConnectTimeout={}",
            options.connect_timeout.as_secs().max(1)
        ));
        opt(format!(
            "StrictHostKeyChecking={}",
            options.host_key_policy.as_ssh_value()
        ));
        if let Some(known_hosts) = &options.known_hosts_file {
            opt(format!("UserKnownHostsFile={}", known_hosts.display()));
        }
        if self.uses_password {
            opt("BatchMode=no".to_string());
            opt("PreferredAuthentications=password,keyboard-interactive".to_string());
            opt("PubkeyAuthentication=no".to_string());
            opt("NumberOfPasswordPrompts=1".to_string());
        } else {
            opt("BatchMode=yes".to_string());
        }

        if let Some(key) = &self.key_path {
            args.push("-i".to_string());
            args.push(key.display().to_string());
            args.push("-o".to_string());
            args.push("IdentitiesOnly=yes".to_string());
        }
        args.extend(options.extra_args.iter().cloned());
        args.push(self.host.clone());
        args
    }

    /// Run one command over an existing master.
    pub(crate) fn exec_args(&self, control_path: &Path, command: &str) -> Vec<String> {
        let mut args = self.common(control_path);
        args.extend([
            "-o".to_string(),
            "ControlMaster=no".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-T".to_string(),
            self.host.clone(),
            command.to_string(),
        ]);
        args
    }

    /// Succeeds once the master is authenticated and accepting requests.
    pub(crate) fn check_args(&self, control_path: &Path) -> Vec<String> {
        let mut args = self.common(control_path);
        args.extend(["-O".to_string(), "check".to_string(), self.host.clone()]);
        args
    }

    /// Ask the master to shut down.
    pub(crate) fn exit_args(&self, control_path: &Path) -> Vec<String> {
        let mut args = self.common(control_path);
        args.extend(["-O".to_string(), "exit".to_string(), self.host.clone()]);
        args
    }
}
