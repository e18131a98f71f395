//! OpenSSH-backed [`RemoteClient`](bgp_audit_core::RemoteClient).
//!
//! Each session is a ControlMaster connection owned by one worker:
//!
//! - connect: spawn a master (`ssh -M -N`) on a private control socket and
//!   poll `ssh -O check` until it is authenticated or exits
//! - execute: run the command over the master
//! - close:   `ssh -O exit`, then reap the master and remove the socket
//!   directory
//!
//! The master process is killed if its session is dropped without closing.
//!
//! Password logins go through `sshpass -e` so the secret never appears on a
//! command line. Records without a password or key use the ssh agent.

mod args;
mod classify;
mod client;
mod error;

pub use args::{HostKeyPolicy, SshTarget};
pub use classify::classify_failure;
pub use client::{SshClient, SshOptions};
pub use error::SshError;
