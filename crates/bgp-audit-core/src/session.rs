//! Remote command-execution seam.
//!
//! Implement [`RemoteClient`] to plug in a real transport (see the
//! `bgp-audit-ssh` crate) or a test fake (see [`crate::fakes`]).

use async_trait::async_trait;

use crate::domain::{Device, SessionError};

/// A live, authenticated channel to one device.
///
/// Owned exclusively by the worker that opened it.
#[async_trait]
pub trait Session: Send {
    /// Run `command` on the device and return its output.
    async fn execute(&mut self, command: &str) -> Result<String, SessionError>;

    /// Release the session. Called exactly once by the worker.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Factory for device sessions.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn connect(&self, device: &Device) -> Result<Box<dyn Session>, SessionError>;
}
