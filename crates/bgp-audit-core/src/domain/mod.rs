//! Domain models for BGP configuration audits.
//!
//! Canonical definitions for the core entities:
//! - `Device`: one router from the inventory, immutable for the run
//! - `RawConfig`: configuration text fetched from a device
//! - `Finding`: a single missing best practice
//! - `AuditResult`: the atomic, terminal outcome for one device

pub mod device;
pub mod error;
pub mod finding;
pub mod result;

// Re-export main types and errors
pub use device::{Credentials, Device};
pub use error::{AuditError, ConfigError, ConnectError, FetchError, SessionError, WriteError};
pub use finding::{Finding, RawConfig};
pub use result::{AuditResult, Diagnostic, Outcome, Severity, Stage};
