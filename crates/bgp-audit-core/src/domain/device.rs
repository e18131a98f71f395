//! Inventory device records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Login material for a device.
///
/// Treated as an opaque handle by everything except the remote client.
/// `Debug` redacts the password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

impl Credentials {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            key_path: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_key_path(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_path", &self.key_path)
            .finish()
    }
}

/// A router to audit. Immutable once loaded; `hostname` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub hostname: String,
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub credentials: Credentials,
    pub device_type: String,
}

impl Device {
    pub fn new(
        hostname: impl Into<String>,
        address: impl Into<String>,
        credentials: Credentials,
        device_type: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
            port: None,
            credentials,
            device_type: device_type.into(),
        }
    }
}
