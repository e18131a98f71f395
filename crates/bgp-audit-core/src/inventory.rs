//! Device inventory loading and validation.
//!
//! Two file formats, chosen by extension:
//!
//! - `.toml`: `[[device]]` tables
//! - `.json`: a top-level array of records
//!
//! Every record is validated before any device is contacted. A malformed
//! record rejects the whole inventory; nothing is silently skipped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::{ConfigError, Credentials, Device};
use crate::snapshot;

/// One inventory record as written by the operator.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceRecord {
    #[serde(default)]
    pub hostname: String,
    #[serde(default, alias = "ip_address")]
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub port: Option<u16>,
}

impl std::fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("hostname", &self.hostname)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_path", &self.key_path)
            .field("device_type", &self.device_type)
            .field("port", &self.port)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlInventory {
    #[serde(rename = "device", default)]
    devices: Vec<DeviceRecord>,
}

impl DeviceRecord {
    /// Convert into a [`Device`], checking required fields.
    ///
    /// `index` is the zero-based position in the inventory, used in errors.
    pub fn into_device(self, index: usize) -> Result<Device, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidRecord { index, reason };

        for (field, value) in [
            ("hostname", &self.hostname),
            ("address", &self.address),
            ("username", &self.username),
            ("device_type", &self.device_type),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("missing or empty field '{field}'")));
            }
        }
        if self.hostname.trim() != self.hostname {
            return Err(invalid(format!(
                "hostname '{}' has surrounding whitespace",
                self.hostname
            )));
        }
        if self.password.as_deref() == Some("") {
            return Err(invalid("password is empty".to_string()));
        }
        if self.port == Some(0) {
            return Err(invalid("port must be between 1 and 65535".to_string()));
        }

        let mut credentials = Credentials::new(self.username);
        credentials.password = self.password;
        credentials.key_path = self.key_path;

        let mut device = Device::new(
            self.hostname,
            self.address.trim(),
            credentials,
            self.device_type.trim(),
        );
        device.port = self.port;
        Ok(device)
    }
}

/// Validate records in order and reject duplicate hostnames.
///
/// Hostnames that map to the same snapshot file are rejected too, so one
/// device can never overwrite another's audit trail.
pub fn validate(records: Vec<DeviceRecord>) -> Result<Vec<Device>, ConfigError> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut files: HashMap<String, usize> = HashMap::new();
    let mut devices: Vec<Device> = Vec::with_capacity(records.len());

    for (index, record) in records.into_iter().enumerate() {
        let device = record.into_device(index)?;
        if let Some(&first) = seen.get(&device.hostname) {
            return Err(ConfigError::DuplicateHostname {
                hostname: device.hostname,
                first,
                second: index,
            });
        }
        let file_name = snapshot::file_name(&device.hostname);
        if let Some(&first_index) = files.get(&file_name) {
            return Err(ConfigError::SnapshotNameClash {
                first: devices[first_index].hostname.clone(),
                second: device.hostname,
                file_name,
                first_index,
                second_index: index,
            });
        }
        seen.insert(device.hostname.clone(), index);
        files.insert(file_name, index);
        devices.push(device);
    }

    Ok(devices)
}

/// Parse inventory text in the given format.
pub fn parse(content: &str, format: InventoryFormat, origin: &Path) -> Result<Vec<Device>, ConfigError> {
    let parse_err = |detail: String| ConfigError::Parse {
        path: origin.to_path_buf(),
        detail,
    };

    let records = match format {
        InventoryFormat::Toml => {
            toml::from_str::<TomlInventory>(content)
                .map_err(|e| parse_err(e.to_string()))?
                .devices
        }
        InventoryFormat::Json => serde_json::from_str::<Vec<DeviceRecord>>(content)
            .map_err(|e| parse_err(e.to_string()))?,
    };

    validate(records)
}

/// Load and validate an inventory file.
pub fn load(path: &Path) -> Result<Vec<Device>, ConfigError> {
    let format = InventoryFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content, format, path)
}

/// Supported inventory encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryFormat {
    Toml,
    Json,
}

impl InventoryFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(InventoryFormat::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(InventoryFormat::Json),
            _ => Err(ConfigError::Parse {
                path: path.to_path_buf(),
                detail: "unsupported inventory format (expected .toml or .json)".to_string(),
            }),
        }
    }
}
