//! Fetched configuration text and the findings produced from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration text captured from one device during one run.
///
/// Owned by the worker that fetched it until handed to the rule engine;
/// never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConfig {
    pub hostname: String,
    pub text: String,
    pub fetched_at: DateTime<Utc>,
}

impl RawConfig {
    pub fn new(hostname: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            text: text.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// A single best practice missing from a device's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub hostname: String,
    /// Id of the rule that produced this finding.
    pub rule_id: String,
    pub recommendation: String,
}
