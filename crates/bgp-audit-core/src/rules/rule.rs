//! Rule definitions and compiled rules.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;

use crate::domain::ConfigError;

/// How a rule recognises that a best practice is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkerDef {
    /// Substring containment anywhere in the configuration text.
    Contains {
        pattern: String,
        #[serde(default)]
        case_insensitive: bool,
    },
    /// Regular expression, compiled in multi-line mode.
    Regex {
        pattern: String,
        #[serde(default)]
        case_insensitive: bool,
    },
}

impl MarkerDef {
    pub fn contains(pattern: impl Into<String>) -> Self {
        MarkerDef::Contains {
            pattern: pattern.into(),
            case_insensitive: false,
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            MarkerDef::Contains { pattern, .. } | MarkerDef::Regex { pattern, .. } => pattern,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MarkerDef::Contains { .. } => "contains",
            MarkerDef::Regex { .. } => "regex",
        }
    }

    fn case_insensitive(&self) -> bool {
        match self {
            MarkerDef::Contains {
                case_insensitive, ..
            }
            | MarkerDef::Regex {
                case_insensitive, ..
            } => *case_insensitive,
        }
    }
}

/// Declarative form of a rule, as written in a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDef {
    pub id: String,
    pub marker: MarkerDef,
    pub recommendation: String,
}

#[derive(Debug, Clone)]
enum Matcher {
    Contains(String),
    /// Pattern already lowercased.
    ContainsFolded(String),
    Regex(Regex),
}

/// A validated, compiled best-practice check.
///
/// Immutable and stateless; shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct Rule {
    def: RuleDef,
    matcher: Matcher,
}

impl Rule {
    /// Validate and compile a rule definition.
    pub fn compile(def: RuleDef) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRule {
            id: def.id.clone(),
            reason: reason.to_string(),
        };

        if def.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if def.recommendation.trim().is_empty() {
            return Err(invalid("recommendation must not be empty"));
        }
        if def.marker.pattern().is_empty() {
            return Err(invalid("marker pattern must not be empty"));
        }

        let matcher = match &def.marker {
            MarkerDef::Contains {
                pattern,
                case_insensitive: false,
            } => Matcher::Contains(pattern.clone()),
            MarkerDef::Contains {
                pattern,
                case_insensitive: true,
            } => Matcher::ContainsFolded(pattern.to_lowercase()),
            MarkerDef::Regex {
                pattern,
                case_insensitive,
            } => {
                let regex = RegexBuilder::new(pattern)
                    .multi_line(true)
                    .case_insensitive(*case_insensitive)
                    .build()
                    .map_err(|e| invalid(&format!("invalid regex: {e}")))?;
                Matcher::Regex(regex)
            }
        };

        Ok(Self { def, matcher })
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn recommendation(&self) -> &str {
        &self.def.recommendation
    }

    pub fn definition(&self) -> &RuleDef {
        &self.def
    }

    /// Whether the best-practice marker occurs in `text`.
    ///
    /// `folded` caches the lowercased text across rules; it is only filled
    /// by case-insensitive substring markers.
    pub(crate) fn marker_present(&self, text: &str, folded: &OnceCell<String>) -> bool {
        match &self.matcher {
            Matcher::Contains(pattern) => text.contains(pattern.as_str()),
            Matcher::ContainsFolded(pattern) => folded
                .get_or_init(|| text.to_lowercase())
                .contains(pattern.as_str()),
            Matcher::Regex(regex) => regex.is_match(text),
        }
    }

    /// Stable textual form used for rule set digests.
    pub(crate) fn canonical(&self) -> String {
        format!(
            "{}\0{}\0{}\0{}\0{}",
            self.def.id,
            self.def.marker.kind(),
            self.def.marker.case_insensitive(),
            self.def.marker.pattern(),
            self.def.recommendation
        )
    }
}
