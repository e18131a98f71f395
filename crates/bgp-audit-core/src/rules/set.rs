//! Ordered, versioned rule sets and their on-disk format.
//!
//! A rule file is TOML:
//!
//! ```toml
//! version = 2
//!
//! [[rule]]
//! id = "ttl-security"
//! recommendation = "enable ttl-security check"
//! marker = { kind = "contains", pattern = "ttl-security" }
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

use super::defaults::{builtin_rule_defs, BUILTIN_VERSION};
use super::rule::{Rule, RuleDef};
use crate::domain::ConfigError;

/// Serialized form of a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleFile {
    pub version: u32,
    #[serde(rename = "rule", default)]
    pub rules: Vec<RuleDef>,
}

/// An ordered set of compiled rules. Evaluation order is definition order.
#[derive(Debug, Clone)]
pub struct RuleSet {
    version: u32,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile a rule set, rejecting empty sets and duplicate ids.
    pub fn new(version: u32, defs: Vec<RuleDef>) -> Result<Self, ConfigError> {
        if defs.is_empty() {
            return Err(ConfigError::EmptyRuleSet);
        }

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(defs.len());
        for def in defs {
            if !seen.insert(def.id.clone()) {
                return Err(ConfigError::InvalidRule {
                    id: def.id,
                    reason: "duplicate rule id".to_string(),
                });
            }
            rules.push(Rule::compile(def)?);
        }

        Ok(Self { version, rules })
    }

    /// The ten default BGP checks.
    ///
    /// The table is static; a test asserts every entry compiles.
    pub fn builtin() -> Self {
        let rules = builtin_rule_defs()
            .into_iter()
            .filter_map(|def| Rule::compile(def).ok())
            .collect();
        Self {
            version: BUILTIN_VERSION,
            rules,
        }
    }

    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let file: RuleFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::new(file.version, file.rules)
    }

    /// Load and compile a rule file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// SHA-256 over the version and ordered rule definitions.
    ///
    /// Reordering rules changes the digest, since it changes finding order.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.version.to_be_bytes());
        for rule in &self.rules {
            hasher.update(rule.canonical().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    /// Serializable form of this rule set.
    pub fn to_rule_file(&self) -> RuleFile {
        RuleFile {
            version: self.version,
            rules: self.rules.iter().map(|r| r.definition().clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::rule::MarkerDef;

    const SAMPLE: &str = r#"
version = 2

[[rule]]
id = "ttl-security"
recommendation = "enable ttl-security check"
marker = { kind = "contains", pattern = "ttl-security" }

[[rule]]
id = "bfd"
recommendation = "enable BFD on eBGP sessions"
marker = { kind = "regex", pattern = '^\s*neighbor \S+ fall-over bfd', case_insensitive = true }
"#;

    #[test]
    fn test_parse_rule_file() {
        let set = RuleSet::from_toml_str(SAMPLE, Path::new("rules.toml")).unwrap();
        assert_eq!(set.version(), 2);
        assert_eq!(set.len(), 2);
        assert_eq!(set.rules()[0].id(), "ttl-security");
        assert_eq!(set.rules()[1].id(), "bfd");
    }

    #[test]
    fn test_unknown_marker_kind_rejected() {
        let content = r#"
version = 1
[[rule]]
id = "x"
recommendation = "y"
marker = { kind = "glob", pattern = "*" }
"#;
        let err = RuleSet::from_toml_str(content, Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_empty_rule_file_rejected() {
        let err = RuleSet::from_toml_str("version = 1\n", Path::new("empty.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyRuleSet));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let defs = vec![
            RuleDef {
                id: "dup".to_string(),
                marker: MarkerDef::contains("a"),
                recommendation: "a".to_string(),
            },
            RuleDef {
                id: "dup".to_string(),
                marker: MarkerDef::contains("b"),
                recommendation: "b".to_string(),
            },
        ];
        let err = RuleSet::new(1, defs).unwrap_err();
        assert!(err.to_string().contains("duplicate rule id"));
    }

    #[test]
    fn test_every_builtin_rule_compiles() {
        let strict = RuleSet::new(BUILTIN_VERSION, builtin_rule_defs()).unwrap();
        let builtin = RuleSet::builtin();
        assert_eq!(builtin.len(), 10);
        assert_eq!(builtin.len(), builtin_rule_defs().len());
        assert_eq!(builtin.digest(), strict.digest());
    }

    #[test]
    fn test_builtin_digest_is_stable() {
        assert_eq!(RuleSet::builtin().digest(), RuleSet::builtin().digest());
        assert_eq!(RuleSet::builtin().digest().len(), 64);
    }

    #[test]
    fn test_digest_is_order_sensitive() {
        let mut defs = builtin_rule_defs();
        let forward = RuleSet::new(1, defs.clone()).unwrap();
        defs.reverse();
        let reversed = RuleSet::new(1, defs).unwrap();
        assert_ne!(forward.digest(), reversed.digest());
    }

    #[test]
    fn test_rule_file_roundtrips_through_toml() {
        let builtin = RuleSet::builtin();
        let rendered = toml::to_string(&builtin.to_rule_file()).unwrap();
        let reparsed = RuleSet::from_toml_str(&rendered, Path::new("builtin.toml")).unwrap();
        assert_eq!(reparsed.digest(), builtin.digest());
    }

    #[test]
    fn test_load_missing_file() {
        let err = RuleSet::load(Path::new("/nonexistent/rules.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
