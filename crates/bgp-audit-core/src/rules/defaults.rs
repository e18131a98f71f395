//! Built-in BGP best-practice rules.

use super::rule::{MarkerDef, RuleDef};

/// Version tag of the built-in rule table.
pub const BUILTIN_VERSION: u32 = 1;

/// (id, marker substring, recommendation), in evaluation order.
const BUILTIN_RULES: &[(&str, &str, &str)] = &[
    ("synchronization", "synchronization", "no synchronization"),
    ("log-neighbor-changes", "log-neighbor-changes", "log neighbor changes"),
    ("no-auto-summary", "no auto-summary", "no auto-summary"),
    ("remove-private-as", "remove-private-AS", "remove private AS"),
    ("maximum-prefix", "maximum-prefix", "set maximum-prefix limit"),
    ("router-id", "router-id", "use loopback for router-id"),
    ("next-hop-self", "next-hop-self", "set next-hop-self for iBGP neighbors"),
    ("ttl-security", "ttl-security", "enable ttl-security check"),
    ("neighbor-password", "password", "enable neighbor authentication"),
    ("filter-list", "filter-list", "enable neighbor access or filter list"),
];

/// The ten default checks as case-sensitive substring markers.
pub fn builtin_rule_defs() -> Vec<RuleDef> {
    BUILTIN_RULES
        .iter()
        .map(|(id, pattern, recommendation)| RuleDef {
            id: (*id).to_string(),
            marker: MarkerDef::contains(*pattern),
            recommendation: (*recommendation).to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_ten_unique_rules() {
        let defs = builtin_rule_defs();
        assert_eq!(defs.len(), 10);
        let ids: std::collections::HashSet<_> = defs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn test_builtin_order_starts_with_synchronization() {
        let defs = builtin_rule_defs();
        assert_eq!(defs[0].recommendation, "no synchronization");
        assert_eq!(defs[9].recommendation, "enable neighbor access or filter list");
    }
}
