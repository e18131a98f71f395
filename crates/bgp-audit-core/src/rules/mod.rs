//! Best-practice rule engine.
//!
//! - [`rule`]: `RuleDef` (declarative) and `Rule` (compiled)
//! - [`set`]: `RuleSet`, ordered and versioned, loaded once at startup
//! - [`defaults`]: the ten built-in BGP checks
//! - [`engine`]: `evaluate()`, a pure function from text to findings

pub mod defaults;
pub mod engine;
pub mod rule;
pub mod set;

pub use engine::{evaluate, missing_practices};
pub use rule::{MarkerDef, Rule, RuleDef};
pub use set::{RuleFile, RuleSet};
