//! The registered migration rule sets.
//!
//! `annotations` consolidates JAX-RS routing annotations into Spring Web
//! mappings; `response` rewrites `Response` builder chains into
//! `ResponseEntity` chains. `migration_rules` is the full set in the order
//! the passes should try them: declaration-level consolidation first, then
//! the call-chain rules with the deferred-payload fallback last.

pub mod annotations;
pub mod response;

use crate::rule::RuleSet;

/// The complete JAX-RS → Spring migration rule set.
pub fn migration_rules() -> RuleSet {
    let mut rules = RuleSet::new();
    for rule in annotations::annotation_rules() {
        rules.push(rule);
    }
    for rule in response::response_builder_rules() {
        rules.push(rule);
    }
    for ty in response::settled_types() {
        rules.settle(ty);
    }
    rules
}
