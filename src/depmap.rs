//! Target → dependency map shared with tool-reported dependency graphs
//!
//! Build-tool introspection (e.g. `ninja -t deps`) yields a map from target
//! name to build-tree-relative paths. Traced rules are exposed in the same
//! shape so both can feed the same graph or table consumers.

use crate::rules::{Rule, RuleRegistry};
use std::collections::{BTreeMap, BTreeSet};

/// Target (or rule) name → build-tree-relative dependency paths
pub type DependencyMap = BTreeMap<String, BTreeSet<String>>;

/// Anything that can describe its dependencies as a [`DependencyMap`]
pub trait DependencySource {
    fn dependency_map(&self) -> DependencyMap;
}

/// Name a traced rule by its first output, or by its creation line
pub fn rule_key(rule: &Rule) -> String {
    rule.outputs
        .iter()
        .next()
        .cloned()
        .unwrap_or_else(|| format!("rule@{}", rule.creation_line))
}

impl DependencySource for RuleRegistry {
    fn dependency_map(&self) -> DependencyMap {
        let mut map = DependencyMap::new();
        for rule in self {
            map.entry(rule_key(rule))
                .or_default()
                .extend(rule.filtered_dependencies().cloned());
        }
        map
    }
}

impl DependencySource for DependencyMap {
    fn dependency_map(&self) -> DependencyMap {
        self.clone()
    }
}
