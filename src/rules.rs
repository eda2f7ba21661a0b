//! Rule registry: one rule per process subtree forked by the build tool

use crate::Pid;
use std::collections::BTreeSet;

/// Stable index of a rule inside the [`RuleRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(usize);

impl RuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A build rule reconstructed from the trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub id: RuleId,
    /// Trace line of the fork that started the rule
    pub creation_line: usize,
    pub pids: BTreeSet<Pid>,
    pub dependencies: BTreeSet<String>,
    pub outputs: BTreeSet<String>,
}

impl Rule {
    fn new(id: RuleId, pid: Pid, creation_line: usize) -> Self {
        Self {
            id,
            creation_line,
            pids: BTreeSet::from([pid]),
            dependencies: BTreeSet::new(),
            outputs: BTreeSet::new(),
        }
    }

    pub fn add_pid(&mut self, pid: Pid) {
        self.pids.insert(pid);
    }

    pub fn add_dependency(&mut self, path: String) {
        self.dependencies.insert(path);
    }

    pub fn add_output(&mut self, path: String) {
        self.outputs.insert(path);
    }

    /// Dependencies the rule did not produce itself
    ///
    /// Multi-step rules may write intermediate files and read them back;
    /// those are not external dependencies.
    pub fn filtered_dependencies(&self) -> impl Iterator<Item = &String> {
        self.dependencies.difference(&self.outputs)
    }

    /// Every path the rule wrote, including files it later deleted
    pub fn filtered_outputs(&self) -> impl Iterator<Item = &String> {
        self.outputs.iter()
    }

    /// Member pids joined with `|`, ascending
    pub fn pid_list(&self) -> String {
        self.pids
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Arena owning every rule, in creation order
#[derive(Debug, Default, Clone)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new rule owned by `pid`
    pub fn create(&mut self, pid: Pid, creation_line: usize) -> RuleId {
        let id = RuleId(self.rules.len());
        self.rules.push(Rule::new(id, pid, creation_line));
        id
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.0)
    }

    pub fn get_mut(&mut self, id: RuleId) -> Option<&mut Rule> {
        self.rules.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleRegistry {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_assigns_sequential_ids() {
        let mut registry = RuleRegistry::new();
        let a = registry.create(20, 3);
        let b = registry.create(30, 9);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(b).unwrap().creation_line, 9);
        assert!(registry.get(b).unwrap().pids.contains(&30));
    }

    #[test]
    fn test_filtered_dependencies_exclude_outputs() {
        let mut registry = RuleRegistry::new();
        let id = registry.create(20, 1);
        let rule = registry.get_mut(id).unwrap();
        rule.add_dependency("a.c".to_string());
        rule.add_dependency("a.o".to_string());
        rule.add_output("a.o".to_string());

        let deps: Vec<_> = rule.filtered_dependencies().cloned().collect();
        let outs: Vec<_> = rule.filtered_outputs().cloned().collect();
        assert_eq!(deps, vec!["a.c"]);
        assert_eq!(outs, vec!["a.o"]);
    }

    #[test]
    fn test_pid_list_is_sorted() {
        let mut registry = RuleRegistry::new();
        let id = registry.create(300, 1);
        let rule = registry.get_mut(id).unwrap();
        rule.add_pid(21);
        rule.add_pid(1000);
        rule.add_pid(21);
        assert_eq!(rule.pid_list(), "21|300|1000");
    }

    #[test]
    fn test_empty_registry() {
        let registry = RuleRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.iter().count(), 0);
    }
}
