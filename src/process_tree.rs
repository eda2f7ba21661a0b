//! Process tree tracking: per-pid working directory and rule membership
//!
//! A rule is a process forked directly by the root build-tool process,
//! together with all of its descendants. The root itself never belongs to
//! a rule.

use crate::path::join_normalized;
use crate::rules::{RuleId, RuleRegistry};
use crate::Pid;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Tracked state of one traced process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessState {
    pub pid: Pid,
    pub cwd: PathBuf,
    /// Non-owning reference into the [`RuleRegistry`]
    pub rule: Option<RuleId>,
}

/// Effect of a successful fork on the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkOutcome {
    /// Child of the root: a new rule was created
    NewRule(RuleId),
    /// Child joined its parent's rule
    Joined(RuleId),
    /// Parent had no rule (root not known yet, or untracked parent)
    Untracked,
}

/// pid → process state map plus the root pid
#[derive(Debug, Clone)]
pub struct ProcessTable {
    processes: HashMap<Pid, ProcessState>,
    root: Option<Pid>,
    initial_cwd: PathBuf,
}

impl ProcessTable {
    /// `initial_cwd` is the directory assumed for processes never seen before
    pub fn new(initial_cwd: &Path) -> Self {
        Self {
            processes: HashMap::new(),
            root: None,
            initial_cwd: initial_cwd.to_path_buf(),
        }
    }

    pub fn root(&self) -> Option<Pid> {
        self.root
    }

    pub fn set_root(&mut self, pid: Pid) {
        self.root = Some(pid);
        self.entry(pid);
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessState> {
        self.processes.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    fn entry(&mut self, pid: Pid) -> &mut ProcessState {
        let initial_cwd = &self.initial_cwd;
        self.processes.entry(pid).or_insert_with(|| ProcessState {
            pid,
            cwd: initial_cwd.clone(),
            rule: None,
        })
    }

    /// Current working directory of `pid`
    pub fn cwd(&self, pid: Pid) -> &Path {
        self.processes
            .get(&pid)
            .map_or(self.initial_cwd.as_path(), |p| p.cwd.as_path())
    }

    pub fn rule_of(&self, pid: Pid) -> Option<RuleId> {
        self.processes.get(&pid).and_then(|p| p.rule)
    }

    /// Record a successful fork of `child` by `parent` seen at `line`
    ///
    /// The child inherits the parent's cwd unless it was already seen: strace
    /// can print a child's first syscalls before the parent's fork result.
    /// Rules are only created or joined once the root is known.
    pub fn fork(
        &mut self,
        parent: Pid,
        child: Pid,
        line: usize,
        rules: &mut RuleRegistry,
    ) -> ForkOutcome {
        let cwd = self.cwd(parent).to_path_buf();
        let parent_rule = self.rule_of(parent);
        let is_root = self.root == Some(parent);

        let outcome = if is_root {
            ForkOutcome::NewRule(rules.create(child, line))
        } else if let Some(id) = parent_rule {
            if let Some(rule) = rules.get_mut(id) {
                rule.add_pid(child);
            }
            ForkOutcome::Joined(id)
        } else {
            ForkOutcome::Untracked
        };

        let state = self.processes.entry(child).or_insert_with(|| ProcessState {
            pid: child,
            cwd,
            rule: None,
        });
        state.rule = match outcome {
            ForkOutcome::NewRule(id) | ForkOutcome::Joined(id) => Some(id),
            ForkOutcome::Untracked => None,
        };
        outcome
    }

    /// Apply `chdir(path)` for `pid`; returns the new cwd
    pub fn chdir(&mut self, pid: Pid, path: &str) -> &Path {
        let new_cwd = join_normalized(self.cwd(pid), path);
        let state = self.entry(pid);
        state.cwd = new_cwd;
        &state.cwd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ProcessTable {
        ProcessTable::new(Path::new("/src"))
    }

    #[test]
    fn test_child_of_root_starts_rule() {
        let mut procs = table();
        let mut rules = RuleRegistry::new();
        procs.set_root(10);

        let outcome = procs.fork(10, 20, 5, &mut rules);
        let ForkOutcome::NewRule(id) = outcome else {
            panic!("expected new rule, got {:?}", outcome);
        };
        assert_eq!(rules.get(id).unwrap().creation_line, 5);
        assert_eq!(procs.rule_of(20), Some(id));
        assert_eq!(procs.rule_of(10), None);
    }

    #[test]
    fn test_grandchild_joins_parent_rule() {
        let mut procs = table();
        let mut rules = RuleRegistry::new();
        procs.set_root(10);

        procs.fork(10, 20, 2, &mut rules);
        let outcome = procs.fork(20, 21, 3, &mut rules);
        let id = procs.rule_of(20).unwrap();
        assert_eq!(outcome, ForkOutcome::Joined(id));
        assert_eq!(rules.len(), 1);
        assert!(rules.get(id).unwrap().pids.contains(&21));
    }

    #[test]
    fn test_fork_before_root_is_untracked() {
        let mut procs = table();
        let mut rules = RuleRegistry::new();
        assert_eq!(procs.fork(1, 2, 1, &mut rules), ForkOutcome::Untracked);
        assert!(rules.is_empty());
        assert_eq!(procs.rule_of(2), None);
    }

    #[test]
    fn test_child_inherits_cwd() {
        let mut procs = table();
        let mut rules = RuleRegistry::new();
        procs.set_root(10);
        procs.chdir(10, "build");
        procs.fork(10, 20, 2, &mut rules);
        assert_eq!(procs.cwd(20), Path::new("/src/build"));
    }

    #[test]
    fn test_child_seen_before_fork_keeps_own_cwd() {
        let mut procs = table();
        let mut rules = RuleRegistry::new();
        procs.set_root(10);
        procs.chdir(10, "build");
        procs.chdir(20, "sub");
        let outcome = procs.fork(10, 20, 4, &mut rules);
        assert!(matches!(outcome, ForkOutcome::NewRule(_)));
        assert_eq!(procs.cwd(20), Path::new("/src/sub"));
        assert!(procs.rule_of(20).is_some());
    }

    #[test]
    fn test_chdir_is_normalized_and_sticky() {
        let mut procs = table();
        assert_eq!(procs.chdir(7, "a/./b"), Path::new("/src/a/b"));
        assert_eq!(procs.chdir(7, "../c"), Path::new("/src/a/c"));
        assert_eq!(procs.chdir(7, "/tmp"), Path::new("/tmp"));
        assert_eq!(procs.cwd(7), Path::new("/tmp"));
        assert_eq!(procs.cwd(8), Path::new("/src"));
    }
}
