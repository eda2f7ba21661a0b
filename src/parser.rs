//! Trace parsing pipeline
//!
//! Raw lines flow through three stages:
//! 1. [`LineJoiner`] reassembles interrupted syscalls into logical lines
//! 2. [`decode`] turns each logical line into a [`TraceRecord`]
//! 3. [`DepsParser`] tracks the process tree and attributes file accesses
//!    to rules
//!
//! Until the build tool's `execve` is seen only working directories are
//! tracked; rule attribution starts once the root process is known.

use crate::classify::{classify, AccessKind};
use crate::config::ParserConfig;
use crate::decoder::{decode, TraceEvent, TraceRecord};
use crate::depmap::{DependencyMap, DependencySource};
use crate::diagnostics::{Anomaly, AnomalyKind, Diagnostics};
use crate::error::{Result, TraceError};
use crate::joiner::{Joined, LineJoiner, LogicalLine};
use crate::path::{normalize, PathResolver};
use crate::process_tree::{ForkOutcome, ProcessTable};
use crate::report::{records, RuleRecord};
use crate::rules::RuleRegistry;
use crate::syscalls::{is_fork, SyscallClass};
use crate::Pid;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Result of a complete parse run
#[derive(Debug, Clone)]
pub struct TraceOutcome {
    pub root_pid: Pid,
    pub rules: RuleRegistry,
    pub diagnostics: Diagnostics,
}

impl TraceOutcome {
    pub fn records(&self) -> Vec<RuleRecord> {
        records(&self.rules)
    }

    pub fn dependency_map(&self) -> DependencyMap {
        self.rules.dependency_map()
    }
}

/// Child pid carried by a fork-family return value
fn child_pid(ret: i64) -> Option<Pid> {
    Pid::try_from(ret).ok().filter(|&pid| pid > 0)
}

/// Sequential consumer of one trace stream
#[derive(Debug)]
pub struct DepsParser {
    config: ParserConfig,
    resolver: PathResolver,
    processes: ProcessTable,
    rules: RuleRegistry,
    diagnostics: Diagnostics,
}

impl DepsParser {
    pub fn new(config: ParserConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            resolver: PathResolver::new(&config.build_root),
            processes: ProcessTable::new(&config.initial_cwd),
            rules: RuleRegistry::new(),
            diagnostics: Diagnostics::new(),
            config,
        })
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn root_pid(&self) -> Option<Pid> {
        self.processes.root()
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Parse a previously captured trace file
    pub fn parse_path(self, path: &Path) -> Result<TraceOutcome> {
        let file = File::open(path)?;
        self.parse_reader(BufReader::new(file))
    }

    /// Parse a buffered stream until end-of-stream
    pub fn parse_reader<R: BufRead>(self, reader: R) -> Result<TraceOutcome> {
        self.parse_lines(reader.lines())
    }

    /// Parse raw trace lines until the iterator is exhausted
    pub fn parse_lines<I>(mut self, lines: I) -> Result<TraceOutcome>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        for item in LineJoiner::new(lines.into_iter()) {
            match item? {
                Joined::Line(line) => self.feed_line(&line)?,
                Joined::Anomaly(anomaly) => self.on_anomaly(anomaly)?,
            }
        }
        self.finish()
    }

    /// Decode and apply one logical line
    pub fn feed_line(&mut self, line: &LogicalLine) -> Result<()> {
        self.diagnostics.logical_lines += 1;
        match decode(line) {
            Ok(TraceRecord::Syscall(event)) => {
                self.feed_event(&event);
                Ok(())
            }
            Ok(TraceRecord::Exit { pid, code }) => {
                tracing::trace!(pid, ?code, "process exited");
                Ok(())
            }
            Ok(TraceRecord::Signal { .. }) => Ok(()),
            Err(e) => {
                tracing::debug!("line {}: {}", line.number, e);
                self.on_anomaly(Anomaly {
                    line_number: line.number,
                    kind: AnomalyKind::UnmatchedLine,
                    line: line.text.trim().to_string(),
                })
            }
        }
    }

    /// Apply one decoded event
    pub fn feed_event(&mut self, event: &TraceEvent) {
        let failed = event.ret.is_failure();
        self.diagnostics
            .record_syscall(&event.syscall, failed, event.ret.is_pending());
        tracing::trace!(
            pid = event.pid,
            op = %event.syscall,
            args = ?event.args,
            ret = ?event.ret,
            line = event.line_number,
            "syscall"
        );

        // Failed accesses say nothing about real dependencies
        if failed {
            return;
        }

        match self.processes.root() {
            None => self.scan_for_root(event),
            Some(root) => self.attribute(event, root),
        }
    }

    /// Pre-root phase: follow cwd changes and look for the tool's execve
    fn scan_for_root(&mut self, event: &TraceEvent) {
        let Some(ret) = event.ret.value() else {
            return;
        };

        match event.syscall.as_str() {
            name if is_fork(name) => {
                if let Some(child) = child_pid(ret) {
                    self.processes
                        .fork(event.pid, child, event.line_number, &mut self.rules);
                }
            }
            "chdir" => {
                if let Some(path) = event.path_arg(0) {
                    self.processes.chdir(event.pid, path);
                }
            }
            "execve" if ret == 0 => {
                let Some(path) = event.path_arg(0) else {
                    return;
                };
                let program = normalize(Path::new(path));
                if program.to_string_lossy().ends_with(&self.config.tool_name) {
                    tracing::info!(
                        "detected {} process invocation: pid {} at line {}",
                        self.config.tool_name,
                        event.pid,
                        event.line_number
                    );
                    self.processes.set_root(event.pid);
                }
            }
            _ => {}
        }
    }

    /// Rule phase: maintain the tree and record accesses
    fn attribute(&mut self, event: &TraceEvent, root: Pid) {
        // Unknown results (`= ?`) attribute nothing until a completed record arrives
        let Some(ret) = event.ret.value() else {
            return;
        };

        if is_fork(&event.syscall) {
            let Some(child) = child_pid(ret) else {
                if ret > 0 {
                    tracing::warn!(
                        "line {}: fork result {} is not a valid pid",
                        event.line_number,
                        ret
                    );
                }
                return;
            };
            match self
                .processes
                .fork(event.pid, child, event.line_number, &mut self.rules)
            {
                ForkOutcome::NewRule(id) => tracing::debug!(
                    "Creating a build rule record for pid {}, line {} in strace log (rule {})",
                    child,
                    event.line_number,
                    id.index()
                ),
                ForkOutcome::Joined(id) => {
                    tracing::trace!("pid {} joins rule {}", child, id.index())
                }
                ForkOutcome::Untracked => {
                    tracing::debug!("fork {} -> {} outside any rule", event.pid, child);
                    self.diagnostics.orphan_forks += 1;
                }
            }
            return;
        }

        if event.syscall == "chdir" {
            if let Some(path) = event.path_arg(0) {
                self.processes.chdir(event.pid, path);
            }
            return;
        }

        if event.class == SyscallClass::Unused {
            return;
        }

        let classification = classify(event, self.processes.cwd(event.pid), &self.resolver);
        self.diagnostics.out_of_tree += classification.out_of_tree;
        self.diagnostics.unresolved_dirfd += classification.unresolved_dirfd;
        if classification.is_empty() {
            return;
        }

        let rule = self
            .processes
            .rule_of(event.pid)
            .and_then(|id| self.rules.get_mut(id));
        let Some(rule) = rule else {
            if event.pid != root {
                self.diagnostics.record_orphan_event(event.pid);
            }
            return;
        };

        for access in classification.accesses {
            match access.kind {
                AccessKind::Dependency => rule.add_dependency(access.path),
                AccessKind::Output => rule.add_output(access.path),
            }
        }
    }

    fn on_anomaly(&mut self, anomaly: Anomaly) -> Result<()> {
        tracing::warn!("Strace output parsing error: {}", anomaly);
        if self.config.strict {
            return Err(TraceError::Strict(anomaly));
        }
        tracing::debug!("tracer output may be incomplete");
        self.diagnostics.record_anomaly(anomaly);
        Ok(())
    }

    /// End of stream: the root must have been found
    pub fn finish(self) -> Result<TraceOutcome> {
        let Some(root_pid) = self.processes.root() else {
            return Err(TraceError::RootNotFound {
                tool: self.config.tool_name,
            });
        };
        tracing::info!("Detected {} build rules in total", self.rules.len());
        Ok(TraceOutcome {
            root_pid,
            rules: self.rules,
            diagnostics: self.diagnostics,
        })
    }
}
