//! Non-fatal parse diagnostics and per-syscall counters
//!
//! Everything the parser tolerates (unmatched lines, broken
//! unfinished/resumed pairs, events from processes without a rule) is
//! collected here and summarized once the trace stream is exhausted.

use crate::Pid;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of a recoverable parse anomaly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Logical line matched no recognized syscall record
    UnmatchedLine,
    /// Second `<unfinished ...>` for a pid that already had one pending
    UnexpectedUnfinished { pid: Pid },
    /// `<... resumed>` for a pid with nothing pending
    UnexpectedResumed { pid: Pid },
    /// Resumed syscall name differs from the pending fragment's syscall
    ResumedMismatch {
        pid: Pid,
        pending: String,
        resumed: String,
    },
    /// Unfinished fragment still pending when the stream ended
    PendingAtEof { pid: Pid },
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::UnmatchedLine => write!(f, "unmatched strace output line"),
            AnomalyKind::UnexpectedUnfinished { pid } => {
                write!(f, "unexpected unfinished syscall for pid {}", pid)
            }
            AnomalyKind::UnexpectedResumed { pid } => {
                write!(f, "unexpected resumed syscall for pid {}", pid)
            }
            AnomalyKind::ResumedMismatch {
                pid,
                pending,
                resumed,
            } => write!(
                f,
                "pid {} resumed '{}' while '{}' was pending",
                pid, resumed, pending
            ),
            AnomalyKind::PendingAtEof { pid } => {
                write!(f, "interrupted syscall for pid {} never resumed", pid)
            }
        }
    }
}

/// A recoverable problem found at a specific trace line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub line_number: usize,
    #[serde(flatten)]
    pub kind: AnomalyKind,
    pub line: String,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @line {}: {:?}", self.kind, self.line_number, self.line)
    }
}

/// Counters for one syscall name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyscallCounts {
    /// Number of decoded records
    pub count: u64,
    /// Records with a negative return value
    pub failed: u64,
    /// Records whose return value was `?`
    pub pending: u64,
}

/// Diagnostics accumulated over one parse run
#[derive(Debug, Default, Clone, Serialize)]
pub struct Diagnostics {
    /// Every anomaly that was tolerated (non-strict mode)
    pub anomalies: Vec<Anomaly>,
    /// Per-syscall record counts
    pub syscalls: BTreeMap<String, SyscallCounts>,
    /// File-touching events dropped because their pid had no rule
    pub orphan_events: BTreeMap<Pid, u64>,
    /// Forks whose non-root parent had no rule
    pub orphan_forks: u64,
    /// Paths dropped because they resolved outside the build tree
    pub out_of_tree: u64,
    /// Relative `*at` paths whose directory fd could not be resolved
    pub unresolved_dirfd: u64,
    /// Total logical lines seen
    pub logical_lines: u64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_anomaly(&mut self, anomaly: Anomaly) {
        self.anomalies.push(anomaly);
    }

    /// Record one decoded syscall and its return disposition
    pub fn record_syscall(&mut self, name: &str, failed: bool, pending: bool) {
        let entry = self.syscalls.entry(name.to_string()).or_default();
        entry.count += 1;
        if failed {
            entry.failed += 1;
        }
        if pending {
            entry.pending += 1;
        }
    }

    pub fn record_orphan_event(&mut self, pid: Pid) {
        *self.orphan_events.entry(pid).or_insert(0) += 1;
    }

    /// Lines that matched no syscall record, in trace order
    pub fn unmatched_lines(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies
            .iter()
            .filter(|a| a.kind == AnomalyKind::UnmatchedLine)
    }

    pub fn total_syscalls(&self) -> u64 {
        self.syscalls.values().map(|c| c.count).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.syscalls.values().map(|c| c.failed).sum()
    }

    pub fn total_orphan_events(&self) -> u64 {
        self.orphan_events.values().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }

    /// Log the end-of-run summary
    pub fn log_summary(&self) {
        let unmatched: Vec<&Anomaly> = self.unmatched_lines().collect();
        if !unmatched.is_empty() {
            tracing::warn!(
                "Summary of all unmatched lines ({}), probably strace bugs, consider upgrading strace:",
                unmatched.len()
            );
            for anomaly in &unmatched {
                tracing::warn!("  unmatched @line {}: {:?}", anomaly.line_number, anomaly.line);
            }
        }

        for anomaly in self
            .anomalies
            .iter()
            .filter(|a| a.kind != AnomalyKind::UnmatchedLine)
        {
            tracing::warn!("  {}", anomaly);
        }

        if !self.orphan_events.is_empty() {
            tracing::warn!(
                "{} file events from {} processes without a rule were dropped",
                self.total_orphan_events(),
                self.orphan_events.len()
            );
            for (pid, count) in &self.orphan_events {
                tracing::debug!("  pid {}: {} events", pid, count);
            }
        }
        if self.orphan_forks > 0 {
            tracing::warn!("{} forks from untracked parents", self.orphan_forks);
        }
        if self.unresolved_dirfd > 0 {
            tracing::warn!(
                "{} relative paths with an unknown directory fd were dropped",
                self.unresolved_dirfd
            );
        }

        tracing::info!(
            "{} logical lines, {} syscalls ({} failed), {} paths outside the build tree",
            self.logical_lines,
            self.total_syscalls(),
            self.total_failed(),
            self.out_of_tree
        );
    }
}
