//! Reassembly of interrupted strace records
//!
//! When `strace -f` observes several processes at once it splits a
//! syscall into a `<unfinished ...>` line and a later `<... NAME resumed>`
//! line. [`LineJoiner`] stitches those halves back together so every
//! item it yields is one complete syscall record.

use crate::diagnostics::{Anomaly, AnomalyKind};
use crate::Pid;
use regex::Regex;
use std::collections::BTreeMap;
use std::io;
use std::sync::OnceLock;

/// One complete syscall record, possibly assembled from two raw lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Raw line number (1-based) on which the record completed
    pub number: usize,
    pub text: String,
}

/// Item produced by the joiner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Joined {
    Line(LogicalLine),
    Anomaly(Anomaly),
}

struct Pending {
    syscall: String,
    body: String,
    line_number: usize,
}

fn unfinished_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<body>(?P<pid>\d+)\s+(?P<op>\w+)?.*?)\s*<unfinished \.\.\.>\s*$")
            .expect("unfinished pattern is valid")
    })
}

fn resumed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<pid>\d+)\s+<\.\.\. (?P<op>\S+) resumed>(?P<body>.*?)\s*$")
            .expect("resumed pattern is valid")
    })
}

fn with_pid<'a>(re: &Regex, line: &'a str) -> Option<(Pid, regex::Captures<'a>)> {
    let caps = re.captures(line)?;
    let pid = caps["pid"].parse().ok()?;
    Some((pid, caps))
}

/// Iterator adapter turning raw trace lines into logical lines
///
/// Read errors from the underlying stream are passed through unchanged.
/// Pairing problems are yielded as [`Joined::Anomaly`] items and the
/// caller decides whether they are fatal.
pub struct LineJoiner<I> {
    lines: I,
    line_number: usize,
    pending: BTreeMap<Pid, Pending>,
    leftovers: Vec<Anomaly>,
    exhausted: bool,
}

impl<I> LineJoiner<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            line_number: 0,
            pending: BTreeMap::new(),
            leftovers: Vec::new(),
            exhausted: false,
        }
    }

    /// Number of raw lines consumed so far
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Handle one raw line; `None` means it was buffered
    fn join(&mut self, raw: &str) -> Option<Joined> {
        let line = raw.trim_end_matches(['\n', '\r']);
        let number = self.line_number;

        if let Some((pid, caps)) = with_pid(unfinished_re(), line) {
            let fragment = Pending {
                syscall: caps.name("op").map_or("", |m| m.as_str()).to_string(),
                body: caps["body"].to_string(),
                line_number: number,
            };
            // The newer fragment replaces the stale one
            if self.pending.insert(pid, fragment).is_some() {
                return Some(Joined::Anomaly(Anomaly {
                    line_number: number,
                    kind: AnomalyKind::UnexpectedUnfinished { pid },
                    line: line.to_string(),
                }));
            }
            return None;
        }

        if let Some((pid, caps)) = with_pid(resumed_re(), line) {
            let Some(pending) = self.pending.remove(&pid) else {
                return Some(Joined::Anomaly(Anomaly {
                    line_number: number,
                    kind: AnomalyKind::UnexpectedResumed { pid },
                    line: line.to_string(),
                }));
            };
            let resumed = &caps["op"];
            if !pending.syscall.is_empty() && pending.syscall != resumed {
                return Some(Joined::Anomaly(Anomaly {
                    line_number: number,
                    kind: AnomalyKind::ResumedMismatch {
                        pid,
                        pending: pending.syscall,
                        resumed: resumed.to_string(),
                    },
                    line: line.to_string(),
                }));
            }
            return Some(Joined::Line(LogicalLine {
                number,
                text: format!("{}{}", pending.body, &caps["body"]),
            }));
        }

        Some(Joined::Line(LogicalLine {
            number,
            text: line.to_string(),
        }))
    }

    fn drain_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        // Reverse so that pop() yields ascending pids
        self.leftovers = pending
            .into_iter()
            .rev()
            .map(|(pid, fragment)| Anomaly {
                line_number: fragment.line_number,
                kind: AnomalyKind::PendingAtEof { pid },
                line: fragment.body,
            })
            .collect();
    }
}

impl<I> Iterator for LineJoiner<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    type Item = io::Result<Joined>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted {
            match self.lines.next() {
                Some(Ok(raw)) => {
                    self.line_number += 1;
                    if let Some(joined) = self.join(&raw) {
                        return Some(Ok(joined));
                    }
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.exhausted = true;
                    self.drain_pending();
                }
            }
        }
        self.leftovers.pop().map(|a| Ok(Joined::Anomaly(a)))
    }
}
