//! Classification of file-touching syscalls into dependencies and outputs

use crate::decoder::TraceEvent;
use crate::path::{dirfd_base, PathResolver, Resolved};
use std::path::Path;

/// Whether a rule consumed or produced a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Dependency,
    Output,
}

/// One build-tree path touched by a syscall
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub kind: AccessKind,
    pub path: String,
}

/// Everything one event contributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub accesses: Vec<Access>,
    /// Paths that resolved outside the build tree
    pub out_of_tree: u64,
    /// Relative paths whose directory fd was unknown
    pub unresolved_dirfd: u64,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }
}

struct Classifier<'a> {
    event: &'a TraceEvent,
    cwd: &'a Path,
    resolver: &'a PathResolver,
    result: Classification,
}

impl Classifier<'_> {
    /// Record the quoted path at `index`, resolved against the cwd
    fn record(&mut self, kind: AccessKind, index: usize) {
        let cwd = self.cwd;
        self.record_from(kind, Some(cwd), index);
    }

    /// Record the quoted path at `index`, resolved against the dirfd at `dirfd_index`
    fn record_at(&mut self, kind: AccessKind, dirfd_index: usize, index: usize) {
        let (event, cwd) = (self.event, self.cwd);
        let base = event
            .arg(dirfd_index)
            .and_then(|token| dirfd_base(token.as_str(), cwd));
        self.record_from(kind, base, index);
    }

    fn record_from(&mut self, kind: AccessKind, base: Option<&Path>, index: usize) {
        let event = self.event;
        let Some(raw) = event.path_arg(index) else {
            return;
        };
        let base = match base {
            Some(base) => base,
            // Absolute paths ignore the dirfd
            None if raw.starts_with('/') => self.cwd,
            None => {
                self.result.unresolved_dirfd += 1;
                return;
            }
        };
        match self.resolver.resolve(base, raw) {
            Resolved::InTree(path) => self.result.accesses.push(Access { kind, path }),
            Resolved::OutOfTree => self.result.out_of_tree += 1,
        }
    }

    /// Classify an `open`-style access from its flags argument
    fn open_kind(&self, flags_index: usize) -> Option<AccessKind> {
        let flags = self.event.arg(flags_index)?;
        let mut read_only = false;
        for flag in flags.flags() {
            match flag {
                // Directory traversal says nothing about file dependencies
                "O_DIRECTORY" => return None,
                "O_RDONLY" => read_only = true,
                _ => {}
            }
        }
        Some(if read_only {
            AccessKind::Dependency
        } else {
            AccessKind::Output
        })
    }
}

/// Classify `event` as seen by a process whose working directory is `cwd`
///
/// Callers must only pass successful events; failed accesses carry no
/// dependency information.
pub fn classify(event: &TraceEvent, cwd: &Path, resolver: &PathResolver) -> Classification {
    use AccessKind::{Dependency, Output};

    let mut c = Classifier {
        event,
        cwd,
        resolver,
        result: Classification::default(),
    };

    match event.syscall.as_str() {
        "open" => {
            if let Some(kind) = c.open_kind(1) {
                c.record(kind, 0);
            }
        }
        "openat" => {
            if let Some(kind) = c.open_kind(2) {
                c.record_at(kind, 0, 1);
            }
        }
        "creat" => c.record(Output, 0),
        "execve" => c.record(Dependency, 0),
        "symlink" => c.record(Output, 1),
        "symlinkat" => c.record_at(Output, 1, 2),
        "rename" | "link" => {
            c.record(Dependency, 0);
            c.record(Output, 1);
        }
        "renameat" | "renameat2" | "linkat" => {
            c.record_at(Dependency, 0, 1);
            c.record_at(Output, 2, 3);
        }
        _ => {}
    }

    c.result
}
