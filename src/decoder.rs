//! Decoding of logical strace lines into structured events

use crate::joiner::LogicalLine;
use crate::syscalls::{classify_syscall, SyscallClass};
use crate::tokenizer::{tokenize, ArgToken};
use crate::Pid;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Syscall return value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Value(i64),
    /// strace printed `?`: the result is not known
    Pending,
}

impl ReturnCode {
    pub fn is_failure(&self) -> bool {
        matches!(self, ReturnCode::Value(v) if *v < 0)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ReturnCode::Pending)
    }

    pub fn value(&self) -> Option<i64> {
        match self {
            ReturnCode::Value(v) => Some(*v),
            ReturnCode::Pending => None,
        }
    }
}

/// One decoded syscall record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub pid: Pid,
    pub syscall: String,
    pub class: SyscallClass,
    pub args: Vec<ArgToken>,
    pub ret: ReturnCode,
    pub line_number: usize,
}

impl TraceEvent {
    pub fn arg(&self, index: usize) -> Option<&ArgToken> {
        self.args.get(index)
    }

    /// String contents of a quoted argument
    pub fn path_arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(ArgToken::as_quoted)
    }
}

/// Anything the decoder recognizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    Syscall(TraceEvent),
    /// `PID +++ exited with N +++` or `PID +++ killed by SIG +++`
    Exit { pid: Pid, code: Option<i32> },
    /// `PID --- SIGxxx {...} ---`
    Signal { pid: Pid },
}

/// Reason a logical line could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("line does not look like a syscall record")]
    NoMatch,
    #[error("unrecognized syscall '{0}'")]
    UnknownSyscall(String),
    #[error("bad return value '{0}'")]
    BadReturn(String),
    #[error("bad argument list: {0}")]
    BadArguments(String),
}

fn syscall_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<pid>\d+)\s+(?P<op>\w+)\((?P<args>.*)\)\s*=\s*(?P<ret>-?\d+|0x[0-9a-fA-F]+|\?)(?:<.*?>)?(?:\s.*)?$",
        )
        .expect("syscall pattern is valid")
    })
}

fn exit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<pid>\d+)\s+\+\+\+ (?:exited with (?P<code>-?\d+)|killed by \S+.*?) \+\+\+\s*$")
            .expect("exit pattern is valid")
    })
}

fn signal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<pid>\d+)\s+--- .* ---\s*$").expect("signal pattern is valid")
    })
}

fn parse_return(text: &str) -> Result<ReturnCode, DecodeError> {
    if text == "?" {
        return Ok(ReturnCode::Pending);
    }
    let value = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).map(|v| v as i64).ok(),
        None => text.parse::<i64>().ok(),
    };
    value
        .map(ReturnCode::Value)
        .ok_or_else(|| DecodeError::BadReturn(text.to_string()))
}

fn parse_pid(text: &str) -> Result<Pid, DecodeError> {
    text.parse().map_err(|_| DecodeError::NoMatch)
}

/// Decode one logical line
pub fn decode(line: &LogicalLine) -> Result<TraceRecord, DecodeError> {
    let text = line.text.trim();

    if let Some(caps) = syscall_re().captures(text) {
        let name = &caps["op"];
        let class =
            classify_syscall(name).ok_or_else(|| DecodeError::UnknownSyscall(name.to_string()))?;
        let args =
            tokenize(&caps["args"]).map_err(|e| DecodeError::BadArguments(e.to_string()))?;
        return Ok(TraceRecord::Syscall(TraceEvent {
            pid: parse_pid(&caps["pid"])?,
            syscall: name.to_string(),
            class,
            args,
            ret: parse_return(&caps["ret"])?,
            line_number: line.number,
        }));
    }

    if let Some(caps) = exit_re().captures(text) {
        return Ok(TraceRecord::Exit {
            pid: parse_pid(&caps["pid"])?,
            code: caps.name("code").and_then(|c| c.as_str().parse().ok()),
        });
    }

    if let Some(caps) = signal_re().captures(text) {
        return Ok(TraceRecord::Signal {
            pid: parse_pid(&caps["pid"])?,
        });
    }

    Err(DecodeError::NoMatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> LogicalLine {
        LogicalLine {
            number: 1,
            text: text.to_string(),
        }
    }

    fn event(text: &str) -> TraceEvent {
        match decode(&line(text)).unwrap() {
            TraceRecord::Syscall(ev) => ev,
            other => panic!("expected syscall, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_open() {
        let ev = event(r#"20 open("a.c", O_RDONLY) = 3"#);
        assert_eq!(ev.pid, 20);
        assert_eq!(ev.syscall, "open");
        assert_eq!(ev.class, SyscallClass::File);
        assert_eq!(ev.path_arg(0), Some("a.c"));
        assert_eq!(ev.ret, ReturnCode::Value(3));
        assert!(!ev.ret.is_failure());
    }

    #[test]
    fn test_decode_failed_call_with_errno() {
        let ev = event(r#"20 open("missing.h", O_RDONLY) = -1 ENOENT (No such file or directory)"#);
        assert_eq!(ev.ret, ReturnCode::Value(-1));
        assert!(ev.ret.is_failure());
    }

    #[test]
    fn test_decode_execve_with_argv() {
        let ev = event(
            r#"10 execve("/usr/bin/ninja", ["ninja", "-C", "build"], 0x7ffe /* 30 vars */) = 0"#,
        );
        assert_eq!(ev.syscall, "execve");
        assert_eq!(ev.class, SyscallClass::Process);
        assert_eq!(ev.args.len(), 3);
        assert_eq!(ev.path_arg(0), Some("/usr/bin/ninja"));
    }

    #[test]
    fn test_decode_clone_returns_child_pid() {
        let ev = event(
            "10 clone(child_stack=NULL, flags=CLONE_CHILD_CLEARTID|CLONE_CHILD_SETTID|SIGCHLD, child_tidptr=0x7f) = 20",
        );
        assert_eq!(ev.ret.value(), Some(20));
    }

    #[test]
    fn test_decode_clone3_structure() {
        let ev = event("10 clone3({flags=CLONE_VM|CLONE_VFORK, exit_signal=SIGCHLD, stack=0x7f, stack_size=0x9000}, 88) = 21");
        assert_eq!(ev.args.len(), 2);
        assert_eq!(ev.ret.value(), Some(21));
    }

    #[test]
    fn test_decode_pending_return() {
        let ev = event("20 exit_group(0) = ?");
        assert!(ev.ret.is_pending());
        assert_eq!(ev.ret.value(), None);
    }

    #[test]
    fn test_decode_timing_suffix_ignored() {
        let ev = event(r#"20 chdir("sub") = 0 <0.000012>"#);
        assert_eq!(ev.ret, ReturnCode::Value(0));
    }

    #[test]
    fn test_decode_fd_annotated_return() {
        let ev = event(r#"20 openat(AT_FDCWD</src>, "a.c", O_RDONLY) = 3</src/a.c>"#);
        assert_eq!(ev.ret, ReturnCode::Value(3));
        assert_eq!(ev.arg(0).map(|t| t.as_str()), Some("AT_FDCWD</src>"));
        assert_eq!(ev.path_arg(1), Some("a.c"));

        let ev = event(r#"20 openat(5</src/lib>, "b.h", O_RDONLY) = 4</src/lib/b.h> <0.000010>"#);
        assert_eq!(ev.ret, ReturnCode::Value(4));
    }

    #[test]
    fn test_decode_exit_notices() {
        assert_eq!(
            decode(&line("20 +++ exited with 0 +++")).unwrap(),
            TraceRecord::Exit {
                pid: 20,
                code: Some(0)
            }
        );
        assert_eq!(
            decode(&line("21 +++ killed by SIGKILL +++")).unwrap(),
            TraceRecord::Exit { pid: 21, code: None }
        );
        assert_eq!(
            decode(&line("22 --- SIGCHLD {si_signo=SIGCHLD, si_pid=23} ---")).unwrap(),
            TraceRecord::Signal { pid: 22 }
        );
    }

    #[test]
    fn test_unknown_syscall_is_error() {
        assert_eq!(
            decode(&line("20 read(3, \"\"..., 4096) = 10")),
            Err(DecodeError::UnknownSyscall("read".to_string()))
        );
    }

    #[test]
    fn test_garbage_is_no_match() {
        assert_eq!(decode(&line("strace: Process 10 attached")), Err(DecodeError::NoMatch));
        assert_eq!(decode(&line("")), Err(DecodeError::NoMatch));
    }

    #[test]
    fn test_line_number_is_carried() {
        let ev = match decode(&LogicalLine {
            number: 57,
            text: "20 chdir(\"x\") = 0".to_string(),
        })
        .unwrap()
        {
            TraceRecord::Syscall(ev) => ev,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(ev.line_number, 57);
    }
}
