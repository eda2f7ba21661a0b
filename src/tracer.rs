//! Trace mode: run a build under strace and parse its log live
//!
//! strace writes into a FIFO inside a private temporary directory so the
//! log is consumed as it is produced and never lands on disk unless
//! `--save-trace` asks for a copy.

use crate::config::ParserConfig;
use crate::error::TraceError;
use crate::parser::{DepsParser, TraceOutcome};
use anyhow::{Context, Result};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

/// strace options: follow forks, compact alignment, no string payloads,
/// only file and process syscalls, no signal lines
pub const STRACE_ARGS: &[&str] = &["-f", "-a1", "-s0", "-etrace=file,process", "-esignal=none"];

/// Parsed trace plus the traced command's exit status
#[derive(Debug)]
pub struct TraceRun {
    pub outcome: TraceOutcome,
    pub status: ExitStatus,
}

/// Verify that strace exists and can trace with the options we rely on
pub fn check_strace() -> Result<(), TraceError> {
    let status = Command::new("strace")
        .args(["-o/dev/null", "-etrace=file,process", "true"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| TraceError::StraceUnavailable(format!("cannot run strace: {}", e)))?;

    if !status.success() {
        return Err(TraceError::StraceUnavailable(format!(
            "test run of `strace true` exited with {}",
            status
        )));
    }
    Ok(())
}

/// Build the strace invocation writing to `log` and running `command`
pub fn strace_command(log: &Path, command: &[String]) -> Command {
    let mut output = OsString::from("-o");
    output.push(log);

    let mut cmd = Command::new("strace");
    cmd.arg(output).args(STRACE_ARGS).args(command);
    cmd
}

/// Trace `command` and attribute its file accesses to build rules
///
/// When `save_trace` is set every raw line read from strace is also copied
/// there.
pub fn trace_command(
    command: &[String],
    config: ParserConfig,
    save_trace: Option<&Path>,
) -> Result<TraceRun> {
    if command.is_empty() {
        anyhow::bail!("Command array is empty");
    }

    check_strace()?;
    let parser = DepsParser::new(config)?;

    let fifo_dir = tempfile::Builder::new()
        .prefix("depstrace")
        .tempdir()
        .context("Failed to create temporary directory")?;
    let fifo = fifo_dir.path().join("strace.fifo");
    mkfifo(fifo.as_path(), Mode::S_IRUSR | Mode::S_IWUSR)
        .with_context(|| format!("Failed to create FIFO {}", fifo.display()))?;

    let mut save = match save_trace {
        Some(path) => Some(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => None,
    };

    let mut child = strace_command(&fifo, command)
        .spawn()
        .context("Failed to spawn strace")?;
    tracing::info!("tracing {:?} (strace pid {})", command, child.id());

    // Blocks until strace opens its end
    let log = File::open(&fifo)
        .with_context(|| format!("Failed to open FIFO {}", fifo.display()))?;

    let lines = BufReader::new(log).lines().map(|line| -> io::Result<String> {
        if let (Ok(text), Some(out)) = (&line, save.as_mut()) {
            writeln!(out, "{}", text)?;
        }
        line
    });
    // The FIFO reader is dropped here, so strace cannot block on a full pipe
    let parsed = parser.parse_lines(lines);

    let status = child.wait().context("Failed to wait for strace")?;
    if let Some(mut out) = save {
        out.flush().context("Failed to write raw trace copy")?;
    }
    tracing::debug!("strace finished with {}", status);

    Ok(TraceRun {
        outcome: parsed?,
        status,
    })
}
