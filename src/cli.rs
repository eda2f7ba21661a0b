//! CLI argument parsing for depstrace

use clap::{ArgAction, Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Output format for rule records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One dict-style record per line (default)
    #[default]
    Text,
    /// JSON document with records and a run summary
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "depstrace")]
#[command(version)]
#[command(
    about = "Extract per-rule dependencies and outputs of a build from strace logs",
    long_about = None
)]
pub struct Cli {
    /// Write rule records here ("-" for stdout) [default: deps.lst]
    #[arg(short = 'o', long = "outfile", value_name = "FILE")]
    pub outfile: Option<PathBuf>,

    /// Parse a previously captured strace log instead of running a command
    #[arg(short = 'r', long = "from-tracefile", value_name = "FILE")]
    pub from_tracefile: Option<PathBuf>,

    /// Build-tree root; paths outside it are ignored [default: current directory]
    #[arg(short = 'C', long = "build-dir", value_name = "DIR")]
    pub build_dir: Option<PathBuf>,

    /// Program name whose execve marks the build tool [default: ninja]
    #[arg(long = "tool", value_name = "NAME")]
    pub tool: Option<String>,

    /// Output format
    #[arg(long = "format", value_enum)]
    pub format: Option<OutputFormat>,

    /// Abort on the first unparseable or inconsistent trace line
    #[arg(long = "strict")]
    pub strict: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Keep a copy of the raw strace log when tracing a command
    #[arg(long = "save-trace", value_name = "FILE", conflicts_with = "from_tracefile")]
    pub save_trace: Option<PathBuf>,

    /// Load defaults from a TOML config file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Build command to trace (e.g., -- ninja -C out)
    #[arg(last = true)]
    pub command: Option<Vec<String>>,
}
