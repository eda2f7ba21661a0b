//! Parser configuration and the optional `depstrace.toml` file
//!
//! # Example depstrace.toml
//!
//! ```toml
//! build_dir = "/home/me/project"
//! tool = "ninja"
//! strict = false
//! outfile = "deps.lst"
//! format = "json"
//! ```

use crate::cli::OutputFormat;
use crate::error::TraceError;
use crate::path::normalize;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Program name whose first successful execve marks the root process
pub const DEFAULT_TOOL: &str = "ninja";

/// Output file used when none is given
pub const DEFAULT_OUTFILE: &str = "deps.lst";

/// Settings threaded into the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Absolute build-tree root; paths outside it are dropped
    pub build_root: PathBuf,
    /// Build tool program name
    pub tool_name: String,
    /// Working directory assumed for processes first seen in the trace
    pub initial_cwd: PathBuf,
    /// Abort on the first parse anomaly instead of collecting it
    pub strict: bool,
}

impl ParserConfig {
    /// Config rooted at `build_root`, which also serves as the initial cwd
    pub fn new(build_root: impl AsRef<Path>) -> Self {
        let build_root = normalize(build_root.as_ref());
        Self {
            initial_cwd: build_root.clone(),
            build_root,
            tool_name: DEFAULT_TOOL.to_string(),
            strict: false,
        }
    }

    /// Config rooted at the current directory
    pub fn from_current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool_name = tool.into();
        self
    }

    pub fn with_initial_cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.initial_cwd = normalize(cwd.as_ref());
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Check the invariants the parser relies on
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.tool_name.trim().is_empty() {
            return Err(TraceError::Config("tool name must not be empty".to_string()));
        }
        if !self.build_root.is_absolute() {
            return Err(TraceError::Config(format!(
                "build root must be absolute: {}",
                self.build_root.display()
            )));
        }
        if !self.initial_cwd.is_absolute() {
            return Err(TraceError::Config(format!(
                "initial cwd must be absolute: {}",
                self.initial_cwd.display()
            )));
        }
        Ok(())
    }
}

/// Make `path` absolute against `base` and normalize it
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    normalize(&base.join(path))
}

/// Contents of a `depstrace.toml` file; every key is optional
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub build_dir: Option<PathBuf>,
    pub initial_cwd: Option<PathBuf>,
    pub tool: Option<String>,
    pub strict: Option<bool>,
    pub outfile: Option<PathBuf>,
    pub format: Option<OutputFormat>,
}

impl ConfigFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to load config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }
}
