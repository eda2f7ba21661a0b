//! depstrace - per-rule build dependencies from strace logs
//!
//! This library reads the log produced by running a build under
//! `strace -f -etrace=file,process` and attributes every file the build
//! read or wrote to the build rule (a process subtree spawned by the build
//! tool) responsible for it.
//!
//! ```no_run
//! use depstrace::{DepsParser, ParserConfig};
//!
//! let parser = DepsParser::new(ParserConfig::new("/home/me/project"))?;
//! let outcome = parser.parse_path("build.strace".as_ref())?;
//! for record in outcome.records() {
//!     println!("{}", record.to_text());
//! }
//! # Ok::<(), depstrace::TraceError>(())
//! ```

pub mod classify;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod depmap;
pub mod diagnostics;
pub mod error;
pub mod joiner;
pub mod parser;
pub mod path;
pub mod process_tree;
pub mod report;
pub mod rules;
pub mod syscalls;
pub mod tokenizer;
pub mod tracer;

/// Process id as printed by strace
pub type Pid = u32;

pub use config::ParserConfig;
pub use depmap::{DependencyMap, DependencySource};
pub use diagnostics::{Anomaly, AnomalyKind, Diagnostics};
pub use error::TraceError;
pub use parser::{DepsParser, TraceOutcome};
pub use report::{JsonReport, RuleRecord};
pub use rules::{Rule, RuleId, RuleRegistry};
