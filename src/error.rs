//! Error types for the trace parser

use crate::diagnostics::Anomaly;
use thiserror::Error;

/// Errors that abort a parse run
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// First anomaly seen while running in strict mode
    #[error("terminating due to a parsing error in strict mode: {0}")]
    Strict(Anomaly),

    #[error("{tool} process invocation could not be detected in the trace")]
    RootNotFound { tool: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("strace is missing or incompatible: {0}")]
    StraceUnavailable(String),
}

pub type Result<T> = std::result::Result<T, TraceError>;
