//! Error handling for the deimos batch runner
//!
//! Per-task failures are never surfaced through this type: they are captured
//! as `Outcome` values so a single bad task cannot abort the pool. `RunError`
//! covers the non-recoverable cases only, i.e. the run could not be set up
//! or its report could not be written.

use thiserror::Error;

/// Main error type for batch run operations
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Input error: {0}")]
    InputError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Output error: {0}")]
    OutputError(String),
}
