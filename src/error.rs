//! Error types for the autodeploy pipeline.
//!
//! Stage contracts encode failure in their result values; this type only
//! travels across internal seams (process runner, oracle, config, report).

use thiserror::Error;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while reading the project or writing files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// The executable for a command is not installed.
    #[error("executable not found: {0}")]
    ToolNotFound(String),

    /// An external process could not be run or waited on.
    #[error("process error: {0}")]
    Process(String),

    /// The advisory oracle failed or returned something unusable.
    #[error("advisor error: {0}")]
    Advisor(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
