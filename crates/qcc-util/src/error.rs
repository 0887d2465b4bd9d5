//! Core error types for the qcc-util crate.

use thiserror::Error;

/// Errors from resolving user-facing configuration names.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Unknown `-std=` spelling.
    #[error("unknown language standard '{0}'")]
    UnknownStandard(String),

    /// Unknown `-arch=` spelling.
    #[error("unknown target architecture '{0}'")]
    UnknownArch(String),

    /// Unknown feature name in an override flag.
    #[error("unknown language feature '{0}'")]
    UnknownFeature(String),
}

/// Errors from source map operations.
#[derive(Debug, Error)]
pub enum SourceMapError {
    /// File not found in the source map.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Invalid span range.
    #[error("invalid span: start {start} > end {end}")]
    InvalidSpan { start: usize, end: usize },
}

/// Result type alias for configuration resolution.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
