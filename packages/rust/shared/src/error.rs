//! Error types for SheetGrader.
//!
//! Library crates use [`SheetGraderError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Per-student grading problems are deliberately NOT errors: they are
//! recorded on the submission and the run continues. This enum covers the
//! cases that reject a request up front or abort a run.

use std::path::PathBuf;

/// Top-level error type for all SheetGrader operations.
#[derive(Debug, thiserror::Error)]
pub enum SheetGraderError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Bad run request, unknown assignment type, or concurrent-run conflict.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Submission archive is unreadable or corrupt.
    #[error("archive error: {0}")]
    Archive(String),

    /// Workbook container could not be parsed or serialized.
    #[error("workbook error at {path:?}: {message}")]
    Workbook { path: PathBuf, message: String },

    /// External lookup transport failure (after retries are exhausted).
    #[error("lookup error: {0}")]
    Lookup(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SheetGraderError>;

impl SheetGraderError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a workbook parse/serialize failure with the file it came from.
    pub fn workbook(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Workbook {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
