//! Error types for sheets-reader
//!
//! This module defines the error taxonomy used throughout the application,
//! using `thiserror` for ergonomic error handling. Every variant maps onto a
//! process exit code, and only transient failures are eligible for retry.

use thiserror::Error;

/// Exit code for a successful run
pub const EXIT_OK: u8 = 0;
/// Exit code for unexpected failures
pub const EXIT_GENERIC: u8 = 1;
/// Exit code for invalid input or configuration
pub const EXIT_CONFIG: u8 = 2;
/// Exit code for rejected credentials or insufficient scope
pub const EXIT_AUTH: u8 = 3;
/// Exit code for communication or data errors
pub const EXIT_DATA: u8 = 4;
/// Exit code when a second interrupt forces watch mode to stop
pub const EXIT_INTERRUPTED: u8 = 130;

/// Main error type for sheets-reader operations
///
/// Configuration and argument problems, credential rejections, data
/// problems with the remote worksheet and transient network failures are
/// kept apart so that commands can pick the right exit code and the watch
/// loop can decide what to retry.
#[derive(Error, Debug)]
pub enum SheetsError {
    /// Bad CLI arguments, filter expressions or environment
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential rejected, unreadable key file or insufficient scope
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Missing spreadsheet or worksheet, malformed response or rows
    #[error("Data error: {0}")]
    Data(String),

    /// Network failure, timeout, quota or server-side error
    #[error("Transient error: {0}")]
    Transient(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SheetsError {
    /// Process exit code for this error
    ///
    /// A transient error that reaches a command boundary has exhausted any
    /// retries, so it is reported like a data error.
    ///
    /// # Examples
    ///
    /// ```
    /// use sheets_reader::error::SheetsError;
    ///
    /// assert_eq!(SheetsError::Config("bad".into()).exit_code(), 2);
    /// assert_eq!(SheetsError::Authentication("denied".into()).exit_code(), 3);
    /// assert_eq!(SheetsError::Transient("timeout".into()).exit_code(), 4);
    /// ```
    pub fn exit_code(&self) -> u8 {
        match self {
            SheetsError::Config(_) => EXIT_CONFIG,
            SheetsError::Authentication(_) => EXIT_AUTH,
            SheetsError::Data(_) | SheetsError::Transient(_) => EXIT_DATA,
            SheetsError::Io(_) | SheetsError::Serialization(_) => EXIT_GENERIC,
        }
    }

    /// Whether the operation that produced this error may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, SheetsError::Transient(_))
    }

    /// Whether this error must stop a long-running watch loop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SheetsError::Authentication(_) | SheetsError::Config(_)
        )
    }
}

/// Result type alias for sheets-reader operations
pub type Result<T> = std::result::Result<T, SheetsError>;
