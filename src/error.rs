//! Error types for bindery.

use std::fmt;
use thiserror::Error;

/// The main error type for bindery operations.
#[derive(Debug, Error)]
pub enum BinderyError {
    /// Failed to parse a filter expression.
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// The store could not be reached while constructing a driver.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement failed inside the executor.
    #[error("Statement error: {0}")]
    Statement(#[from] StatementError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BinderyError {
    /// Create a parse error at the given position.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }
}

/// Result type alias for bindery operations.
pub type BinderyResult<T> = Result<T, BinderyError>;

/// Protocol step a statement failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unsupported SQL text.
    Prepare,
    /// Parameter count or type mismatch.
    Bind,
    /// Constraint violation, lost connection, missing capability.
    Execute,
    /// Result shape could not be read back.
    Metadata,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Prepare => "prepare",
            ErrorKind::Bind => "bind",
            ErrorKind::Execute => "execute",
            ErrorKind::Metadata => "metadata",
        };
        f.write_str(name)
    }
}

/// A failed statement: which step failed, the store's message, and the
/// SQL text when the driver is configured to report it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", .sql.as_deref().map(|sql| format!(": {sql}")).unwrap_or_default())]
pub struct StatementError {
    pub kind: ErrorKind,
    pub message: String,
    pub sql: Option<String>,
}

impl StatementError {
    /// Build an error, substituting a generic message when the store gave none.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            format!("{kind} failed")
        } else {
            message
        };
        Self {
            kind,
            message,
            sql: None,
        }
    }

    /// Attach the offending SQL text.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}
