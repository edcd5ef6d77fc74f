//! Error types shared by every recordhooks crate.

use std::fmt;

/// Result alias for synchronous APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The record store failed to execute an operation.
    Storage(StorageError),
    /// Another transaction committed first; the work may be retried.
    Conflict(String),
    /// A behavior or store was configured with invalid options.
    Config(ConfigError),
    /// Transaction misuse (operation on a finished transaction, etc.).
    Transaction(String),
    /// Anything else.
    Custom(String),
}

impl Error {
    /// Whether retrying the whole operation may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

/// Classification of storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// Constraint violation (duplicate key, not-null, ...).
    Constraint,
    /// Table or row missing.
    NotFound,
    /// Transport/driver failure.
    Io,
    /// Failure injected by a test harness.
    Injected,
    /// Unclassified.
    Other,
}

impl StorageErrorKind {
    const fn as_str(self) -> &'static str {
        match self {
            StorageErrorKind::Constraint => "constraint",
            StorageErrorKind::NotFound => "not found",
            StorageErrorKind::Io => "io",
            StorageErrorKind::Injected => "injected",
            StorageErrorKind::Other => "storage",
        }
    }
}

/// Error raised by a record store.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Invalid configuration of a behavior or store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// Name of the offending option.
    pub field: String,
    pub message: String,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Storage(e) => write!(f, "{} error: {}", e.kind.as_str(), e.message),
            Error::Conflict(msg) => write!(f, "Write conflict: {msg}"),
            Error::Config(e) => write!(f, "Invalid configuration for '{}': {}", e.field, e.message),
            Error::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            Error::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

/// Shorthand for a storage error of the given kind.
pub fn storage_error(kind: StorageErrorKind, msg: impl Into<String>) -> Error {
    Error::Storage(StorageError::new(kind, msg))
}

/// Shorthand for a configuration error on `field`.
pub fn config_error(field: impl Into<String>, msg: impl Into<String>) -> Error {
    Error::Config(ConfigError {
        field: field.into(),
        message: msg.into(),
    })
}
