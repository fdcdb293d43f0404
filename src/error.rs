//! Classified Error Types
//!
//! Every error raised at a crate boundary carries a kind and an HTTP-style
//! status class (400 client / 500 server). Absence is never an error: reads
//! of missing addresses return `Ok(None)` and iterators end with `None`.

use std::io;
use thiserror::Error;

/// Classification attached to every crate error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced value does not exist where one was required
    NotFound,
    /// Address string failed to parse or points outside the address space
    InvalidAddress,
    /// Configuration rejected at startup
    InvalidConfiguration,
    /// Stored bytes failed verification against their digest
    Integrity,
    /// A literal could not be coerced to the target column type
    Coercion,
    /// The backend does not implement the requested capability
    Unsupported,
    /// Underlying I/O failure
    IoError,
    /// Operation attempted on a closed connection
    Closed,
}

impl ErrorKind {
    /// HTTP-style status class: 400 for caller mistakes, 500 for substrate
    /// failures.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::NotFound
            | ErrorKind::InvalidAddress
            | ErrorKind::InvalidConfiguration
            | ErrorKind::Coercion
            | ErrorKind::Unsupported
            | ErrorKind::Closed => 400,
            ErrorKind::Integrity | ErrorKind::IoError => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::InvalidAddress => "invalid-address",
            ErrorKind::InvalidConfiguration => "invalid-configuration",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Coercion => "coercion",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::IoError => "io-error",
            ErrorKind::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Crate-wide error type.
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error { kind, message: message.into(), source: None }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error { kind, message: message.into(), source: Some(Box::new(source)) }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_address(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidAddress, message)
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidConfiguration, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Integrity, message)
    }

    pub fn coercion(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Coercion, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Unsupported, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::IoError, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Closed, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Status class of the carried kind.
    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    /// Kind-and-message copy without the source chain. Used where one failure
    /// must be delivered to several waiters (shared cache loads).
    pub fn replicate(&self) -> Self {
        Error { kind: self.kind, message: self.message.clone(), source: None }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::IoError,
            _ => ErrorKind::IoError,
        };
        Error { kind, message: err.to_string(), source: Some(Box::new(err)) }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::IoError, format!("JSON error: {err}"), err)
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(err: arrow::error::ArrowError) -> Self {
        Error::with_source(ErrorKind::IoError, format!("Arrow error: {err}"), err)
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(err: parquet::errors::ParquetError) -> Self {
        Error::with_source(ErrorKind::IoError, format!("Parquet error: {err}"), err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::with_source(ErrorKind::IoError, format!("HTTP error: {err}"), err)
    }
}

/// Result type for crate operations
pub type Result<T> = std::result::Result<T, Error>;
