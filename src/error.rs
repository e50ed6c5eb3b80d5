use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaggerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unit of work error: {0}")]
    UnitOfWork(#[from] UnitOfWorkError),

    #[error("Logging initialization failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid tracked kind pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitOfWorkError {
    #[error("No unit of work is active for this call")]
    NotActive,

    #[error("Call slot unavailable (borrowed or torn down)")]
    SlotUnavailable,

    #[error("Registration rejected: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, TaggerError>;

/// Diagnostic category attached to errors observed by the interceptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    BadArgument,
    MissingValue,
    Domain,
    Persistence,
    Uncategorized,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 5] = [
        ErrorCategory::BadArgument,
        ErrorCategory::MissingValue,
        ErrorCategory::Domain,
        ErrorCategory::Persistence,
        ErrorCategory::Uncategorized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::BadArgument => "bad-argument",
            ErrorCategory::MissingValue => "missing-value",
            ErrorCategory::Domain => "domain",
            ErrorCategory::Persistence => "persistence",
            ErrorCategory::Uncategorized => "uncategorized",
        }
    }

    /// Failures of the data layer or of unknown origin are reported at error level.
    pub fn is_severe(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Persistence | ErrorCategory::Uncategorized
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies an error for the interceptors' diagnostic line.
///
/// Implement it with an empty body to accept the `Uncategorized` default.
pub trait Categorize {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Uncategorized
    }
}

impl Categorize for io::Error {
    fn category(&self) -> ErrorCategory {
        match self.kind() {
            io::ErrorKind::InvalidInput => ErrorCategory::BadArgument,
            io::ErrorKind::NotFound => ErrorCategory::MissingValue,
            _ => ErrorCategory::Persistence,
        }
    }
}

impl Categorize for std::num::ParseIntError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::BadArgument
    }
}

impl Categorize for std::num::ParseFloatError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::BadArgument
    }
}

impl Categorize for TaggerError {
    fn category(&self) -> ErrorCategory {
        match self {
            TaggerError::Config(_) => ErrorCategory::BadArgument,
            TaggerError::UnitOfWork(_) | TaggerError::Io(_) => ErrorCategory::Persistence,
            TaggerError::Logging(_) => ErrorCategory::Uncategorized,
        }
    }
}

impl Categorize for anyhow::Error {
    fn category(&self) -> ErrorCategory {
        if let Some(err) = self.downcast_ref::<TaggerError>() {
            err.category()
        } else if let Some(err) = self.downcast_ref::<io::Error>() {
            err.category()
        } else if self.downcast_ref::<std::num::ParseIntError>().is_some()
            || self.downcast_ref::<std::num::ParseFloatError>().is_some()
        {
            ErrorCategory::BadArgument
        } else {
            ErrorCategory::Uncategorized
        }
    }
}
