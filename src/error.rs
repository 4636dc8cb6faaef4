//! Error types for the settings engine

use thiserror::Error;

use crate::limits::LimitViolation;
use crate::settings::snapshot::SubResource;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the settings engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Local validation, raised before any network call
    #[error("Validation failed: {}", join_violations(.0))]
    Validation(Vec<LimitViolation>),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    // Controller state errors
    #[error("No configuration loaded")]
    NotLoaded,

    #[error("Nothing to save for {0}")]
    NotDirty(SubResource),

    #[error("Save already in progress for {0}")]
    SaveInProgress(SubResource),

    #[error("Response for a brand that is no longer selected was discarded")]
    StaleBrand,

    // Backend errors
    #[error("Rejected by backend: {0}")]
    RemoteRejection(String),

    #[error("Backend unreachable: {0}")]
    Transport(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

fn join_violations(violations: &[LimitViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this error was raised locally, without contacting the backend
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::InvalidValue(_)
                | Error::NotLoaded
                | Error::NotDirty(_)
                | Error::SaveInProgress(_)
        )
    }

    /// Violations carried by a validation error
    pub fn violations(&self) -> &[LimitViolation] {
        match self {
            Error::Validation(violations) => violations,
            _ => &[],
        }
    }
}

impl From<LimitViolation> for Error {
    fn from(v: LimitViolation) -> Self {
        Error::Validation(vec![v])
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
