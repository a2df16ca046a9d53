//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone)]
pub enum DomainError {
    /// A duration string could not be parsed
    #[error("Invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    /// A duration outside the supported range was requested
    #[error("Duration out of range: {seconds}s (must be between 1s and 24h)")]
    DurationOutOfRange { seconds: u64 },

    /// An option name did not match any keep-awake flag
    #[error("Unknown option: {0}")]
    UnknownOption(String),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
