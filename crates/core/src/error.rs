//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is raised synchronously at the point of violation. Nothing in
/// the domain layer retries or corrects a failed operation; mapping these to
/// transport responses is the caller's job.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. empty item code, negative quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is not allowed in the aggregate's current status.
    #[error("state violation: {0}")]
    StateViolation(String),

    /// A shared resource is already held by someone else.
    #[error("resource contention: {0}")]
    Contention(String),

    /// An arithmetic result exceeded the representable range.
    #[error("overflow: {0}")]
    Overflow(String),

    /// An aggregate was requested from no data.
    #[error("empty aggregate: {0}")]
    EmptyAggregate(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn state_violation(msg: impl Into<String>) -> Self {
        Self::StateViolation(msg.into())
    }

    pub fn contention(msg: impl Into<String>) -> Self {
        Self::Contention(msg.into())
    }

    pub fn overflow(msg: impl Into<String>) -> Self {
        Self::Overflow(msg.into())
    }

    pub fn empty_aggregate(msg: impl Into<String>) -> Self {
        Self::EmptyAggregate(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
