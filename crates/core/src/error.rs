//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure a caller can observe maps onto one of these kinds. Business
/// failures (`InsufficientInventory`, `NotFound`, `Forbidden`, `Validation`)
/// are recoverable at the request boundary; `Storage` is fatal for the
/// operation that hit it and always leaves state untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, zero delta).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested part, plane or stock row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation would drive a count negative or a recipe is unmet.
    #[error("insufficient inventory: {0}")]
    InsufficientInventory(String),

    /// Missing or invalid caller credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Valid caller, but the target resource is outside their scope.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The request collides with existing state (e.g. a taken username).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unrecoverable storage failure (poisoned lock, failed write).
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientInventory(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::NotFound(_) => "not_found",
            DomainError::InsufficientInventory(_) => "insufficient_inventory",
            DomainError::Unauthorized => "unauthorized",
            DomainError::Forbidden(_) => "forbidden",
            DomainError::Conflict(_) => "conflict",
            DomainError::Storage(_) => "storage_failure",
        }
    }
}
