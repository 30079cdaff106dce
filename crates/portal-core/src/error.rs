use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out: {0}")]
    Timeout(String),
    #[error("cache serialization failed: {0}")]
    Serialization(String),
    #[error("cache value is invalid: {0}")]
    InvalidData(String),
    #[error("cache initialization failed: {0}")]
    Initialization(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short code already exists: {0}")]
    Conflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    /// The transaction was aborted by the store to preserve isolation and
    /// may succeed if run again from the start.
    #[error("transaction serialization failure: {0}")]
    SerializationFailure(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    #[error("short code length must be at least 1, got {0}")]
    InvalidLength(usize),
    #[error("secure random source failed: {0}")]
    Entropy(String),
}

/// A single failed constraint on an input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub constraint: &'static str,
}

impl Display for FieldViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: violation in constraint '{}'",
            self.field, self.constraint
        )
    }
}

/// Malformed caller input, with one entry per violated constraint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    pub fn single(field: &'static str, constraint: &'static str) -> Self {
        Self::new(vec![FieldViolation { field, constraint }])
    }

    pub fn push(&mut self, field: &'static str, constraint: &'static str) {
        self.violations.push(FieldViolation { field, constraint });
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns `Err(self)` when at least one violation was collected.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Errors surfaced by the allocation and resolution services.
///
/// Only [`Validation`](ServiceError::Validation), [`Conflict`](ServiceError::Conflict)
/// and [`NotFound`](ServiceError::NotFound) are meant to reach a client verbatim.
/// Everything else is an infrastructure fault and must be reported opaquely,
/// see [`ServiceError::public_message`].
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(StorageError),
    #[error("code generation failed: {0}")]
    Generator(#[from] GeneratorError),
}

impl ServiceError {
    /// Whether the error is caused by the caller (a 4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Validation(_) | ServiceError::Conflict(_) | ServiceError::NotFound(_)
        )
    }

    /// Message safe to hand to a client.
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            "internal server error".to_string()
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Conflict(code) => {
                ServiceError::Conflict(format!("short code already exists: {code}"))
            }
            other => ServiceError::Storage(other),
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidShortCode(_) => {
                ServiceError::Validation(ValidationError::single("short_code", "format"))
            }
        }
    }
}
