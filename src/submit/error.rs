//! Submission Error Types
//!
//! Unified error handling for the changeset submission pipeline.

use thiserror::Error;

use super::registry::Capability;
use super::validation::ValidationResults;

/// Submission result type
pub type SubmitResult<T> = Result<T, SubmitError>;

/// Submission error type
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    /// A mandatory collaborator is missing or an entry is malformed
    #[error("Configuration fault: {0}")]
    Configuration(String),

    /// The authorizer refused an entry
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// One or more entries failed validation
    #[error("Changeset validation failed with {} error(s)", .0.error_count())]
    Validation(ValidationResults),

    /// A targeted resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A concurrency precondition did not hold
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A collaborator failed while doing its work
    #[error("Execution error: {0}")]
    Execution(String),

    /// The changeset grew past the configured limit
    #[error("Changeset exceeds the limit of {limit} entries")]
    TooManyEntries { limit: usize },

    /// Pre-event hooks kept producing pending changes
    #[error("Pre-event processing did not settle after {rounds} rounds")]
    PreEventLimit { rounds: usize },

    /// A collaborator observed cancellation
    #[error("Submission cancelled")]
    Cancelled,
}

impl SubmitError {
    /// Create a configuration fault
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Configuration fault for a mandatory capability with no implementation
    pub fn missing(capability: Capability) -> Self {
        Self::Configuration(format!(
            "no {} registered; it is required to submit a changeset",
            capability.as_str()
        ))
    }

    /// Create an access denied error
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Validation results carried by a validation failure
    pub fn validation_results(&self) -> Option<&ValidationResults> {
        match self {
            Self::Validation(results) => Some(results),
            _ => None,
        }
    }

    /// Get error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "SUBMIT_CONFIGURATION_FAULT",
            Self::AccessDenied(_) => "SUBMIT_ACCESS_DENIED",
            Self::Validation(_) => "SUBMIT_VALIDATION_FAILED",
            Self::NotFound(_) => "SUBMIT_NOT_FOUND",
            Self::Conflict(_) => "SUBMIT_CONFLICT",
            Self::Execution(_) => "SUBMIT_EXECUTION_FAILED",
            Self::TooManyEntries { .. } => "SUBMIT_TOO_MANY_ENTRIES",
            Self::PreEventLimit { .. } => "SUBMIT_PRE_EVENT_LIMIT",
            Self::Cancelled => "SUBMIT_CANCELLED",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration(_) => 500,
            Self::AccessDenied(_) => 403,
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 412,
            Self::Execution(_) => 500,
            Self::TooManyEntries { .. } => 413,
            Self::PreEventLimit { .. } => 500,
            Self::Cancelled => 499,
        }
    }
}

impl From<serde_json::Error> for SubmitError {
    fn from(e: serde_json::Error) -> Self {
        Self::Execution(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::change_set::EntryId;
    use crate::submit::validation::ValidationResult;

    #[test]
    fn test_status_codes() {
        assert_eq!(SubmitError::access_denied("x").status_code(), 403);
        assert_eq!(SubmitError::not_found("x").status_code(), 404);
        assert_eq!(SubmitError::Cancelled.status_code(), 499);
    }

    #[test]
    fn test_missing_capability_is_configuration_fault() {
        let err = SubmitError::missing(Capability::Executor);
        assert_eq!(err.code(), "SUBMIT_CONFIGURATION_FAULT");
        assert!(err.to_string().contains("executor"));
    }

    #[test]
    fn test_validation_display_counts_errors_only() {
        let mut results = ValidationResults::new();
        results.push(ValidationResult::error(EntryId::new(0), "name is required"));
        results.push(ValidationResult::warning(EntryId::new(1), "nothing to update"));

        let err = SubmitError::Validation(results);
        assert_eq!(err.to_string(), "Changeset validation failed with 1 error(s)");
        assert_eq!(err.validation_results().map(|r| r.len()), Some(2));
    }
}
