//! Validation Results
//!
//! Collector shared by every validator call within one validation pass.
//! Only error-severity results abort a submission.

use serde::{Deserialize, Serialize};

use super::change_set::EntryId;

/// Severity of a single validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSeverity {
    Error,
    Warning,
    Informational,
}

/// One validation finding against one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Entry the finding applies to
    pub target: EntryId,
    /// Rule identifier, if the validator names its rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Offending property, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    pub message: String,
    pub severity: ValidationSeverity,
}

impl ValidationResult {
    /// Create an error-severity finding
    pub fn error(target: EntryId, message: impl Into<String>) -> Self {
        Self::new(target, ValidationSeverity::Error, message)
    }

    /// Create a warning-severity finding
    pub fn warning(target: EntryId, message: impl Into<String>) -> Self {
        Self::new(target, ValidationSeverity::Warning, message)
    }

    /// Create an informational finding
    pub fn info(target: EntryId, message: impl Into<String>) -> Self {
        Self::new(target, ValidationSeverity::Informational, message)
    }

    fn new(target: EntryId, severity: ValidationSeverity, message: impl Into<String>) -> Self {
        Self {
            target,
            rule: None,
            property: None,
            message: message.into(),
            severity,
        }
    }

    /// Attach a rule identifier
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Attach the offending property name
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == ValidationSeverity::Error
    }
}

/// Ordered collection of validation findings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationResults {
    results: Vec<ValidationResult>,
}

impl ValidationResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: ValidationResult) {
        self.results.push(result);
    }

    /// True when at least one finding has error severity
    pub fn has_errors(&self) -> bool {
        self.results.iter().any(ValidationResult::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_error()).count()
    }

    /// Error-severity findings in the order they were reported
    pub fn errors(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.is_error())
    }

    /// Findings reported against a single entry
    pub fn for_entry(&self, target: EntryId) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(move |r| r.target == target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl IntoIterator for ValidationResults {
    type Item = ValidationResult;
    type IntoIter = std::vec::IntoIter<ValidationResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
