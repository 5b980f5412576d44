//! Observability for the submission pipeline
//!
//! - Structured logging (JSON, one line per event)
//! - Monotonic submission counters
//! - Begin/complete scopes around each submission
//!
//! Observability is read-only: a failed log write never changes the
//! outcome of a submission.
//!
//! # Usage
//!
//! ```ignore
//! use changeset_pipeline::observability::{Logger, ObservationScope, SubmitMetrics};
//!
//! Logger::info("SUBMIT_SHORT_CIRCUIT", &[("phase", "prepare")]);
//!
//! let scope = ObservationScope::new("SUBMIT");
//! // ... submit ...
//! scope.complete(&[("entries", "2")]);
//! ```

mod logger;
mod metrics;
mod scope;

pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, SubmitMetrics};
pub use scope::ObservationScope;
