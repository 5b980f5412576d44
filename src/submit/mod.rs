//! # Changeset Submission
//!
//! Orchestrates a batch of data modifications and action invocations
//! through authorization, validation, pre-event hooks, persistence and
//! post-event hooks.
//!
//! ## Design Principles
//!
//! - One explicit state per entry, advanced only by the orchestrator or hooks
//! - Collaborators are looked up by capability, at most one each
//! - Nothing is persisted unless authorization and validation both pass
//! - Hooks may grow the changeset while it is being pre-evented

pub mod audit;
pub mod cancel;
pub mod change_set;
pub mod config;
pub mod context;
pub mod entry;
pub mod error;
pub mod handler;
pub mod policy;
pub mod registry;
pub mod request;
pub mod store;
pub mod validation;

pub use audit::AuditFilter;
pub use cancel::CancellationToken;
pub use change_set::{ChangeSet, EntryId};
pub use config::SubmitConfig;
pub use context::{Principal, SubmitContext, SubmitOutcome};
pub use entry::{
    ActionInvocation, AppliedAction, DataModification, Entry, EntryKind, ModificationKind,
    ProcessingState,
};
pub use error::{SubmitError, SubmitResult};
pub use handler::SubmitHandler;
pub use policy::{PolicyAuthorizer, PolicyConfig, SchemaValidator};
pub use registry::{
    Capability, CapabilityRegistry, ChangeSetAuthorizer, ChangeSetFilter, ChangeSetPreparer,
    ChangeSetValidator, HookFuture, PassthroughPreparer, SubmitExecutor,
};
pub use request::EntryRequest;
pub use store::{ActionHandler, InMemoryStore, StoreExecutor, StorePreparer, KEY_FIELD};
pub use validation::{ValidationResult, ValidationResults, ValidationSeverity};
