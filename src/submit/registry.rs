//! Capability Registry
//!
//! Collaborator traits and the registry that maps each capability to at
//! most one implementation. Resolved once per submission.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::cancel::CancellationToken;
use super::change_set::EntryId;
use super::context::{SubmitContext, SubmitOutcome};
use super::entry::Entry;
use super::error::SubmitResult;
use super::validation::ValidationResults;

/// Boxed future returned by collaborator calls
pub type HookFuture<'a, T> = Pin<Box<dyn Future<Output = SubmitResult<T>> + Send + 'a>>;

/// Capability tags known to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Preparer,
    Authorizer,
    Validator,
    Filter,
    Executor,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Self::Preparer,
        Self::Authorizer,
        Self::Validator,
        Self::Filter,
        Self::Executor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preparer => "changeset preparer",
            Self::Authorizer => "authorizer",
            Self::Validator => "validator",
            Self::Filter => "pre/post filter",
            Self::Executor => "submit executor",
        }
    }

    /// Whether a submission cannot proceed without this capability
    pub fn is_mandatory(self) -> bool {
        matches!(self, Self::Preparer | Self::Executor)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Populates or finalizes the changeset before validation
///
/// May set `ctx.result` to short-circuit the rest of the pipeline.
pub trait ChangeSetPreparer: Send + Sync {
    fn prepare<'a>(
        &'a self,
        ctx: &'a mut SubmitContext,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()>;
}

/// Decides whether the principal may apply an entry
pub trait ChangeSetAuthorizer: Send + Sync {
    fn authorize<'a>(
        &'a self,
        ctx: &'a SubmitContext,
        entry: &'a Entry,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, bool>;
}

/// Reports validation findings for an entry into a shared collector
pub trait ChangeSetValidator: Send + Sync {
    fn validate<'a>(
        &'a self,
        ctx: &'a SubmitContext,
        entry: &'a Entry,
        results: &'a mut ValidationResults,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()>;
}

/// Hooks fired around persistence
pub trait ChangeSetFilter: Send + Sync {
    /// Called while the entry is `PreEventing`. The hook may mutate the
    /// entry, other entries, or append new entries to `ctx.change_set`.
    fn on_executing<'a>(
        &'a self,
        ctx: &'a mut SubmitContext,
        entry: EntryId,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()>;

    /// Called once per persisted entry, in changeset order. The live
    /// changeset is already empty at this point.
    fn on_executed<'a>(
        &'a self,
        ctx: &'a mut SubmitContext,
        entry: &'a Entry,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()>;
}

/// Persists the changeset
pub trait SubmitExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        ctx: &'a mut SubmitContext,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, SubmitOutcome>;
}

/// At most one implementation per capability
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    preparer: Option<Arc<dyn ChangeSetPreparer>>,
    authorizer: Option<Arc<dyn ChangeSetAuthorizer>>,
    validator: Option<Arc<dyn ChangeSetValidator>>,
    filter: Option<Arc<dyn ChangeSetFilter>>,
    executor: Option<Arc<dyn SubmitExecutor>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the preparer, replacing any previous one
    pub fn with_preparer(mut self, p: impl ChangeSetPreparer + 'static) -> Self {
        self.preparer = Some(Arc::new(p));
        self
    }

    pub fn with_authorizer(mut self, a: impl ChangeSetAuthorizer + 'static) -> Self {
        self.authorizer = Some(Arc::new(a));
        self
    }

    pub fn with_validator(mut self, v: impl ChangeSetValidator + 'static) -> Self {
        self.validator = Some(Arc::new(v));
        self
    }

    pub fn with_filter(mut self, f: impl ChangeSetFilter + 'static) -> Self {
        self.filter = Some(Arc::new(f));
        self
    }

    pub fn with_executor(mut self, e: impl SubmitExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(e));
        self
    }

    pub fn preparer(&self) -> Option<&Arc<dyn ChangeSetPreparer>> {
        self.preparer.as_ref()
    }

    pub fn authorizer(&self) -> Option<&Arc<dyn ChangeSetAuthorizer>> {
        self.authorizer.as_ref()
    }

    pub fn validator(&self) -> Option<&Arc<dyn ChangeSetValidator>> {
        self.validator.as_ref()
    }

    pub fn filter(&self) -> Option<&Arc<dyn ChangeSetFilter>> {
        self.filter.as_ref()
    }

    pub fn executor(&self) -> Option<&Arc<dyn SubmitExecutor>> {
        self.executor.as_ref()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::Preparer => self.preparer.is_some(),
            Capability::Authorizer => self.authorizer.is_some(),
            Capability::Validator => self.validator.is_some(),
            Capability::Filter => self.filter.is_some(),
            Capability::Executor => self.executor.is_some(),
        }
    }

    /// Registered capabilities, in pipeline order
    pub fn registered(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.contains(*c))
            .collect()
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("registered", &self.registered())
            .finish()
    }
}

/// Preparer that accepts the changeset exactly as submitted
pub struct PassthroughPreparer;

impl ChangeSetPreparer for PassthroughPreparer {
    fn prepare<'a>(
        &'a self,
        _ctx: &'a mut SubmitContext,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()> {
        Box::pin(async move { cancel.check() })
    }
}
