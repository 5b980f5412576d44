//! Submission Orchestrator
//!
//! Drives a changeset through:
//! prepare → snapshot → validate → pre-event → persist → clear → post-event
//!
//! Any phase may find `ctx.result` populated, in which case the remaining
//! phases are skipped and that result is returned.

use std::sync::Arc;

use crate::observability::{Logger, ObservationScope, SubmitMetrics};

use super::cancel::CancellationToken;
use super::change_set::EntryId;
use super::config::SubmitConfig;
use super::context::{SubmitContext, SubmitOutcome};
use super::entry::{Entry, EntryKind, ModificationKind, ProcessingState};
use super::error::{SubmitError, SubmitResult};
use super::registry::{
    Capability, CapabilityRegistry, ChangeSetAuthorizer, ChangeSetFilter, ChangeSetPreparer,
    ChangeSetValidator, SubmitExecutor,
};
use super::validation::ValidationResults;

/// Collaborators resolved from the registry once per submission
struct Collaborators {
    preparer: Option<Arc<dyn ChangeSetPreparer>>,
    authorizer: Option<Arc<dyn ChangeSetAuthorizer>>,
    validator: Option<Arc<dyn ChangeSetValidator>>,
    filter: Option<Arc<dyn ChangeSetFilter>>,
    executor: Option<Arc<dyn SubmitExecutor>>,
}

impl Collaborators {
    fn resolve(registry: &CapabilityRegistry) -> Self {
        Self {
            preparer: registry.preparer().cloned(),
            authorizer: registry.authorizer().cloned(),
            validator: registry.validator().cloned(),
            filter: registry.filter().cloned(),
            executor: registry.executor().cloned(),
        }
    }
}

/// The submission orchestrator
pub struct SubmitHandler {
    config: SubmitConfig,
    metrics: Arc<SubmitMetrics>,
}

impl SubmitHandler {
    pub fn new(config: SubmitConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(SubmitMetrics::new()),
        }
    }

    /// Share a metrics registry with other handlers
    pub fn with_metrics(mut self, metrics: Arc<SubmitMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &SubmitConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<SubmitMetrics> {
        &self.metrics
    }

    /// Submit the context's changeset
    ///
    /// Fails with the first collaborator failure, or with a configuration
    /// fault when the preparer or executor is missing.
    pub async fn submit(
        &self,
        ctx: &mut SubmitContext,
        cancel: &CancellationToken,
    ) -> SubmitResult<SubmitOutcome> {
        self.metrics.increment_started();
        let scope = ObservationScope::with_fields(
            "SUBMIT",
            vec![("submission_id", ctx.submission_id.to_string())],
        );
        let collaborators = Collaborators::resolve(ctx.registry());

        match self.run(ctx, &collaborators, cancel).await {
            Ok(outcome) => {
                self.metrics.increment_completed();
                scope.complete(&[]);
                Ok(outcome)
            }
            Err(err) => {
                match &err {
                    SubmitError::AccessDenied(_) => self.metrics.increment_denied(),
                    SubmitError::Validation(_) => self.metrics.increment_invalid(),
                    _ => self.metrics.increment_failed(),
                }
                scope.fail(err.code(), &err.to_string());
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        ctx: &mut SubmitContext,
        c: &Collaborators,
        cancel: &CancellationToken,
    ) -> SubmitResult<SubmitOutcome> {
        let preparer = c
            .preparer
            .as_ref()
            .ok_or_else(|| SubmitError::missing(Capability::Preparer))?;
        preparer.prepare(ctx, cancel).await?;
        if let Some(outcome) = self.short_circuit(ctx, "prepare") {
            return Ok(outcome);
        }
        self.check_size(ctx)?;

        // entries appended later are validated by the pre-event phase
        let snapshot: Vec<EntryId> = ctx.change_set.ids().collect();

        self.validate(ctx, c, &snapshot, cancel).await?;
        if let Some(outcome) = self.short_circuit(ctx, "validate") {
            return Ok(outcome);
        }

        self.pre_event(ctx, c, cancel).await?;
        if let Some(outcome) = self.short_circuit(ctx, "pre_event") {
            return Ok(outcome);
        }

        self.persist(ctx, c, cancel).await?;

        let persisted = ctx.change_set.clear();

        self.post_event(ctx, c, &persisted, cancel).await?;

        ctx.result
            .clone()
            .ok_or_else(|| SubmitError::execution("executor completed without a result"))
    }

    /// Authorize and validate every entry in `ids` that still needs it,
    /// then advance those entries past validation
    async fn validate(
        &self,
        ctx: &mut SubmitContext,
        c: &Collaborators,
        ids: &[EntryId],
        cancel: &CancellationToken,
    ) -> SubmitResult<()> {
        self.phase(ctx, "validate", ids.len());

        for &id in ids {
            if let Some(m) = ctx.change_set[id].as_modification() {
                m.kind()?;
            }
        }

        let pending: Vec<EntryId> = ids
            .iter()
            .copied()
            .filter(|id| ctx.change_set[*id].state().needs_validation())
            .collect();

        if let Some(authorizer) = &c.authorizer {
            for &id in &pending {
                let entry = &ctx.change_set[id];
                if !authorizer.authorize(ctx, entry, cancel).await? {
                    return Err(denial(entry));
                }
            }
        }

        if let Some(validator) = &c.validator {
            let mut results = ValidationResults::new();
            for &id in &pending {
                validator
                    .validate(ctx, &ctx.change_set[id], &mut results, cancel)
                    .await?;
            }
            if results.has_errors() {
                return Err(SubmitError::Validation(results));
            }
            if !results.is_empty() {
                let findings = results.len().to_string();
                Logger::warn(
                    "SUBMIT_VALIDATION_WARNINGS",
                    &[
                        ("submission_id", &ctx.submission_id.to_string()),
                        ("findings", &findings),
                    ],
                );
            }
        }

        for &id in ids {
            let entry = &mut ctx.change_set[id];
            match entry.state() {
                ProcessingState::ChangedWithinOwnPreEventing | ProcessingState::Changed => {
                    self.transition(entry, ProcessingState::PreEvented)
                }
                state if state.needs_validation() => {
                    self.transition(entry, ProcessingState::Validated)
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Fire the executing hook for every validated entry of the live,
    /// possibly growing changeset. Entries appended by hooks go through
    /// another validation pass and are walked again; entries mutated after
    /// their own pre-event are folded back to `PreEvented` by that pass.
    async fn pre_event(
        &self,
        ctx: &mut SubmitContext,
        c: &Collaborators,
        cancel: &CancellationToken,
    ) -> SubmitResult<()> {
        for _ in 0..self.config.max_pre_event_rounds {
            self.phase(ctx, "pre_event", ctx.change_set.len());

            let mut cursor = 0;
            while cursor < ctx.change_set.len() {
                let id = EntryId::new(cursor);
                cursor += 1;
                if ctx.change_set[id].state() != ProcessingState::Validated {
                    continue;
                }

                self.transition(&mut ctx.change_set[id], ProcessingState::PreEventing);
                if let Some(filter) = &c.filter {
                    filter.on_executing(ctx, id, cancel).await?;
                    self.metrics.increment_pre_events();
                    self.check_size(ctx)?;
                    if ctx.is_short_circuited() {
                        return Ok(());
                    }
                }

                let entry = &mut ctx.change_set[id];
                match entry.state() {
                    ProcessingState::PreEventing => {
                        self.transition(entry, ProcessingState::PreEvented)
                    }
                    ProcessingState::Changed => {
                        self.transition(entry, ProcessingState::ChangedWithinOwnPreEventing)
                    }
                    _ => {}
                }
            }

            // entries touched after their own pre-event already ran
            for entry in ctx.change_set.iter_mut() {
                if entry.state() == ProcessingState::Changed {
                    self.transition(entry, ProcessingState::ChangedWithinOwnPreEventing);
                }
            }

            let pending: Vec<EntryId> = ctx
                .change_set
                .iter()
                .filter(|e| e.state().has_pending_change())
                .map(Entry::id)
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            self.validate(ctx, c, &pending, cancel).await?;
        }

        Err(SubmitError::PreEventLimit {
            rounds: self.config.max_pre_event_rounds,
        })
    }

    async fn persist(
        &self,
        ctx: &mut SubmitContext,
        c: &Collaborators,
        cancel: &CancellationToken,
    ) -> SubmitResult<()> {
        self.phase(ctx, "persist", ctx.change_set.len());

        for entry in ctx.change_set.iter_mut() {
            if let Some(m) = entry.as_modification_mut() {
                m.record_applied_action()?;
            }
        }

        let executor = c
            .executor
            .as_ref()
            .ok_or_else(|| SubmitError::missing(Capability::Executor))?;
        let outcome = executor.execute(ctx, cancel).await?;

        for entry in ctx.change_set.iter_mut() {
            self.transition(entry, ProcessingState::Persisted);
        }
        self.metrics
            .add_entries_persisted(ctx.change_set.len() as u64);
        ctx.result = Some(outcome);
        Ok(())
    }

    async fn post_event(
        &self,
        ctx: &mut SubmitContext,
        c: &Collaborators,
        persisted: &[Entry],
        cancel: &CancellationToken,
    ) -> SubmitResult<()> {
        self.phase(ctx, "post_event", persisted.len());

        if let Some(filter) = &c.filter {
            for entry in persisted {
                filter.on_executed(ctx, entry, cancel).await?;
                self.metrics.increment_post_events();
            }
        }
        Ok(())
    }

    fn short_circuit(&self, ctx: &SubmitContext, phase: &str) -> Option<SubmitOutcome> {
        let outcome = ctx.result.clone()?;
        self.metrics.increment_short_circuited();
        Logger::info(
            "SUBMIT_SHORT_CIRCUIT",
            &[
                ("submission_id", &ctx.submission_id.to_string()),
                ("phase", phase),
            ],
        );
        Some(outcome)
    }

    fn check_size(&self, ctx: &SubmitContext) -> SubmitResult<()> {
        if ctx.change_set.len() > self.config.max_entries {
            return Err(SubmitError::TooManyEntries {
                limit: self.config.max_entries,
            });
        }
        Ok(())
    }

    fn phase(&self, ctx: &SubmitContext, phase: &str, entries: usize) {
        Logger::trace(
            "SUBMIT_PHASE",
            &[
                ("submission_id", &ctx.submission_id.to_string()),
                ("phase", phase),
                ("entries", &entries.to_string()),
            ],
        );
    }

    fn transition(&self, entry: &mut Entry, to: ProcessingState) {
        if self.config.trace_entries {
            Logger::trace(
                "ENTRY_TRANSITION",
                &[
                    ("entry", &entry.id().to_string()),
                    ("target", entry.target()),
                    ("from", entry.state().as_str()),
                    ("to", to.as_str()),
                ],
            );
        }
        entry.set_state(to);
    }
}

impl Default for SubmitHandler {
    fn default() -> Self {
        Self::new(SubmitConfig::default())
    }
}

/// Security failure for a refused entry
fn denial(entry: &Entry) -> SubmitError {
    match entry.kind() {
        EntryKind::DataModification(m) => {
            let verb = match m.kind() {
                Ok(ModificationKind::Insert) => "insert an entity into",
                Ok(ModificationKind::Update) => "update an entity in",
                Ok(ModificationKind::Delete) => "delete an entity from",
                Err(err) => return err,
            };
            SubmitError::access_denied(format!(
                "No permission to {} the '{}' collection.",
                verb, m.collection
            ))
        }
        EntryKind::ActionInvocation(a) => SubmitError::access_denied(format!(
            "No permission to invoke the action '{}'.",
            a.action
        )),
    }
}
