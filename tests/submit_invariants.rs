//! Submission Pipeline Invariant Tests
//!
//! Drives the orchestrator with recording collaborators:
//! - Phase order: prepare, validate, pre-event, persist, clear, post-event
//! - Denial and validation failures stop before any pre-event hook
//! - Entries appended or mutated by hooks are settled before persistence
//! - Post-event hooks see every persisted entry against an empty changeset
//! - Short-circuit, cancellation and size limits end the submission early

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use changeset_pipeline::submit::{
    ActionInvocation, AppliedAction, CancellationToken, CapabilityRegistry, ChangeSet,
    ChangeSetAuthorizer, ChangeSetFilter, ChangeSetPreparer, ChangeSetValidator,
    DataModification, Entry, EntryId, HookFuture, ProcessingState, SubmitConfig, SubmitContext,
    SubmitError, SubmitExecutor, SubmitHandler, SubmitOutcome, ValidationResult,
    ValidationResults,
};
use serde_json::{json, Map};

// =============================================================================
// Recording Collaborators
// =============================================================================

type Log<T> = Arc<Mutex<Vec<T>>>;
type Script = Box<dyn Fn(&mut SubmitContext, EntryId, &CancellationToken) + Send + Sync>;

/// Everything the collaborators observed, in call order
#[derive(Default, Clone)]
struct Trace {
    phases: Log<&'static str>,
    authorized: Log<EntryId>,
    validated: Log<EntryId>,
    executing: Log<EntryId>,
    executed: Log<(EntryId, ProcessingState, usize)>,
    persisted: Log<Vec<(EntryId, ProcessingState, Option<AppliedAction>)>>,
}

impl Trace {
    fn phases(&self) -> Vec<&'static str> {
        self.phases.lock().unwrap().clone()
    }

    fn authorized(&self) -> Vec<EntryId> {
        self.authorized.lock().unwrap().clone()
    }

    fn validated(&self) -> Vec<EntryId> {
        self.validated.lock().unwrap().clone()
    }

    fn executing(&self) -> Vec<EntryId> {
        self.executing.lock().unwrap().clone()
    }

    fn executed(&self) -> Vec<(EntryId, ProcessingState, usize)> {
        self.executed.lock().unwrap().clone()
    }

    fn persisted(&self) -> Vec<Vec<(EntryId, ProcessingState, Option<AppliedAction>)>> {
        self.persisted.lock().unwrap().clone()
    }
}

struct RecordingPreparer {
    trace: Trace,
    short_circuit: bool,
}

impl ChangeSetPreparer for RecordingPreparer {
    fn prepare<'a>(
        &'a self,
        ctx: &'a mut SubmitContext,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()> {
        Box::pin(async move {
            cancel.check()?;
            self.trace.phases.lock().unwrap().push("prepare");
            if self.short_circuit {
                ctx.result = Some(SubmitOutcome::new(json!("prepared elsewhere")));
            }
            Ok(())
        })
    }
}

struct RecordingAuthorizer {
    trace: Trace,
    denied: Option<EntryId>,
}

impl ChangeSetAuthorizer for RecordingAuthorizer {
    fn authorize<'a>(
        &'a self,
        _ctx: &'a SubmitContext,
        entry: &'a Entry,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, bool> {
        Box::pin(async move {
            cancel.check()?;
            self.trace.authorized.lock().unwrap().push(entry.id());
            Ok(self.denied != Some(entry.id()))
        })
    }
}

struct RecordingValidator {
    trace: Trace,
    invalid: BTreeSet<usize>,
    warned: BTreeSet<usize>,
}

impl ChangeSetValidator for RecordingValidator {
    fn validate<'a>(
        &'a self,
        _ctx: &'a SubmitContext,
        entry: &'a Entry,
        results: &'a mut ValidationResults,
        _cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()> {
        Box::pin(async move {
            let id = entry.id();
            self.trace.validated.lock().unwrap().push(id);
            if self.invalid.contains(&id.index()) {
                results.push(ValidationResult::error(id, "rejected").with_rule("test"));
            }
            if self.warned.contains(&id.index()) {
                results.push(ValidationResult::warning(id, "suspicious"));
            }
            Ok(())
        })
    }
}

struct ScriptedFilter {
    trace: Trace,
    script: Script,
}

impl ChangeSetFilter for ScriptedFilter {
    fn on_executing<'a>(
        &'a self,
        ctx: &'a mut SubmitContext,
        entry: EntryId,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()> {
        Box::pin(async move {
            cancel.check()?;
            assert_eq!(ctx.change_set[entry].state(), ProcessingState::PreEventing);
            self.trace.executing.lock().unwrap().push(entry);
            (self.script)(ctx, entry, cancel);
            Ok(())
        })
    }

    fn on_executed<'a>(
        &'a self,
        ctx: &'a mut SubmitContext,
        entry: &'a Entry,
        _cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()> {
        Box::pin(async move {
            self.trace
                .executed
                .lock()
                .unwrap()
                .push((entry.id(), entry.state(), ctx.change_set.len()));
            Ok(())
        })
    }
}

struct RecordingExecutor {
    trace: Trace,
}

impl SubmitExecutor for RecordingExecutor {
    fn execute<'a>(
        &'a self,
        ctx: &'a mut SubmitContext,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, SubmitOutcome> {
        Box::pin(async move {
            cancel.check()?;
            let seen = ctx
                .change_set
                .iter()
                .map(|e| {
                    (
                        e.id(),
                        e.state(),
                        e.as_modification().map(|m| m.applied_action()),
                    )
                })
                .collect::<Vec<_>>();
            let applied = seen.len();
            self.trace.persisted.lock().unwrap().push(seen);
            Ok(SubmitOutcome::new(json!({ "applied": applied })))
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Setup {
    trace: Trace,
    denied: Option<EntryId>,
    invalid: BTreeSet<usize>,
    warned: BTreeSet<usize>,
    short_circuit: bool,
    script: Script,
}

impl Setup {
    fn new() -> Self {
        Self {
            trace: Trace::default(),
            denied: None,
            invalid: BTreeSet::new(),
            warned: BTreeSet::new(),
            short_circuit: false,
            script: Box::new(|_, _, _| {}),
        }
    }

    fn script(
        mut self,
        script: impl Fn(&mut SubmitContext, EntryId, &CancellationToken) + Send + Sync + 'static,
    ) -> Self {
        self.script = Box::new(script);
        self
    }

    fn registry(self) -> (CapabilityRegistry, Trace) {
        let trace = self.trace;
        let registry = CapabilityRegistry::new()
            .with_preparer(RecordingPreparer {
                trace: trace.clone(),
                short_circuit: self.short_circuit,
            })
            .with_authorizer(RecordingAuthorizer {
                trace: trace.clone(),
                denied: self.denied,
            })
            .with_validator(RecordingValidator {
                trace: trace.clone(),
                invalid: self.invalid,
                warned: self.warned,
            })
            .with_filter(ScriptedFilter {
                trace: trace.clone(),
                script: self.script,
            })
            .with_executor(RecordingExecutor {
                trace: trace.clone(),
            });
        (registry, trace)
    }
}

fn products(count: usize) -> ChangeSet {
    let mut cs = ChangeSet::new();
    for i in 0..count {
        cs.push(DataModification::insert("products", Map::new()).with_key(format!("p{}", i)).into());
    }
    cs
}

fn id(index: usize) -> EntryId {
    EntryId::new(index)
}

async fn submit(
    setup: Setup,
    change_set: ChangeSet,
) -> (Result<SubmitOutcome, SubmitError>, SubmitContext, Trace) {
    submit_with(SubmitHandler::default(), setup, change_set, &CancellationToken::new()).await
}

async fn submit_with(
    handler: SubmitHandler,
    setup: Setup,
    change_set: ChangeSet,
    cancel: &CancellationToken,
) -> (Result<SubmitOutcome, SubmitError>, SubmitContext, Trace) {
    let (registry, trace) = setup.registry();
    let mut ctx = SubmitContext::new(registry, change_set);
    let result = handler.submit(&mut ctx, cancel).await;
    (result, ctx, trace)
}

// =============================================================================
// Phase Order Tests
// =============================================================================

/// An empty changeset still reaches the executor.
#[tokio::test]
async fn test_empty_changeset_is_persisted() {
    let (result, ctx, trace) = submit(Setup::new(), ChangeSet::new()).await;

    let outcome = result.unwrap();
    assert_eq!(outcome.payload, json!({"applied": 0}));
    assert_eq!(trace.phases(), vec!["prepare"]);
    assert_eq!(trace.persisted().len(), 1);
    assert!(trace.executed().is_empty());
    assert_eq!(ctx.result.unwrap().payload, outcome.payload);
}

/// Every entry passes every phase exactly once, in changeset order.
#[tokio::test]
async fn test_entries_flow_through_every_phase() {
    let (result, ctx, trace) = submit(Setup::new(), products(3)).await;

    result.unwrap();
    assert_eq!(trace.authorized(), vec![id(0), id(1), id(2)]);
    assert_eq!(trace.validated(), vec![id(0), id(1), id(2)]);
    assert_eq!(trace.executing(), vec![id(0), id(1), id(2)]);

    let persisted = trace.persisted();
    assert_eq!(persisted.len(), 1);
    assert!(persisted[0]
        .iter()
        .all(|(_, state, action)| *state == ProcessingState::PreEvented
            && *action == Some(AppliedAction::Inserting)));

    assert!(ctx.change_set.is_empty());
}

/// Post-event hooks run in order, on persisted entries, with the live
/// changeset already cleared.
#[tokio::test]
async fn test_post_event_sees_empty_changeset() {
    let (result, _ctx, trace) = submit(Setup::new(), products(3)).await;

    result.unwrap();
    assert_eq!(
        trace.executed(),
        vec![
            (id(0), ProcessingState::Persisted, 0),
            (id(1), ProcessingState::Persisted, 0),
            (id(2), ProcessingState::Persisted, 0),
        ]
    );
}

/// Insert + delete record their applied actions before the executor runs.
#[tokio::test]
async fn test_applied_actions_recorded_before_persistence() {
    let mut cs = ChangeSet::new();
    cs.push(
        DataModification::insert("products", Map::new())
            .with_key("P1")
            .into(),
    );
    cs.push(DataModification::delete("products", "P2").into());
    cs.push(ActionInvocation::new("restock", Map::new()).into());

    let (result, _ctx, trace) = submit(Setup::new(), cs).await;

    result.unwrap();
    let persisted = &trace.persisted()[0];
    assert_eq!(persisted[0].2, Some(AppliedAction::Inserting));
    assert_eq!(persisted[1].2, Some(AppliedAction::Removing));
    assert_eq!(persisted[2].2, None);
    assert!(trace
        .executed()
        .iter()
        .all(|(_, state, _)| *state == ProcessingState::Persisted));
}

/// Entries that arrive already settled skip authorization, validation and
/// pre-event but are still persisted and post-evented in order.
#[tokio::test]
async fn test_settled_entries_skip_to_persistence() {
    let mut cs = ChangeSet::new();
    let settled = cs.push(DataModification::delete("products", "p7").into());
    cs[settled].set_state(ProcessingState::PreEvented);
    let touched = cs.push(DataModification::update("products", "p8", Map::new()).into());
    cs[touched].set_state(ProcessingState::ChangedWithinOwnPreEventing);
    cs.push(DataModification::insert("products", Map::new()).into());

    let (result, _ctx, trace) = submit(Setup::new(), cs).await;

    result.unwrap();
    assert_eq!(trace.authorized(), vec![id(2)]);
    assert_eq!(trace.validated(), vec![id(2)]);
    assert_eq!(trace.executing(), vec![id(2)]);

    assert_eq!(
        trace.persisted()[0],
        vec![
            (id(0), ProcessingState::PreEvented, Some(AppliedAction::Removing)),
            (id(1), ProcessingState::PreEvented, Some(AppliedAction::Updating)),
            (id(2), ProcessingState::PreEvented, Some(AppliedAction::Inserting)),
        ]
    );
    assert_eq!(
        trace.executed(),
        vec![
            (id(0), ProcessingState::Persisted, 0),
            (id(1), ProcessingState::Persisted, 0),
            (id(2), ProcessingState::Persisted, 0),
        ]
    );
}

// =============================================================================
// Rejection Tests
// =============================================================================

/// A single refused entry fails the whole submission before pre-event.
#[tokio::test]
async fn test_denied_entry_stops_submission() {
    let mut cs = products(1);
    cs.push(DataModification::delete("products", "p9").into());
    cs.push(DataModification::insert("products", Map::new()).into());

    let mut setup = Setup::new();
    setup.denied = Some(id(1));
    let (result, ctx, trace) = submit(setup, cs).await;

    let err = result.unwrap_err();
    assert!(matches!(err, SubmitError::AccessDenied(_)));
    assert_eq!(
        err.to_string(),
        "Access denied: No permission to delete an entity from the 'products' collection."
    );

    assert_eq!(trace.authorized(), vec![id(0), id(1)]);
    assert!(trace.validated().is_empty());
    assert!(trace.executing().is_empty());
    assert!(trace.persisted().is_empty());
    assert!(ctx
        .change_set
        .iter()
        .all(|e| e.state() == ProcessingState::Unprocessed));
}

/// Refused invocations name the action.
#[tokio::test]
async fn test_denied_action_names_action() {
    let mut cs = ChangeSet::new();
    cs.push(ActionInvocation::new("purge", Map::new()).into());

    let mut setup = Setup::new();
    setup.denied = Some(id(0));
    let (result, _ctx, _trace) = submit(setup, cs).await;

    assert_eq!(
        result.unwrap_err().to_string(),
        "Access denied: No permission to invoke the action 'purge'."
    );
}

/// Findings from every entry are aggregated before failing.
#[tokio::test]
async fn test_validation_errors_aggregate() {
    let mut setup = Setup::new();
    setup.invalid = [0, 2].into_iter().collect();
    let (result, _ctx, trace) = submit(setup, products(3)).await;

    let err = result.unwrap_err();
    let results = err.validation_results().unwrap();
    assert_eq!(results.error_count(), 2);
    let targets: Vec<EntryId> = results.errors().map(|r| r.target).collect();
    assert_eq!(targets, vec![id(0), id(2)]);

    assert_eq!(trace.validated(), vec![id(0), id(1), id(2)]);
    assert!(trace.executing().is_empty());
    assert!(trace.persisted().is_empty());
}

/// Warnings alone never block the submission.
#[tokio::test]
async fn test_validation_warnings_do_not_block() {
    let mut setup = Setup::new();
    setup.warned = [1].into_iter().collect();
    let (result, _ctx, trace) = submit(setup, products(2)).await;

    result.unwrap();
    assert_eq!(trace.persisted().len(), 1);
}

/// An entry flagged as both insert and update is a configuration fault
/// raised before any authorization.
#[tokio::test]
async fn test_conflicting_flags_fail_before_authorization() {
    let mut cs = products(1);
    let mut broken = DataModification::update("products", "p1", Map::new());
    broken.is_new = true;
    cs.push(broken.into());

    let (result, _ctx, trace) = submit(Setup::new(), cs).await;

    let err = result.unwrap_err();
    assert!(matches!(err, SubmitError::Configuration(_)));
    assert!(err.to_string().contains("exactly one of insert/update/delete"));
    assert!(trace.authorized().is_empty());
    assert!(trace.executing().is_empty());
}

/// A hook appending an entry flagged as both insert and update fails the
/// submission before the executor runs.
#[tokio::test]
async fn test_conflicting_flags_on_appended_entry() {
    let setup = Setup::new().script(|ctx, entry, _| {
        if entry.index() == 0 {
            let mut broken = DataModification::insert("audit_log", Map::new());
            broken.is_update = true;
            ctx.change_set.push(broken.into());
        }
    });
    let (result, _ctx, trace) = submit(setup, products(1)).await;

    assert!(matches!(result.unwrap_err(), SubmitError::Configuration(_)));
    assert_eq!(trace.authorized(), vec![id(0)]);
    assert_eq!(trace.executing(), vec![id(0)]);
    assert!(trace.persisted().is_empty());
    assert!(trace.executed().is_empty());
}

/// Optional capabilities may be left out.
#[tokio::test]
async fn test_optional_capabilities_may_be_absent() {
    let trace = Trace::default();
    let registry = CapabilityRegistry::new()
        .with_preparer(RecordingPreparer {
            trace: trace.clone(),
            short_circuit: false,
        })
        .with_executor(RecordingExecutor {
            trace: trace.clone(),
        });
    let mut ctx = SubmitContext::new(registry, products(2));

    SubmitHandler::default()
        .submit(&mut ctx, &CancellationToken::new())
        .await
        .unwrap();

    let persisted = trace.persisted();
    assert!(persisted[0]
        .iter()
        .all(|(_, state, _)| *state == ProcessingState::PreEvented));
}

// =============================================================================
// Early Exit Tests
// =============================================================================

/// A preparer that sets a result skips every later phase.
#[tokio::test]
async fn test_preparer_short_circuit() {
    let mut setup = Setup::new();
    setup.short_circuit = true;
    let (result, ctx, trace) = submit(setup, products(2)).await;

    assert_eq!(result.unwrap().payload, json!("prepared elsewhere"));
    assert!(trace.authorized().is_empty());
    assert!(trace.persisted().is_empty());
    assert_eq!(ctx.change_set.len(), 2);
}

/// A pre-event hook that sets a result stops the remaining hooks.
#[tokio::test]
async fn test_pre_event_short_circuit() {
    let setup = Setup::new().script(|ctx, entry, _| {
        if entry.index() == 0 {
            ctx.result = Some(SubmitOutcome::new(json!("handled by hook")));
        }
    });
    let (result, _ctx, trace) = submit(setup, products(3)).await;

    assert_eq!(result.unwrap().payload, json!("handled by hook"));
    assert_eq!(trace.executing(), vec![id(0)]);
    assert!(trace.persisted().is_empty());
    assert!(trace.executed().is_empty());
}

/// Cancelling during pre-event fails the next collaborator call.
#[tokio::test]
async fn test_cancellation_during_pre_event() {
    let setup = Setup::new().script(|_, entry, cancel| {
        if entry.index() == 0 {
            cancel.cancel();
        }
    });
    let (result, _ctx, trace) = submit(setup, products(2)).await;

    assert!(matches!(result.unwrap_err(), SubmitError::Cancelled));
    assert_eq!(trace.executing(), vec![id(0)]);
    assert!(trace.persisted().is_empty());
}

/// A token cancelled up front stops the preparer.
#[tokio::test]
async fn test_cancelled_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (result, _ctx, trace) =
        submit_with(SubmitHandler::default(), Setup::new(), products(1), &cancel).await;

    assert!(matches!(result.unwrap_err(), SubmitError::Cancelled));
    assert!(trace.phases().is_empty());
}

/// Hooks that keep growing the changeset hit the entry limit.
#[tokio::test]
async fn test_growth_past_entry_limit() {
    let setup = Setup::new().script(|ctx, _, _| {
        ctx.change_set
            .push(DataModification::insert("audit_log", Map::new()).into());
    });
    let handler = SubmitHandler::new(SubmitConfig {
        max_entries: 3,
        ..Default::default()
    });

    let (result, _ctx, trace) =
        submit_with(handler, setup, products(2), &CancellationToken::new()).await;

    assert!(matches!(
        result.unwrap_err(),
        SubmitError::TooManyEntries { limit: 3 }
    ));
    assert!(trace.persisted().is_empty());
}

/// Hooks that append on every round never settle.
#[tokio::test]
async fn test_unsettled_pre_event_hits_round_limit() {
    let setup = Setup::new().script(|ctx, _, _| {
        ctx.change_set
            .push(DataModification::insert("audit_log", Map::new()).into());
    });
    let handler = SubmitHandler::new(SubmitConfig {
        max_pre_event_rounds: 3,
        ..Default::default()
    });

    let (result, _ctx, trace) =
        submit_with(handler, setup, products(1), &CancellationToken::new()).await;

    assert!(matches!(
        result.unwrap_err(),
        SubmitError::PreEventLimit { rounds: 3 }
    ));
    assert_eq!(trace.executing(), vec![id(0), id(1), id(2)]);
}
