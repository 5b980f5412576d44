//! In-Memory Store
//!
//! Reference backend for the pipeline: a preparer that resolves targets
//! against the store and an executor that applies a whole changeset
//! atomically.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::cancel::CancellationToken;
use super::context::{SubmitContext, SubmitOutcome};
use super::entry::{AppliedAction, DataModification, EntryKind, ModificationKind};
use super::error::{SubmitError, SubmitResult};
use super::registry::{ChangeSetPreparer, HookFuture, SubmitExecutor};

/// Property holding a document's key
pub const KEY_FIELD: &str = "_id";

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// Collection → key → document
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load documents into a collection, keyed by their `_id` (generated when absent)
    pub fn seed(&self, collection: &str, documents: Vec<Value>) -> SubmitResult<usize> {
        let mut data = self.data.write().map_err(lock_error)?;
        let coll = data.entry(collection.to_string()).or_default();
        let count = documents.len();
        for mut doc in documents {
            let key = doc
                .get(KEY_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            if let Some(obj) = doc.as_object_mut() {
                obj.insert(KEY_FIELD.to_string(), Value::String(key.clone()));
            }
            coll.insert(key, doc);
        }
        Ok(count)
    }

    pub fn get(&self, collection: &str, key: &str) -> SubmitResult<Option<Value>> {
        let data = self.data.read().map_err(lock_error)?;
        Ok(data.get(collection).and_then(|c| c.get(key)).cloned())
    }

    pub fn contains(&self, collection: &str, key: &str) -> SubmitResult<bool> {
        let data = self.data.read().map_err(lock_error)?;
        Ok(data.get(collection).is_some_and(|c| c.contains_key(key)))
    }

    /// Every document in a collection, ordered by key
    pub fn documents(&self, collection: &str) -> SubmitResult<Vec<Value>> {
        let data = self.data.read().map_err(lock_error)?;
        Ok(data
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn len(&self, collection: &str) -> SubmitResult<usize> {
        let data = self.data.read().map_err(lock_error)?;
        Ok(data.get(collection).map_or(0, BTreeMap::len))
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> SubmitError {
    SubmitError::execution(format!("store lock poisoned: {}", e))
}

fn describe(m: &DataModification) -> String {
    format!("'{}' in '{}'", m.key_display(), m.collection)
}

/// Every property in `original` must equal the stored value
fn check_precondition(m: &DataModification, stored: &Value) -> SubmitResult<()> {
    let Some(original) = &m.original_values else {
        return Ok(());
    };
    for (property, expected) in original {
        if stored.get(property) != Some(expected) {
            return Err(SubmitError::conflict(format!(
                "{} no longer matches '{}'",
                describe(m),
                property
            )));
        }
    }
    Ok(())
}

/// Resolves changeset entries against the store before validation
pub struct StorePreparer {
    store: Arc<InMemoryStore>,
}

impl StorePreparer {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }

    fn prepare_modification(&self, m: &mut DataModification) -> SubmitResult<()> {
        match m.kind()? {
            ModificationKind::Insert => {
                let key = match &m.key {
                    Some(key) => key.clone(),
                    None => {
                        let key = Uuid::new_v4().to_string();
                        m.key = Some(key.clone());
                        key
                    }
                };
                if self.store.contains(&m.collection, &key)? {
                    return Err(SubmitError::conflict(format!(
                        "{} already exists",
                        describe(m)
                    )));
                }
                m.values.insert(KEY_FIELD.to_string(), Value::String(key));
            }
            ModificationKind::Update | ModificationKind::Delete => {
                let key = m.key.as_deref().unwrap_or_default();
                let stored = self
                    .store
                    .get(&m.collection, key)?
                    .ok_or_else(|| SubmitError::not_found(describe(m)))?;
                check_precondition(m, &stored)?;
                m.resource = Some(stored);
            }
        }
        Ok(())
    }
}

impl ChangeSetPreparer for StorePreparer {
    fn prepare<'a>(
        &'a self,
        ctx: &'a mut SubmitContext,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()> {
        Box::pin(async move {
            cancel.check()?;
            for entry in ctx.change_set.iter_mut() {
                if let Some(m) = entry.as_modification_mut() {
                    self.prepare_modification(m)?;
                }
            }
            Ok(())
        })
    }
}

/// Handler for a named action; receives the invocation arguments
pub type ActionHandler = Arc<dyn Fn(&Map<String, Value>) -> SubmitResult<Value> + Send + Sync>;

/// Applies a changeset to the store, all entries or none
pub struct StoreExecutor {
    store: Arc<InMemoryStore>,
    actions: HashMap<String, ActionHandler>,
}

impl StoreExecutor {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            store,
            actions: HashMap::new(),
        }
    }

    /// Register a handler for action invocations named `name`
    pub fn with_action<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> SubmitResult<Value> + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(handler));
        self
    }

    fn apply(&self, ctx: &SubmitContext, staged: &mut Collections) -> SubmitResult<Vec<Value>> {
        let mut results = Vec::with_capacity(ctx.change_set.len());

        for entry in ctx.change_set.iter() {
            let result = match entry.kind() {
                EntryKind::DataModification(m) => {
                    let action = m.applied_action();
                    let key = apply_modification(staged, m)?;
                    json!({
                        "entry": entry.id(),
                        "collection": m.collection,
                        "key": key,
                        "action": action,
                    })
                }
                EntryKind::ActionInvocation(a) => {
                    let handler = self.actions.get(&a.action).ok_or_else(|| {
                        SubmitError::execution(format!("unknown action '{}'", a.action))
                    })?;
                    json!({
                        "entry": entry.id(),
                        "action": a.action,
                        "result": handler(&a.arguments)?,
                    })
                }
            };
            results.push(result);
        }
        Ok(results)
    }
}

/// Apply one modification by its recorded action, returning the key touched
fn apply_modification(staged: &mut Collections, m: &DataModification) -> SubmitResult<String> {
    let coll = staged.entry(m.collection.clone()).or_default();

    match m.applied_action() {
        AppliedAction::Inserting => {
            let key = m
                .key
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            if coll.contains_key(&key) {
                return Err(SubmitError::conflict(format!("{} already exists", describe(m))));
            }
            let mut doc = m.values.clone();
            doc.insert(KEY_FIELD.to_string(), Value::String(key.clone()));
            coll.insert(key.clone(), Value::Object(doc));
            Ok(key)
        }
        AppliedAction::Updating => {
            let key = m.key.clone().unwrap_or_default();
            let doc = coll
                .get_mut(&key)
                .ok_or_else(|| SubmitError::not_found(describe(m)))?;
            check_precondition(m, doc)?;
            if m.is_full_replace {
                let mut replacement = m.values.clone();
                replacement.insert(KEY_FIELD.to_string(), Value::String(key.clone()));
                *doc = Value::Object(replacement);
            } else if let Some(obj) = doc.as_object_mut() {
                for (k, v) in &m.values {
                    if k != KEY_FIELD {
                        obj.insert(k.clone(), v.clone());
                    }
                }
            }
            Ok(key)
        }
        AppliedAction::Removing => {
            let key = m.key.clone().unwrap_or_default();
            let removed = coll
                .remove(&key)
                .ok_or_else(|| SubmitError::not_found(describe(m)))?;
            check_precondition(m, &removed)?;
            Ok(key)
        }
        AppliedAction::Undefined => Err(SubmitError::configuration(format!(
            "no applied action recorded for {}",
            describe(m)
        ))),
    }
}

impl SubmitExecutor for StoreExecutor {
    fn execute<'a>(
        &'a self,
        ctx: &'a mut SubmitContext,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, SubmitOutcome> {
        Box::pin(async move {
            cancel.check()?;

            let mut data = self.store.data.write().map_err(lock_error)?;
            let mut staged = data.clone();
            let results = self.apply(ctx, &mut staged)?;
            *data = staged;

            Ok(SubmitOutcome::new(json!({
                "submission_id": ctx.submission_id,
                "applied": results.len(),
                "results": results,
            })))
        })
    }
}
