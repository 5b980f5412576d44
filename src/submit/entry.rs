//! Changeset Entries
//!
//! An entry is either a data modification or an action invocation,
//! plus the processing state the orchestrator advances.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::change_set::EntryId;
use super::error::{SubmitError, SubmitResult};

/// Per-entry processing state
///
/// Normal flow is `Unprocessed → Validated → PreEventing → PreEvented → Persisted`.
/// `Changed` marks an entry mutated after its own pre-event step began; it
/// is folded into `ChangedWithinOwnPreEventing` and from there straight
/// back to `PreEvented`, never through validation again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Unprocessed,
    Validated,
    PreEventing,
    PreEvented,
    ChangedWithinOwnPreEventing,
    Changed,
    Persisted,
}

impl ProcessingState {
    /// States that still need authorization and validation
    pub fn needs_validation(self) -> bool {
        matches!(self, Self::Unprocessed)
    }

    /// States that indicate a change no phase has settled yet
    pub fn has_pending_change(self) -> bool {
        matches!(
            self,
            Self::Unprocessed | Self::Changed | Self::ChangedWithinOwnPreEventing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unprocessed => "unprocessed",
            Self::Validated => "validated",
            Self::PreEventing => "pre_eventing",
            Self::PreEvented => "pre_evented",
            Self::ChangedWithinOwnPreEventing => "changed_within_own_pre_eventing",
            Self::Changed => "changed",
            Self::Persisted => "persisted",
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of insert/update/delete a data modification requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationKind {
    Insert,
    Update,
    Delete,
}

/// Action recorded before persistence; the store may forget the
/// insert/update/delete distinction once changes are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedAction {
    #[default]
    Undefined,
    Inserting,
    Updating,
    Removing,
}

impl From<ModificationKind> for AppliedAction {
    fn from(kind: ModificationKind) -> Self {
        match kind {
            ModificationKind::Insert => Self::Inserting,
            ModificationKind::Update => Self::Updating,
            ModificationKind::Delete => Self::Removing,
        }
    }
}

/// A pending insert, update or delete against one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataModification {
    pub collection: String,
    /// Resource key; inserts may leave it empty for the preparer to assign
    #[serde(default)]
    pub key: Option<String>,
    /// New property values (insert payload or update delta)
    #[serde(default)]
    pub values: Map<String, Value>,
    /// Precondition: listed properties must still hold these values
    #[serde(default)]
    pub original_values: Option<Map<String, Value>>,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_update: bool,
    #[serde(default)]
    pub is_delete: bool,
    /// Replace the whole resource instead of merging values into it
    #[serde(default)]
    pub is_full_replace: bool,
    /// Stored resource resolved by the preparer
    #[serde(default)]
    pub resource: Option<Value>,
    #[serde(default)]
    applied_action: AppliedAction,
}

impl DataModification {
    fn new(collection: impl Into<String>, key: Option<String>) -> Self {
        Self {
            collection: collection.into(),
            key,
            values: Map::new(),
            original_values: None,
            is_new: false,
            is_update: false,
            is_delete: false,
            is_full_replace: false,
            resource: None,
            applied_action: AppliedAction::Undefined,
        }
    }

    pub fn insert(collection: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            values,
            is_new: true,
            ..Self::new(collection, None)
        }
    }

    pub fn update(
        collection: impl Into<String>,
        key: impl Into<String>,
        values: Map<String, Value>,
    ) -> Self {
        Self {
            values,
            is_update: true,
            ..Self::new(collection, Some(key.into()))
        }
    }

    pub fn replace(
        collection: impl Into<String>,
        key: impl Into<String>,
        values: Map<String, Value>,
    ) -> Self {
        Self {
            is_full_replace: true,
            ..Self::update(collection, key, values)
        }
    }

    pub fn delete(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            is_delete: true,
            ..Self::new(collection, Some(key.into()))
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_original_values(mut self, original: Map<String, Value>) -> Self {
        self.original_values = Some(original);
        self
    }

    /// Resolve the request flags; exactly one of them must be set
    pub fn kind(&self) -> SubmitResult<ModificationKind> {
        match (self.is_new, self.is_update, self.is_delete) {
            (true, false, false) => Ok(ModificationKind::Insert),
            (false, true, false) => Ok(ModificationKind::Update),
            (false, false, true) => Ok(ModificationKind::Delete),
            _ => Err(SubmitError::configuration(format!(
                "modification of '{}' must be exactly one of insert/update/delete",
                self.collection
            ))),
        }
    }

    pub fn applied_action(&self) -> AppliedAction {
        self.applied_action
    }

    /// Record the applied action from the request flags
    pub fn record_applied_action(&mut self) -> SubmitResult<AppliedAction> {
        self.applied_action = self.kind()?.into();
        Ok(self.applied_action)
    }

    /// Key as a display string, for messages
    pub fn key_display(&self) -> &str {
        self.key.as_deref().unwrap_or("<new>")
    }
}

/// A pending invocation of a named action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInvocation {
    pub action: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ActionInvocation {
    pub fn new(action: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            action: action.into(),
            arguments,
        }
    }
}

/// Entry variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryKind {
    DataModification(DataModification),
    ActionInvocation(ActionInvocation),
}

/// One unit of change within a changeset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    id: EntryId,
    state: ProcessingState,
    #[serde(flatten)]
    kind: EntryKind,
}

impl Entry {
    /// Create an unprocessed entry; its id is assigned by the changeset
    pub fn new(kind: EntryKind) -> Self {
        Self {
            id: EntryId::new(0),
            state: ProcessingState::Unprocessed,
            kind,
        }
    }

    pub(crate) fn assign_id(&mut self, id: EntryId) {
        self.id = id;
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn state(&self) -> ProcessingState {
        self.state
    }

    /// Overwrite the processing state
    pub fn set_state(&mut self, state: ProcessingState) {
        self.state = state;
    }

    /// Record that this entry was mutated by a pre-event hook
    ///
    /// Only entries whose own pre-event step already began are marked;
    /// unprocessed and validated entries have not been notified yet and
    /// persisted ones are past the point where a change matters.
    pub fn mark_changed(&mut self) {
        if matches!(
            self.state,
            ProcessingState::PreEventing | ProcessingState::PreEvented
        ) {
            self.state = ProcessingState::Changed;
        }
    }

    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    pub fn as_modification(&self) -> Option<&DataModification> {
        match &self.kind {
            EntryKind::DataModification(m) => Some(m),
            EntryKind::ActionInvocation(_) => None,
        }
    }

    pub fn as_modification_mut(&mut self) -> Option<&mut DataModification> {
        match &mut self.kind {
            EntryKind::DataModification(m) => Some(m),
            EntryKind::ActionInvocation(_) => None,
        }
    }

    /// Set one value on a data modification and mark the entry changed
    ///
    /// Returns false for action invocations, which carry no values.
    pub fn set_value(&mut self, property: impl Into<String>, value: Value) -> bool {
        match &mut self.kind {
            EntryKind::DataModification(m) => {
                m.values.insert(property.into(), value);
                self.mark_changed();
                true
            }
            EntryKind::ActionInvocation(_) => false,
        }
    }

    /// Collection for data modifications, action name for invocations
    pub fn target(&self) -> &str {
        match &self.kind {
            EntryKind::DataModification(m) => &m.collection,
            EntryKind::ActionInvocation(a) => &a.action,
        }
    }
}

impl From<DataModification> for Entry {
    fn from(m: DataModification) -> Self {
        Self::new(EntryKind::DataModification(m))
    }
}

impl From<ActionInvocation> for Entry {
    fn from(a: ActionInvocation) -> Self {
        Self::new(EntryKind::ActionInvocation(a))
    }
}
