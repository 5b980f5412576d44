//! Request Form
//!
//! Wire-friendly shape of a changeset entry, as handed over by the
//! upstream request layer. Converted into `Entry` before submission.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entry::{ActionInvocation, DataModification, Entry};

/// One requested change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EntryRequest {
    Insert {
        collection: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        values: Map<String, Value>,
    },
    /// Merge `values` into an existing resource
    Update {
        collection: String,
        key: String,
        #[serde(default)]
        values: Map<String, Value>,
        #[serde(default)]
        if_match: Option<Map<String, Value>>,
    },
    /// Replace an existing resource with `values`
    Replace {
        collection: String,
        key: String,
        #[serde(default)]
        values: Map<String, Value>,
        #[serde(default)]
        if_match: Option<Map<String, Value>>,
    },
    Delete {
        collection: String,
        key: String,
        #[serde(default)]
        if_match: Option<Map<String, Value>>,
    },
    Invoke {
        action: String,
        #[serde(default)]
        arguments: Map<String, Value>,
    },
}

impl EntryRequest {
    /// Operation name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Replace { .. } => "replace",
            Self::Delete { .. } => "delete",
            Self::Invoke { .. } => "invoke",
        }
    }
}

impl From<EntryRequest> for Entry {
    fn from(request: EntryRequest) -> Self {
        match request {
            EntryRequest::Insert {
                collection,
                key,
                values,
            } => {
                let m = DataModification::insert(collection, values);
                match key {
                    Some(key) => m.with_key(key).into(),
                    None => m.into(),
                }
            }
            EntryRequest::Update {
                collection,
                key,
                values,
                if_match,
            } => with_precondition(DataModification::update(collection, key, values), if_match),
            EntryRequest::Replace {
                collection,
                key,
                values,
                if_match,
            } => with_precondition(DataModification::replace(collection, key, values), if_match),
            EntryRequest::Delete {
                collection,
                key,
                if_match,
            } => with_precondition(DataModification::delete(collection, key), if_match),
            EntryRequest::Invoke { action, arguments } => {
                ActionInvocation::new(action, arguments).into()
            }
        }
    }
}

fn with_precondition(m: DataModification, if_match: Option<Map<String, Value>>) -> Entry {
    match if_match {
        Some(original) => m.with_original_values(original).into(),
        None => m.into(),
    }
}
