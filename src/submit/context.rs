//! Submission Context
//!
//! Everything one submission call owns: the changeset, the result slot,
//! the capability registry and the principal on whose behalf it runs.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::change_set::ChangeSet;
use super::registry::CapabilityRegistry;

/// Context owned by a single in-flight submission
#[derive(Debug)]
pub struct SubmitContext {
    /// Submission ID for log correlation
    pub submission_id: Uuid,

    /// Who is submitting; consumed by the authorizer
    pub principal: Principal,

    /// The live changeset
    pub change_set: ChangeSet,

    /// Final result; setting it before persistence short-circuits the pipeline
    pub result: Option<SubmitOutcome>,

    /// Free-form values collaborators may share with each other
    pub metadata: HashMap<String, Value>,

    registry: CapabilityRegistry,

    started_at: Instant,
}

impl SubmitContext {
    /// Create a context for the given registry and changeset
    pub fn new(registry: CapabilityRegistry, change_set: ChangeSet) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            principal: Principal::anonymous(),
            change_set,
            result: None,
            metadata: HashMap::new(),
            registry,
            started_at: Instant::now(),
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Whether a result is already present
    pub fn is_short_circuited(&self) -> bool {
        self.result.is_some()
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}

/// Identity the submission runs under; authentication happens upstream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Service principals bypass policy checks
    #[serde(default)]
    pub is_service: bool,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn service() -> Self {
        Self {
            is_service: true,
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_service || self.user_id.is_some()
    }
}

/// Result of a submission, produced by the executor or a short-circuiting preparer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    /// Executor-defined payload
    pub payload: Value,
    pub completed_at: DateTime<Utc>,
}

impl SubmitOutcome {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            completed_at: Utc::now(),
        }
    }
}
