//! Policy Collaborators
//!
//! Config-driven authorizer and validator for deployments that do not
//! plug in their own.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::cancel::CancellationToken;
use super::context::{Principal, SubmitContext};
use super::entry::{DataModification, Entry, EntryKind, ModificationKind};
use super::error::{SubmitError, SubmitResult};
use super::registry::{ChangeSetAuthorizer, ChangeSetValidator, HookFuture};
use super::validation::{ValidationResult, ValidationResults};

/// Access and validation rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Let principals without a user id submit
    #[serde(default)]
    pub allow_anonymous: bool,

    /// Collections no one but a service principal may modify
    #[serde(default)]
    pub read_only_collections: BTreeSet<String>,

    /// Collection → roles allowed to modify it (any one suffices)
    #[serde(default)]
    pub write_roles: BTreeMap<String, Vec<String>>,

    /// Actions no one but a service principal may invoke
    #[serde(default)]
    pub denied_actions: BTreeSet<String>,

    /// Action → roles allowed to invoke it
    #[serde(default)]
    pub action_roles: BTreeMap<String, Vec<String>>,

    /// Collection → properties every inserted or replaced resource must carry
    #[serde(default)]
    pub required_fields: BTreeMap<String, Vec<String>>,

    /// Collection → property → regex the property's string value must match
    #[serde(default)]
    pub field_patterns: BTreeMap<String, BTreeMap<String, String>>,
}

fn holds_any(principal: &Principal, roles: Option<&Vec<String>>) -> bool {
    roles.map_or(true, |roles| roles.iter().any(|r| principal.has_role(r)))
}

/// Authorizer driven by `PolicyConfig`
pub struct PolicyAuthorizer {
    config: PolicyConfig,
}

impl PolicyAuthorizer {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Decide synchronously; service principals always pass
    pub fn allows(&self, principal: &Principal, entry: &Entry) -> bool {
        if principal.is_service {
            return true;
        }
        if !self.config.allow_anonymous && !principal.is_authenticated() {
            return false;
        }

        match entry.kind() {
            EntryKind::DataModification(m) => {
                !self.config.read_only_collections.contains(&m.collection)
                    && holds_any(principal, self.config.write_roles.get(&m.collection))
            }
            EntryKind::ActionInvocation(a) => {
                !self.config.denied_actions.contains(&a.action)
                    && holds_any(principal, self.config.action_roles.get(&a.action))
            }
        }
    }
}

impl ChangeSetAuthorizer for PolicyAuthorizer {
    fn authorize<'a>(
        &'a self,
        ctx: &'a SubmitContext,
        entry: &'a Entry,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, bool> {
        Box::pin(async move {
            cancel.check()?;
            Ok(self.allows(&ctx.principal, entry))
        })
    }
}

/// Validator for required fields, string patterns and empty updates
pub struct SchemaValidator {
    required_fields: BTreeMap<String, Vec<String>>,
    patterns: BTreeMap<String, Vec<(String, Regex)>>,
}

impl SchemaValidator {
    /// Compile the configured patterns
    pub fn from_config(config: &PolicyConfig) -> SubmitResult<Self> {
        let mut patterns = BTreeMap::new();
        for (collection, fields) in &config.field_patterns {
            let mut compiled = Vec::with_capacity(fields.len());
            for (property, pattern) in fields {
                let regex = Regex::new(pattern).map_err(|e| {
                    SubmitError::configuration(format!(
                        "invalid pattern for {}.{}: {}",
                        collection, property, e
                    ))
                })?;
                compiled.push((property.clone(), regex));
            }
            patterns.insert(collection.clone(), compiled);
        }

        Ok(Self {
            required_fields: config.required_fields.clone(),
            patterns,
        })
    }

    /// Report findings for one entry
    pub fn check(&self, entry: &Entry, results: &mut ValidationResults) {
        let Some(m) = entry.as_modification() else {
            return;
        };
        let Ok(kind) = m.kind() else {
            return;
        };

        match kind {
            ModificationKind::Insert => self.check_required(entry, m, results),
            ModificationKind::Update if m.is_full_replace => {
                self.check_required(entry, m, results)
            }
            ModificationKind::Update if m.values.is_empty() => results.push(
                ValidationResult::warning(entry.id(), "update carries no values")
                    .with_rule("empty_update"),
            ),
            ModificationKind::Update | ModificationKind::Delete => {}
        }

        if kind != ModificationKind::Delete {
            self.check_patterns(entry, m, results);
        }
    }

    fn check_required(&self, entry: &Entry, m: &DataModification, results: &mut ValidationResults) {
        let Some(required) = self.required_fields.get(&m.collection) else {
            return;
        };
        for property in required {
            let present = m.values.get(property).is_some_and(|v| !v.is_null());
            if !present {
                results.push(
                    ValidationResult::error(
                        entry.id(),
                        format!("'{}' is required in '{}'", property, m.collection),
                    )
                    .with_rule("required")
                    .with_property(property.clone()),
                );
            }
        }
    }

    fn check_patterns(&self, entry: &Entry, m: &DataModification, results: &mut ValidationResults) {
        let Some(patterns) = self.patterns.get(&m.collection) else {
            return;
        };
        for (property, regex) in patterns {
            let matches = match m.values.get(property) {
                None | Some(Value::Null) => continue,
                Some(Value::String(s)) => regex.is_match(s),
                Some(_) => false,
            };
            if !matches {
                results.push(
                    ValidationResult::error(
                        entry.id(),
                        format!("'{}' does not match {}", property, regex.as_str()),
                    )
                    .with_rule("pattern")
                    .with_property(property.clone()),
                );
            }
        }
    }
}

impl ChangeSetValidator for SchemaValidator {
    fn validate<'a>(
        &'a self,
        _ctx: &'a SubmitContext,
        entry: &'a Entry,
        results: &'a mut ValidationResults,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()> {
        Box::pin(async move {
            cancel.check()?;
            self.check(entry, results);
            Ok(())
        })
    }
}
