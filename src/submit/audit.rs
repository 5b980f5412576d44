//! Audit Filter
//!
//! Stamps inserted and updated resources while they pre-event and logs
//! every entry once it has been persisted.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::observability::Logger;

use super::cancel::CancellationToken;
use super::change_set::EntryId;
use super::context::SubmitContext;
use super::entry::{Entry, EntryKind, ModificationKind};
use super::registry::{ChangeSetFilter, HookFuture};

/// Pre/post filter that timestamps writes and logs executed entries
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    stamp_field: Option<String>,
}

impl AuditFilter {
    /// Filter that only logs
    pub fn new() -> Self {
        Self::default()
    }

    /// Also set `field` to the current time on every insert and update
    pub fn with_stamp_field(mut self, field: impl Into<String>) -> Self {
        self.stamp_field = Some(field.into());
        self
    }
}

impl ChangeSetFilter for AuditFilter {
    fn on_executing<'a>(
        &'a self,
        ctx: &'a mut SubmitContext,
        entry: EntryId,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()> {
        Box::pin(async move {
            cancel.check()?;
            let (Some(field), Some(entry)) = (&self.stamp_field, ctx.change_set.get_mut(entry))
            else {
                return Ok(());
            };

            let stamps = entry.as_modification().is_some_and(|m| {
                matches!(
                    m.kind(),
                    Ok(ModificationKind::Insert) | Ok(ModificationKind::Update)
                )
            });
            if stamps {
                let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
                entry.set_value(field.clone(), Value::String(now));
            }
            Ok(())
        })
    }

    fn on_executed<'a>(
        &'a self,
        ctx: &'a mut SubmitContext,
        entry: &'a Entry,
        cancel: &'a CancellationToken,
    ) -> HookFuture<'a, ()> {
        Box::pin(async move {
            cancel.check()?;
            let submission_id = ctx.submission_id.to_string();
            let id = entry.id().to_string();
            match entry.kind() {
                EntryKind::DataModification(m) => {
                    let action = serde_json::to_value(m.applied_action())?;
                    Logger::info(
                        "ENTRY_EXECUTED",
                        &[
                            ("submission_id", &submission_id),
                            ("entry", &id),
                            ("collection", &m.collection),
                            ("key", m.key_display()),
                            ("action", action.as_str().unwrap_or_default()),
                        ],
                    );
                }
                EntryKind::ActionInvocation(a) => {
                    Logger::info(
                        "ENTRY_EXECUTED",
                        &[
                            ("submission_id", &submission_id),
                            ("entry", &id),
                            ("action", &a.action),
                        ],
                    );
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::change_set::ChangeSet;
    use crate::submit::entry::{DataModification, ProcessingState};
    use crate::submit::registry::CapabilityRegistry;
    use serde_json::Map;

    #[tokio::test]
    async fn test_stamps_insert_and_marks_changed() {
        let mut cs = ChangeSet::new();
        let id = cs.push(DataModification::insert("products", Map::new()).into());
        cs[id].set_state(ProcessingState::PreEventing);
        let mut ctx = SubmitContext::new(CapabilityRegistry::new(), cs);

        AuditFilter::new()
            .with_stamp_field("modified_at")
            .on_executing(&mut ctx, id, &CancellationToken::new())
            .await
            .unwrap();

        let entry = &ctx.change_set[id];
        assert_eq!(entry.state(), ProcessingState::Changed);
        assert!(entry.as_modification().unwrap().values["modified_at"].is_string());
    }

    #[tokio::test]
    async fn test_leaves_deletes_alone() {
        let mut cs = ChangeSet::new();
        let id = cs.push(DataModification::delete("products", "p1").into());
        cs[id].set_state(ProcessingState::PreEventing);
        let mut ctx = SubmitContext::new(CapabilityRegistry::new(), cs);

        AuditFilter::new()
            .with_stamp_field("modified_at")
            .on_executing(&mut ctx, id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ctx.change_set[id].state(), ProcessingState::PreEventing);
    }
}
