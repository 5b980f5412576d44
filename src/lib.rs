//! changeset-pipeline - changeset submission pipeline
//!
//! Takes a batch of pending data modifications and action invocations
//! and drives it through authorization, validation, pre-event hooks,
//! persistence and post-event hooks.

pub mod cli;
pub mod observability;
pub mod submit;
