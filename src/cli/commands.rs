//! CLI command implementations
//!
//! `check` loads and validates a configuration. `submit` builds the
//! reference pipeline from it (in-memory store, policy authorizer,
//! schema validator, audit filter), runs one changeset through it and
//! prints the outcome.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::observability::{Logger, MetricsSnapshot};
use crate::submit::{
    AuditFilter, CancellationToken, CapabilityRegistry, ChangeSet, EntryRequest, InMemoryStore,
    PolicyAuthorizer, PolicyConfig, Principal, SchemaValidator, StoreExecutor, StorePreparer,
    SubmitConfig, SubmitContext, SubmitHandler, SubmitOutcome, SubmitResult,
};

use super::args::{Command, PrincipalArgs};
use super::errors::{CliError, CliResult};
use super::io::{read_change_set, write_error, write_response};

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Orchestrator limits and logging
    #[serde(default)]
    pub submit: SubmitConfig,

    /// Access and validation rules
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Property stamped with the current time on inserts and updates
    #[serde(default)]
    pub stamp_field: Option<String>,

    /// Actions the executor acknowledges; any other invocation fails
    #[serde(default)]
    pub actions: BTreeSet<String>,

    /// Collection → documents loaded into the store before submitting
    #[serde(default)]
    pub seed: BTreeMap<String, Vec<Value>>,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::config_error(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> CliResult<()> {
        self.submit
            .validate()
            .map_err(|e| CliError::config_error(e.to_string()))?;
        SchemaValidator::from_config(&self.policy)
            .map_err(|e| CliError::config_error(e.to_string()))?;

        if let Some(field) = &self.stamp_field {
            if field.is_empty() {
                return Err(CliError::config_error("stamp_field must not be empty"));
            }
        }

        for (collection, documents) in &self.seed {
            if let Some(pos) = documents.iter().position(|d| !d.is_object()) {
                return Err(CliError::config_error(format!(
                    "seed document {} of '{}' is not an object",
                    pos, collection
                )));
            }
        }
        Ok(())
    }
}

/// Changeset document read from `--input` or stdin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSetDocument {
    pub entries: Vec<EntryRequest>,
}

/// Reference pipeline assembled from a `Config`
pub struct Pipeline {
    handler: SubmitHandler,
    registry: CapabilityRegistry,
    store: Arc<InMemoryStore>,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> CliResult<Self> {
        let store = Arc::new(InMemoryStore::new());
        for (collection, documents) in &config.seed {
            store.seed(collection, documents.clone())?;
        }

        let validator = SchemaValidator::from_config(&config.policy)?;
        let filter = match &config.stamp_field {
            Some(field) => AuditFilter::new().with_stamp_field(field.clone()),
            None => AuditFilter::new(),
        };
        let executor = config
            .actions
            .iter()
            .fold(StoreExecutor::new(Arc::clone(&store)), |executor, name| {
                executor.with_action(name.clone(), |arguments| {
                    Ok(json!({"acknowledged": true, "arguments": arguments}))
                })
            });

        let registry = CapabilityRegistry::new()
            .with_preparer(StorePreparer::new(Arc::clone(&store)))
            .with_authorizer(PolicyAuthorizer::new(config.policy.clone()))
            .with_validator(validator)
            .with_filter(filter)
            .with_executor(executor);

        Ok(Self {
            handler: SubmitHandler::new(config.submit.clone()),
            registry,
            store,
        })
    }

    /// Submit one changeset as `principal`
    pub async fn submit(
        &self,
        change_set: ChangeSet,
        principal: Principal,
        cancel: &CancellationToken,
    ) -> SubmitResult<SubmitOutcome> {
        let mut ctx =
            SubmitContext::new(self.registry.clone(), change_set).with_principal(principal);
        self.handler.submit(&mut ctx, cancel).await
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.handler.metrics().snapshot()
    }
}

/// Run the CLI
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run a specific command
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Submit {
            config,
            input,
            principal,
        } => submit(&config, input.as_deref(), &principal),
        Command::Check { config } => check(&config),
    }
}

/// Validate a configuration file and report what it registers
pub fn check(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let pipeline = Pipeline::from_config(&config)?;

    let registered: Vec<&str> = pipeline
        .registry
        .registered()
        .into_iter()
        .map(|c| c.as_str())
        .collect();
    let seeded: BTreeMap<&str, usize> = config
        .seed
        .iter()
        .map(|(collection, docs)| (collection.as_str(), docs.len()))
        .collect();

    write_response(json!({
        "valid": true,
        "capabilities": registered,
        "seeded": seeded,
        "max_entries": config.submit.max_entries,
        "max_pre_event_rounds": config.submit.max_pre_event_rounds,
    }))
}

/// Submit a changeset and print the outcome
///
/// Failures are printed as an error response and also returned so the
/// process exits non-zero.
pub fn submit(
    config_path: &Path,
    input: Option<&Path>,
    principal: &PrincipalArgs,
) -> CliResult<()> {
    let config = Config::load(config_path)?;
    Logger::set_min_severity(config.submit.severity()?);

    let document = read_change_set(input)?;
    let pipeline = Pipeline::from_config(&config)?;
    let change_set = ChangeSet::from_requests(document.entries);
    let principal = principal.to_principal();

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::runtime_error(format!("Failed to create runtime: {}", e)))?;

    let result = rt.block_on(async {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };
        let result = pipeline.submit(change_set, principal, &cancel).await;
        watcher.abort();
        result
    });

    match result {
        Ok(outcome) => write_response(json!({
            "outcome": outcome,
            "metrics": pipeline.metrics(),
        })),
        Err(err) => {
            let details = err
                .validation_results()
                .map(serde_json::to_value)
                .transpose()?;
            write_error(err.code(), &err.to_string(), details)?;
            Err(err.into())
        }
    }
}
