//! CLI module
//!
//! Provides command-line interface for:
//! - submit: run one changeset through the full pipeline
//! - check: validate a configuration file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, PrincipalArgs};
pub use commands::{check, run, run_command, submit, ChangeSetDocument, Config, Pipeline};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_change_set, write_error, write_response};
