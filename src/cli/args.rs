//! CLI argument definitions using clap
//!
//! Commands:
//! - changeset submit --config <path> [--input <path>] [--role <r>]... [--service]
//! - changeset check --config <path>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use crate::submit::Principal;

/// changeset - submit batches of changes through the validation pipeline
#[derive(Parser, Debug)]
#[command(name = "changeset")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit a changeset and print the result
    Submit {
        /// Path to configuration file
        #[arg(long, default_value = "./changeset.json")]
        config: PathBuf,

        /// Changeset document; read from stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,

        #[command(flatten)]
        principal: PrincipalArgs,
    },

    /// Validate a configuration file and exit
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./changeset.json")]
        config: PathBuf,
    },
}

/// Who the submission runs as
#[derive(Args, Debug, Default)]
pub struct PrincipalArgs {
    /// User id; a random one is used when omitted
    #[arg(long)]
    pub user: Option<Uuid>,

    /// Role held by the user (repeatable)
    #[arg(long = "role")]
    pub roles: Vec<String>,

    /// Submit as a service principal, bypassing policy
    #[arg(long, conflicts_with_all = ["anonymous", "user"])]
    pub service: bool,

    /// Submit without a user id
    #[arg(long, conflicts_with = "user")]
    pub anonymous: bool,
}

impl PrincipalArgs {
    pub fn to_principal(&self) -> Principal {
        let principal = if self.service {
            Principal::service()
        } else if self.anonymous {
            Principal::anonymous()
        } else {
            Principal::user(self.user.unwrap_or_else(Uuid::new_v4))
        };
        self.roles
            .iter()
            .fold(principal, |p, role| p.with_role(role.clone()))
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
