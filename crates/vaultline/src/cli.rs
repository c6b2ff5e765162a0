//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

pub use crate::commands::exclusions::ExclusionCommands;
pub use crate::commands::provision::ProvisionArgs;
pub use crate::commands::quota::QuotaArgs;
pub use crate::commands::sync::{RemoveArgs, SyncAllArgs, SyncArgs};

/// Vaultline - keep repository secrets and deployment environments in step
#[derive(Parser, Debug)]
#[command(name = "vaultline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to vaultline.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Actor recorded in the audit log
    #[arg(long, global = true, env = "VAULTLINE_ACTOR", default_value = "cli")]
    pub actor: String,

    /// Give up on remote calls after this many seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Options every command needs, detached from the subcommand
    pub fn global(&self) -> GlobalArgs {
        GlobalArgs {
            config: self.config.clone(),
            actor: self.actor.clone(),
            timeout: self.timeout,
        }
    }
}

/// Options shared by every command
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: Option<Utf8PathBuf>,
    pub actor: String,
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync one secret to its target scopes
    Sync(SyncArgs),

    /// Sync every secret in a source file to a project's targets
    SyncAll(SyncAllArgs),

    /// Remove a secret from its target scopes
    Remove(RemoveArgs),

    /// Create or update a deployment environment
    Provision(ProvisionArgs),

    /// Show request quota for an account
    Quota(QuotaArgs),

    /// Manage secret exclusion patterns
    #[command(subcommand)]
    Exclusions(ExclusionCommands),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let cli = Cli::try_parse_from([
            "vaultline",
            "quota",
            "--account",
            "acme-bot",
            "--cached",
            "--actor",
            "ops",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.global().actor, "ops");
        match cli.command {
            Commands::Quota(args) => assert!(args.cached),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_sync_targets_and_force() {
        let cli = Cli::try_parse_from([
            "vaultline",
            "sync",
            "API_KEY",
            "--project",
            "web",
            "--target",
            "actions",
            "--target",
            "environment:production",
            "--force",
        ])
        .unwrap();

        match cli.command {
            Commands::Sync(args) => {
                assert_eq!(args.name, "API_KEY");
                assert_eq!(args.targets.len(), 2);
                assert!(args.force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_target_rejected() {
        let result = Cli::try_parse_from([
            "vaultline",
            "sync",
            "API_KEY",
            "--project",
            "web",
            "--target",
            "kubernetes",
        ]);
        assert!(result.is_err());
    }
}
