//! Secret sync and removal commands

use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;
use vaultline_engine::{EnvFileSource, SecretReport, SecretScope, SecretSyncStatus};

use super::{open, value_from_env, value_from_stdin};
use crate::cli::GlobalArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Secret name
    pub name: String,

    /// Project id from the configuration
    #[arg(short, long)]
    pub project: String,

    /// Target scope (repeatable); defaults to the project's targets
    #[arg(short, long = "target", value_parser = parse_scope)]
    pub targets: Vec<SecretScope>,

    /// Environment variable holding the value (defaults to the secret name)
    #[arg(long, conflicts_with = "stdin")]
    pub from_env: Option<String>,

    /// Read the value from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Overwrite targets even when the value diverges from the last sync
    #[arg(short, long)]
    pub force: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SyncAllArgs {
    /// Project id from the configuration
    #[arg(short, long)]
    pub project: String,

    /// Dotenv file, or a directory holding <project>.env files
    #[arg(short, long)]
    pub source: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Secret name
    pub name: String,

    /// Project id from the configuration
    #[arg(short, long)]
    pub project: String,

    /// Target scope (repeatable); defaults to the scopes last synced
    #[arg(short, long = "target", value_parser = parse_scope)]
    pub targets: Vec<SecretScope>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_scope(raw: &str) -> std::result::Result<SecretScope, String> {
    raw.parse().map_err(|e: vaultline_engine::Error| e.to_string())
}

pub async fn run(args: SyncArgs, global: &GlobalArgs) -> Result<()> {
    let value = if args.stdin {
        value_from_stdin()?
    } else {
        value_from_env(args.from_env.as_deref().unwrap_or(&args.name))?
    };

    let session = open(global).await?;
    let report = session
        .engine
        .sync_secret(
            &session.ctx,
            &args.project,
            &args.name,
            &value,
            &args.targets,
            args.force,
        )
        .await?;

    finish(&report, args.json)
}

pub async fn run_all(args: SyncAllArgs, global: &GlobalArgs) -> Result<()> {
    let session = open(global).await?;
    let source = EnvFileSource::new(
        session.engine.config().sync.source_scope.clone(),
        &args.source,
    );

    let summary = session
        .engine
        .sync_all_secrets(&session.ctx, &args.project, &source)
        .await?;

    if args.json {
        output::json(&summary)?;
    } else {
        output::header(&format!("Sync of {}", args.project));
        for report in &summary.secrets {
            output::report(report);
        }
        println!();
        output::kv("synced", &summary.synced_count.to_string());
        output::kv("unchanged", &summary.unchanged_count.to_string());
        output::kv("skipped", &summary.skipped_count.to_string());
        output::kv("conflict", &summary.conflict_count.to_string());
        output::kv("failed", &summary.failed_count.to_string());
        output::kv("correlation id", &summary.correlation_id.to_string());
    }

    if summary.failed_count + summary.conflict_count > 0 {
        bail!(
            "{} secrets failed and {} conflicted",
            summary.failed_count,
            summary.conflict_count
        );
    }
    Ok(())
}

pub async fn remove(args: RemoveArgs, global: &GlobalArgs) -> Result<()> {
    let session = open(global).await?;
    let report = session
        .engine
        .remove_secret(&session.ctx, &args.project, &args.name, &args.targets)
        .await?;

    finish(&report, args.json)
}

fn finish(report: &SecretReport, json: bool) -> Result<()> {
    if json {
        output::json(report)?;
    } else {
        output::report(report);
    }

    match report.status {
        SecretSyncStatus::Conflict => {
            output::warning("Re-run with --force to overwrite the targets");
            bail!("{} was not synced", report.name)
        }
        SecretSyncStatus::Failed => bail!("{} failed on some targets", report.name),
        _ => Ok(()),
    }
}
