//! Deployment environment provisioning command

use anyhow::Result;
use clap::Args;
use vaultline_engine::types::{LinkedResource, ResourceKind};
use vaultline_engine::{EnvironmentName, ProtectionRules, ProvisionRequest, Reviewer};

use super::{open, value_from_env};
use crate::cli::GlobalArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Environment to provision (dev, staging, production)
    #[arg(value_parser = parse_environment)]
    pub environment: EnvironmentName,

    /// Project id from the configuration
    #[arg(short, long)]
    pub project: String,

    /// Required reviewer as user:<id> or team:<id> (repeatable)
    #[arg(short, long = "reviewer", value_parser = parse_reviewer)]
    pub reviewers: Vec<Reviewer>,

    /// Minutes to wait before a deployment proceeds
    #[arg(long, default_value_t = 0)]
    pub wait_timer: u32,

    /// Environment secret to write, read from the variable of the same name (repeatable)
    #[arg(short, long = "secret")]
    pub secrets: Vec<String>,

    /// Database branch the environment uses (repeatable)
    #[arg(long = "database-branch")]
    pub database_branches: Vec<String>,

    /// Compute worker the environment uses (repeatable)
    #[arg(long = "worker")]
    pub workers: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_environment(raw: &str) -> std::result::Result<EnvironmentName, String> {
    raw.parse().map_err(|e: vaultline_engine::Error| e.to_string())
}

fn parse_reviewer(raw: &str) -> std::result::Result<Reviewer, String> {
    let (kind, id) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected user:<id> or team:<id>, got {}", raw))?;
    let id: u64 = id
        .parse()
        .map_err(|_| format!("reviewer id must be numeric, got {}", id))?;
    match kind {
        "user" => Ok(Reviewer::user(id)),
        "team" => Ok(Reviewer::team(id)),
        other => Err(format!("unknown reviewer type: {}", other)),
    }
}

pub async fn run(args: ProvisionArgs, global: &GlobalArgs) -> Result<()> {
    let mut request = ProvisionRequest::new(args.environment).with_rules(ProtectionRules {
        reviewers: args.reviewers,
        restrict_branches: false,
        wait_timer_minutes: args.wait_timer,
    });
    for name in &args.secrets {
        request = request.with_secret(name.clone(), value_from_env(name)?);
    }
    for id in args.database_branches {
        request = request.with_linked(LinkedResource::new(ResourceKind::DatabaseBranch, id));
    }
    for id in args.workers {
        request = request.with_linked(LinkedResource::new(ResourceKind::ComputeWorker, id));
    }

    let session = open(global).await?;
    let outcome = session
        .engine
        .provision_environment(&session.ctx, &args.project, &request)
        .await?;

    if args.json {
        return output::json(&outcome);
    }

    let env = &outcome.environment;
    output::success(&format!("{} {}", env.name, outcome.status));
    if let Some(id) = env.remote_environment_id {
        output::kv("remote id", &id.to_string());
    }
    output::kv(
        "reviewers",
        &env.protection_rules.required_reviewers().to_string(),
    );
    output::kv(
        "branches",
        if env.protection_rules.restrict_branches {
            "main line only"
        } else {
            "any"
        },
    );
    output::kv(
        "wait timer",
        &format!("{} min", env.protection_rules.wait_timer_minutes),
    );
    output::kv("secrets", &env.secrets.len().to_string());
    output::kv("correlation id", &outcome.correlation_id.to_string());
    Ok(())
}
