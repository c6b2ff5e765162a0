//! Exclusion pattern commands

use anyhow::Result;
use clap::{Args, Subcommand};
use tabled::Tabled;
use vaultline_engine::types::PatternScope;
use vaultline_engine::ExclusionPattern;

use super::open;
use crate::cli::GlobalArgs;
use crate::output;

#[derive(Subcommand, Debug)]
pub enum ExclusionCommands {
    /// Persist a new exclusion pattern
    Add(AddArgs),

    /// List configured and stored patterns
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Regular expression matched against secret names
    pub pattern: String,

    /// Limit the pattern to one project; global when omitted
    #[arg(short, long)]
    pub project: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct PatternRow {
    pattern: String,
    scope: String,
}

pub async fn run(cmd: ExclusionCommands, global: &GlobalArgs) -> Result<()> {
    match cmd {
        ExclusionCommands::Add(args) => add(args, global).await,
        ExclusionCommands::List(args) => list(args, global).await,
    }
}

async fn add(args: AddArgs, global: &GlobalArgs) -> Result<()> {
    let pattern = match args.project {
        Some(project) => ExclusionPattern::project(project, args.pattern),
        None => ExclusionPattern::global(args.pattern),
    };

    let session = open(global).await?;
    if session.engine.add_exclusion_pattern(pattern.clone()).await? {
        output::success(&format!("Added exclusion {}", pattern.pattern));
    } else {
        output::info(&format!("Exclusion {} already exists", pattern.pattern));
    }
    Ok(())
}

async fn list(args: ListArgs, global: &GlobalArgs) -> Result<()> {
    let session = open(global).await?;
    let patterns = session.engine.list_exclusions().await?;

    if args.json {
        return output::json(&patterns);
    }
    if patterns.is_empty() {
        output::info("No exclusion patterns configured");
        return Ok(());
    }

    let rows = patterns
        .into_iter()
        .map(|p| PatternRow {
            scope: match p.scope {
                PatternScope::Global => "global".to_string(),
                PatternScope::Project(project) => project,
            },
            pattern: p.pattern,
        })
        .collect();
    output::table::<PatternRow>(rows);
    Ok(())
}
