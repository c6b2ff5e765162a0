//! Request quota command

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use tabled::Tabled;
use vaultline_engine::{QuotaCategory, QuotaRecord};

use super::{load_config, open};
use crate::cli::GlobalArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct QuotaArgs {
    /// Account to inspect; defaults to the first project's account
    #[arg(short, long)]
    pub account: Option<String>,

    /// Only this category (core, secrets, graphql)
    #[arg(long, value_parser = parse_category)]
    pub category: Option<QuotaCategory>,

    /// Show the last stored snapshot without calling the remote
    #[arg(long)]
    pub cached: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_category(raw: &str) -> std::result::Result<QuotaCategory, String> {
    raw.parse().map_err(|e: vaultline_engine::Error| e.to_string())
}

#[derive(Tabled)]
struct QuotaRow {
    category: String,
    remaining: u64,
    limit: u64,
    #[tabled(rename = "resets in")]
    resets_in: String,
    observed: String,
}

impl From<&QuotaRecord> for QuotaRow {
    fn from(record: &QuotaRecord) -> Self {
        Self {
            category: record.category.to_string(),
            remaining: record.remaining,
            limit: record.limit,
            resets_in: format!("{} min", record.minutes_until_reset(Utc::now())),
            observed: record.observed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub async fn run(args: QuotaArgs, global: &GlobalArgs) -> Result<()> {
    let account = match args.account {
        Some(account) => account,
        None => load_config(global)?
            .projects
            .first()
            .map(|p| p.account.clone())
            .context("No --account given and no projects configured")?,
    };
    let categories: Vec<QuotaCategory> = match args.category {
        Some(category) => vec![category],
        None => QuotaCategory::ALL.to_vec(),
    };

    let session = open(global).await?;
    let mut records = Vec::new();
    for category in categories {
        let record = if args.cached {
            session.engine.get_cached_quota(&account, category).await?
        } else {
            Some(
                session
                    .engine
                    .check_quota(&session.ctx, &account, category)
                    .await?,
            )
        };
        match record {
            Some(record) => records.push(record),
            None => output::warning(&format!("No stored quota for {} {}", account, category)),
        }
    }

    if args.json {
        return output::json(&records);
    }

    output::header(&format!("Quota for {}", account));
    if records.is_empty() {
        output::info("Nothing stored yet; run without --cached to fetch live counters");
        return Ok(());
    }
    output::table(records.iter().map(QuotaRow::from).collect());
    Ok(())
}
