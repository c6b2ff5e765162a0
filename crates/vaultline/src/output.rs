//! Terminal output utilities

use console::style;
use tabled::{settings::Style, Table, Tabled};
use vaultline_engine::types::{TargetOutcome, TargetStatus};
use vaultline_engine::{SecretReport, SecretSyncStatus};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a header
pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", style(key).dim(), value);
}

/// Print any serializable value as pretty JSON
pub fn json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render rows with the shared table style
pub fn table<T: Tabled>(rows: Vec<T>) {
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
}

#[derive(Tabled)]
struct TargetRow {
    scope: String,
    status: String,
    error: String,
}

impl From<&TargetOutcome> for TargetRow {
    fn from(outcome: &TargetOutcome) -> Self {
        let status = match outcome.status {
            TargetStatus::Written => "written",
            TargetStatus::Unchanged => "unchanged",
            TargetStatus::Removed => "removed",
            TargetStatus::Failed => "failed",
        };
        Self {
            scope: outcome.scope.to_string(),
            status: status.to_string(),
            error: outcome.error.clone().unwrap_or_default(),
        }
    }
}

/// Print a one-line verdict for a secret and a table of its targets
pub fn report(report: &SecretReport) {
    let line = format!("{}: {}", report.name, report.status);
    match report.status {
        SecretSyncStatus::Synced => success(&line),
        SecretSyncStatus::Unchanged | SecretSyncStatus::Skipped => info(&line),
        SecretSyncStatus::Conflict | SecretSyncStatus::Failed => error(&line),
    }
    if let Some(message) = &report.message {
        kv("detail", message);
    }
    if !report.targets.is_empty() {
        table(report.targets.iter().map(TargetRow::from).collect());
    }
}
