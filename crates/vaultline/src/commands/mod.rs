//! Command implementations

pub mod exclusions;
pub mod provision;
pub mod quota;
pub mod sync;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use vaultline_core::{ConfigLoader, EngineConfig};
use vaultline_engine::{
    EngineBuilder, Engine, FileStore, GitHubClient, JsonlAuditLog, OperationContext,
    SecretString,
};

use crate::cli::GlobalArgs;

const CONFIG_FILE_NAMES: [&str; 2] = ["vaultline.yaml", "vaultline.yml"];

/// An engine plus the context for the current invocation
pub struct Session {
    pub engine: Engine,
    pub ctx: OperationContext,
}

/// Load configuration from `--config`, the working directory, or the user config dir
pub fn load_config(global: &GlobalArgs) -> Result<EngineConfig> {
    let loader = ConfigLoader::default();
    let path = global.config.clone().or_else(discover_config);
    let config = loader
        .load(path.as_deref())
        .context("Failed to load configuration")?;
    Ok(config)
}

fn discover_config() -> Option<Utf8PathBuf> {
    let mut search_dirs = vec![Utf8PathBuf::from(".")];
    if let Some(user) = dirs::config_dir().and_then(|d| Utf8PathBuf::from_path_buf(d).ok()) {
        search_dirs.push(user.join("vaultline"));
    }

    search_dirs
        .iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.exists())
}

/// Build an engine backed by the configured state file, audit log and token
pub async fn open(global: &GlobalArgs) -> Result<Session> {
    let config = load_config(global)?;

    let client = GitHubClient::from_env(&config.github)
        .with_context(|| format!("Set {} to a token for the target account", config.github.token_env))?;
    let store = FileStore::open(&config.storage.state_path)
        .await
        .with_context(|| format!("Failed to open state file {}", config.storage.state_path.display()))?;
    let audit = JsonlAuditLog::new(&config.storage.audit_path);
    debug!(
        "State at {}, audit log at {}",
        config.storage.state_path.display(),
        config.storage.audit_path.display()
    );
    if config.linked_resources.is_none() {
        debug!("No linked-resources section; linked references are not checked");
    }

    let engine = EngineBuilder::new(config)
        .github(Arc::new(client))
        .store(Arc::new(store))
        .audit(Arc::new(audit))
        .build()?;

    let mut ctx = OperationContext::new(&global.actor);
    if let Some(secs) = global.timeout {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }

    Ok(Session { engine, ctx })
}

/// Read a secret value from the named environment variable
pub fn value_from_env(var: &str) -> Result<SecretString> {
    let value = std::env::var(var)
        .with_context(|| format!("Environment variable {} is not set", var))?;
    Ok(SecretString::new(value))
}

/// Read a secret value from stdin, dropping the trailing newline
pub fn value_from_stdin() -> Result<SecretString> {
    let mut value = String::new();
    std::io::stdin()
        .read_line(&mut value)
        .context("Failed to read secret value from stdin")?;
    let len = value.trim_end_matches(['\r', '\n']).len();
    value.truncate(len);
    Ok(SecretString::new(value))
}
