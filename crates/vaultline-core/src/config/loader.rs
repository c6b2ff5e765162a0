//! Configuration file loading and parsing

use crate::error::{Error, Result};
use crate::types::EngineConfig;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use std::fs;
use tracing::debug;

/// Configuration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["vaultline.yaml", "vaultline.yml"];

/// Loads and validates `vaultline.yaml`
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    search_dir: Utf8PathBuf,
}

impl ConfigLoader {
    /// Create a loader that searches the given directory
    pub fn new(search_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            search_dir: search_dir.into(),
        }
    }

    /// Load configuration from the specified path or search for it.
    ///
    /// When no path is given and no file is found, the defaults are used.
    pub fn load(&self, path: Option<&Utf8Path>) -> Result<EngineConfig> {
        let config = match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::config_not_found(p.as_str())
                    } else {
                        Error::Io(e)
                    }
                })?;
                debug!("Loaded configuration from {}", p);
                Self::parse(&content)?
            }
            None => match self.find_config() {
                Some(found) => {
                    let content = fs::read_to_string(&found)?;
                    debug!("Loaded configuration from {}", found);
                    Self::parse(&content)?
                }
                None => {
                    debug!("No configuration file found, using defaults");
                    EngineConfig::default()
                }
            },
        };

        Self::validate(&config)?;
        Ok(config)
    }

    /// Parse configuration from a YAML string
    pub fn parse(content: &str) -> Result<EngineConfig> {
        if content.trim().is_empty() {
            return Ok(EngineConfig::default());
        }
        Ok(serde_yaml_ng::from_str(content)?)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(config: &EngineConfig) -> Result<()> {
        if config.retry.max_attempts == 0 {
            return Err(Error::invalid_config("retry.max-attempts must be at least 1"));
        }

        if config.protection.max_reviewers == 0 {
            return Err(Error::invalid_config(
                "protection.max-reviewers must be at least 1",
            ));
        }

        let mut seen = HashSet::new();
        for project in &config.projects {
            if !seen.insert(project.id.as_str()) {
                return Err(Error::invalid_config(format!(
                    "duplicate project id: {}",
                    project.id
                )));
            }
            if project.owner.is_empty() || project.repo.is_empty() {
                return Err(Error::invalid_config(format!(
                    "project {} needs both owner and repo",
                    project.id
                )));
            }
        }

        for pattern in &config.sync.global_exclusions {
            regex::Regex::new(pattern)
                .map_err(|e| Error::invalid_pattern(pattern, e.to_string()))?;
        }

        Ok(())
    }

    fn find_config(&self) -> Option<Utf8PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| self.search_dir.join(name))
            .find(|candidate| candidate.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(".")
    }
}
