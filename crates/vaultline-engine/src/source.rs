//! Source-of-truth scope readers
//!
//! A source scope supplies the current names and values of a project's
//! secrets. The engine does not decide what exists; it only propagates.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::security::SecretString;

/// Supplies the secrets currently present in the source scope
#[async_trait]
pub trait SourceScope: Send + Sync {
    /// Scope name recorded on mappings
    fn name(&self) -> &str;

    /// Every (name, value) pair for `project`, in a stable order
    async fn list(&self, project: &str) -> Result<Vec<(String, SecretString)>>;
}

/// Reads secrets from dotenv files
///
/// When `path` is a directory, each project reads `<path>/<project>.env`;
/// otherwise the single file is used for every project.
#[derive(Debug, Clone)]
pub struct EnvFileSource {
    name: String,
    path: PathBuf,
}

impl EnvFileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    fn file_for(&self, project: &str) -> PathBuf {
        if self.path.is_dir() {
            self.path.join(format!("{}.env", project))
        } else {
            self.path.clone()
        }
    }

    fn parse(path: &Path) -> Result<Vec<(String, SecretString)>> {
        let iter = dotenvy::from_path_iter(path).map_err(|e| {
            Error::validation(format!("cannot read source file {}: {}", path.display(), e))
        })?;

        let mut secrets = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                Error::validation(format!("invalid entry in {}: {}", path.display(), e))
            })?;
            secrets.push((key, SecretString::new(value)));
        }
        Ok(secrets)
    }
}

#[async_trait]
impl SourceScope for EnvFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, project: &str) -> Result<Vec<(String, SecretString)>> {
        let path = self.file_for(project);
        debug!("Reading source secrets for {} from {}", project, path.display());

        tokio::task::spawn_blocking(move || Self::parse(&path))
            .await
            .map_err(|e| Error::validation(format!("source read task failed: {}", e)))?
    }
}

/// In-memory source scope
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    name: String,
    secrets: BTreeMap<String, Vec<(String, SecretString)>>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secrets: BTreeMap::new(),
        }
    }

    /// Add a secret to `project`
    pub fn with_secret(
        mut self,
        project: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<SecretString>,
    ) -> Self {
        self.secrets
            .entry(project.into())
            .or_default()
            .push((name.into(), value.into()));
        self
    }
}

#[async_trait]
impl SourceScope for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, project: &str) -> Result<Vec<(String, SecretString)>> {
        Ok(self.secrets.get(project).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_env_file_single() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secrets.env");
        std::fs::write(&path, "API_KEY=v1\n# comment\nGITHUB_TOKEN=\"x\"\n").unwrap();

        let source = EnvFileSource::new("source", &path);
        let secrets = source.list("web").await.unwrap();

        assert_eq!(source.name(), "source");
        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets[0].0, "API_KEY");
        assert_eq!(secrets[0].1.expose(), "v1");
        assert_eq!(secrets[1].1.expose(), "x");
    }

    #[tokio::test]
    async fn test_env_directory_per_project() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("web.env"), "WEB_ONLY=1\n").unwrap();
        std::fs::write(dir.path().join("api.env"), "API_ONLY=2\n").unwrap();

        let source = EnvFileSource::new("source", dir.path());
        let web = source.list("web").await.unwrap();
        assert_eq!(web.len(), 1);
        assert_eq!(web[0].0, "WEB_ONLY");

        assert!(source.list("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticSource::new("source")
            .with_secret("web", "API_KEY", "v1")
            .with_secret("web", "GITHUB_TOKEN", "x");

        assert_eq!(source.list("web").await.unwrap().len(), 2);
        assert!(source.list("api").await.unwrap().is_empty());
    }
}
