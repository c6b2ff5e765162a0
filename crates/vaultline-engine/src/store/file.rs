use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Store, StoreState};
use crate::error::{Error, Result};
use crate::types::{
    EnvironmentConfig, EnvironmentName, ExclusionPattern, QuotaCategory, QuotaRecord,
    SecretMapping,
};

/// Store backed by a single JSON document
///
/// Every mutation rewrites the document through a temporary file and a
/// rename, so a crash leaves either the old or the new state on disk. The
/// in-memory copy only changes after the write succeeded.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => StoreState::default(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                Error::store(format!("corrupt state file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting empty", path.display());
                StoreState::default()
            }
            Err(e) => {
                return Err(Error::store(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&*self.state.lock().await)
    }

    async fn mutate<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> Result<R> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let out = f(&mut next);
        self.persist(&next).await?;
        *state = next;
        Ok(out)
    }

    async fn persist(&self, state: &StoreState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::store(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| Error::store(format!("failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            Error::store(format!("failed to replace {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get_mapping(&self, project: &str, name: &str) -> Result<Option<SecretMapping>> {
        Ok(self.read(|s| s.get_mapping(project, name)).await)
    }

    async fn upsert_mapping(&self, mapping: &SecretMapping) -> Result<()> {
        self.mutate(|s| s.upsert_mapping(mapping)).await
    }

    async fn delete_mapping(&self, project: &str, name: &str) -> Result<bool> {
        self.mutate(|s| s.delete_mapping(project, name)).await
    }

    async fn list_mappings(&self, project: &str) -> Result<Vec<SecretMapping>> {
        Ok(self.read(|s| s.list_mappings(project)).await)
    }

    async fn get_quota(
        &self,
        account: &str,
        category: QuotaCategory,
    ) -> Result<Option<QuotaRecord>> {
        Ok(self.read(|s| s.get_quota(account, category)).await)
    }

    async fn upsert_quota(&self, record: &QuotaRecord) -> Result<()> {
        self.mutate(|s| s.upsert_quota(record)).await
    }

    async fn get_environment(
        &self,
        project: &str,
        name: EnvironmentName,
    ) -> Result<Option<EnvironmentConfig>> {
        Ok(self.read(|s| s.get_environment(project, name)).await)
    }

    async fn upsert_environment(&self, environment: &EnvironmentConfig) -> Result<()> {
        self.mutate(|s| s.upsert_environment(environment)).await
    }

    async fn list_exclusions(&self) -> Result<Vec<ExclusionPattern>> {
        Ok(self.read(|s| s.exclusions.clone()).await)
    }

    async fn add_exclusion(&self, pattern: &ExclusionPattern) -> Result<bool> {
        self.mutate(|s| s.add_exclusion(pattern)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = FileStore::open(&path).await.unwrap();
        let mut mapping = SecretMapping::new("web", "API_KEY", "source");
        mapping.value_hash = Some("abc".to_string());
        store.upsert_mapping(&mapping).await.unwrap();
        store
            .upsert_quota(&QuotaRecord {
                account: "acme".to_string(),
                category: QuotaCategory::Secrets,
                remaining: 4999,
                limit: 5000,
                reset_at: Utc::now(),
                observed_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .add_exclusion(&ExclusionPattern::global("^GITHUB_TOKEN$"))
            .await
            .unwrap();
        drop(store);

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get_mapping("web", "API_KEY").await.unwrap(),
            Some(mapping)
        );
        assert_eq!(
            reopened
                .get_quota("acme", QuotaCategory::Secrets)
                .await
                .unwrap()
                .map(|q| q.remaining),
            Some(4999)
        );
        assert_eq!(reopened.list_exclusions().await.unwrap().len(), 1);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileStore::open(&path).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("state.json")).await.unwrap();
        assert!(store.list_mappings("web").await.unwrap().is_empty());
        assert!(!store.delete_mapping("web", "X").await.unwrap());
    }
}
