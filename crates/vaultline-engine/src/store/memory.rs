use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Store, StoreState};
use crate::error::Result;
use crate::types::{
    EnvironmentConfig, EnvironmentName, ExclusionPattern, QuotaCategory, QuotaRecord,
    SecretMapping,
};

/// In-process store; contents are lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_mapping(&self, project: &str, name: &str) -> Result<Option<SecretMapping>> {
        Ok(self.state.read().await.get_mapping(project, name))
    }

    async fn upsert_mapping(&self, mapping: &SecretMapping) -> Result<()> {
        self.state.write().await.upsert_mapping(mapping);
        Ok(())
    }

    async fn delete_mapping(&self, project: &str, name: &str) -> Result<bool> {
        Ok(self.state.write().await.delete_mapping(project, name))
    }

    async fn list_mappings(&self, project: &str) -> Result<Vec<SecretMapping>> {
        Ok(self.state.read().await.list_mappings(project))
    }

    async fn get_quota(
        &self,
        account: &str,
        category: QuotaCategory,
    ) -> Result<Option<QuotaRecord>> {
        Ok(self.state.read().await.get_quota(account, category))
    }

    async fn upsert_quota(&self, record: &QuotaRecord) -> Result<()> {
        self.state.write().await.upsert_quota(record);
        Ok(())
    }

    async fn get_environment(
        &self,
        project: &str,
        name: EnvironmentName,
    ) -> Result<Option<EnvironmentConfig>> {
        Ok(self.state.read().await.get_environment(project, name))
    }

    async fn upsert_environment(&self, environment: &EnvironmentConfig) -> Result<()> {
        self.state.write().await.upsert_environment(environment);
        Ok(())
    }

    async fn list_exclusions(&self) -> Result<Vec<ExclusionPattern>> {
        Ok(self.state.read().await.exclusions.clone())
    }

    async fn add_exclusion(&self, pattern: &ExclusionPattern) -> Result<bool> {
        Ok(self.state.write().await.add_exclusion(pattern))
    }
}
