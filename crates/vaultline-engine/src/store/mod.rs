//! Persistence for mappings, quota records, environments and exclusions
//!
//! The engine needs nothing beyond keyed get and upsert on each row type,
//! so any ordered key-value store with atomic writes can back it.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{
    EnvironmentConfig, EnvironmentName, ExclusionPattern, QuotaCategory, QuotaRecord,
    SecretMapping,
};

/// Keyed persistence used by the engine
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_mapping(&self, project: &str, name: &str) -> Result<Option<SecretMapping>>;

    async fn upsert_mapping(&self, mapping: &SecretMapping) -> Result<()>;

    /// Returns whether a row was removed
    async fn delete_mapping(&self, project: &str, name: &str) -> Result<bool>;

    async fn list_mappings(&self, project: &str) -> Result<Vec<SecretMapping>>;

    async fn get_quota(&self, account: &str, category: QuotaCategory)
        -> Result<Option<QuotaRecord>>;

    async fn upsert_quota(&self, record: &QuotaRecord) -> Result<()>;

    async fn get_environment(
        &self,
        project: &str,
        name: EnvironmentName,
    ) -> Result<Option<EnvironmentConfig>>;

    async fn upsert_environment(&self, environment: &EnvironmentConfig) -> Result<()>;

    async fn list_exclusions(&self) -> Result<Vec<ExclusionPattern>>;

    /// Returns false when an identical pattern already exists
    async fn add_exclusion(&self, pattern: &ExclusionPattern) -> Result<bool>;
}

/// All persisted rows, keyed by natural key
///
/// Shared by both store implementations; `FileStore` writes it as one JSON
/// document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoreState {
    #[serde(default)]
    mappings: BTreeMap<String, SecretMapping>,
    #[serde(default)]
    quotas: BTreeMap<String, QuotaRecord>,
    #[serde(default)]
    environments: BTreeMap<String, EnvironmentConfig>,
    #[serde(default)]
    exclusions: Vec<ExclusionPattern>,
}

fn mapping_key(project: &str, name: &str) -> String {
    format!("{}/{}", project, name)
}

fn quota_key(account: &str, category: QuotaCategory) -> String {
    format!("{}/{}", account, category)
}

fn environment_key(project: &str, name: EnvironmentName) -> String {
    format!("{}/{}", project, name)
}

impl StoreState {
    fn get_mapping(&self, project: &str, name: &str) -> Option<SecretMapping> {
        self.mappings.get(&mapping_key(project, name)).cloned()
    }

    fn upsert_mapping(&mut self, mapping: &SecretMapping) {
        self.mappings.insert(
            mapping_key(&mapping.project_id, &mapping.name),
            mapping.clone(),
        );
    }

    fn delete_mapping(&mut self, project: &str, name: &str) -> bool {
        self.mappings.remove(&mapping_key(project, name)).is_some()
    }

    fn list_mappings(&self, project: &str) -> Vec<SecretMapping> {
        self.mappings
            .values()
            .filter(|m| m.project_id == project)
            .cloned()
            .collect()
    }

    fn get_quota(&self, account: &str, category: QuotaCategory) -> Option<QuotaRecord> {
        self.quotas.get(&quota_key(account, category)).cloned()
    }

    fn upsert_quota(&mut self, record: &QuotaRecord) {
        self.quotas
            .insert(quota_key(&record.account, record.category), record.clone());
    }

    fn get_environment(&self, project: &str, name: EnvironmentName) -> Option<EnvironmentConfig> {
        self.environments.get(&environment_key(project, name)).cloned()
    }

    fn upsert_environment(&mut self, environment: &EnvironmentConfig) {
        self.environments.insert(
            environment_key(&environment.project_id, environment.name),
            environment.clone(),
        );
    }

    fn add_exclusion(&mut self, pattern: &ExclusionPattern) -> bool {
        if self.exclusions.contains(pattern) {
            return false;
        }
        self.exclusions.push(pattern.clone());
        true
    }
}
