//! Engine facade
//!
//! [`Engine`] wires the quota governor, key cache, sync resolver and
//! provisioner around one remote account client. Run one engine per
//! account; engines share nothing.

use std::sync::Arc;
use std::time::Duration;
use vaultline_core::types::{EngineConfig, ProjectConfig};
use vaultline_core::ConfigLoader;

use crate::audit::{AuditOperation, AuditRecord, AuditSink, MemoryAuditSink};
use crate::encryption::{KeyCache, KeyCacheStats};
use crate::error::{Error, Result};
use crate::exclusion::compile_pattern;
use crate::linked::{AssumePresent, ResourceChecker, StaticResourceChecker};
use crate::provision::{ProvisionRequest, Provisioner};
use crate::quota::QuotaGovernor;
use crate::remote::{EnvironmentApi, SecretStoreApi};
use crate::resilient::ResilientCaller;
use crate::security::SecretString;
use crate::source::SourceScope;
use crate::store::{MemoryStore, Store};
use crate::sync::{SyncResolver, SyncSettings};
use crate::types::{
    Destination, ExclusionPattern, OperationContext, PatternScope, ProvisionOutcome,
    QuotaCategory, QuotaRecord, SecretReport, SecretScope, SyncSummary,
};

/// Builder for an [`Engine`]
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use vaultline_core::EngineConfig;
/// use vaultline_engine::{EngineBuilder, GitHubClient};
///
/// # fn build() -> vaultline_engine::Result<()> {
/// let config = EngineConfig::default();
/// let client = Arc::new(GitHubClient::from_env(&config.github)?);
/// let _engine = EngineBuilder::new(config).github(client).build()?;
/// # Ok(())
/// # }
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    secrets_api: Option<Arc<dyn SecretStoreApi>>,
    environment_api: Option<Arc<dyn EnvironmentApi>>,
    store: Option<Arc<dyn Store>>,
    audit: Option<Arc<dyn AuditSink>>,
    checker: Option<Arc<dyn ResourceChecker>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            secrets_api: None,
            environment_api: None,
            store: None,
            audit: None,
            checker: None,
        }
    }

    /// Use one client for both secret and environment calls
    pub fn github<C>(mut self, client: Arc<C>) -> Self
    where
        C: SecretStoreApi + EnvironmentApi + 'static,
    {
        let secrets: Arc<dyn SecretStoreApi> = client.clone();
        let environments: Arc<dyn EnvironmentApi> = client;
        self.secrets_api = Some(secrets);
        self.environment_api = Some(environments);
        self
    }

    pub fn secrets_api(mut self, api: Arc<dyn SecretStoreApi>) -> Self {
        self.secrets_api = Some(api);
        self
    }

    pub fn environment_api(mut self, api: Arc<dyn EnvironmentApi>) -> Self {
        self.environment_api = Some(api);
        self
    }

    /// Defaults to an in-memory store
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to an in-memory sink
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Defaults to a [`StaticResourceChecker`] over the `linked-resources`
    /// config section, or [`AssumePresent`] when the section is absent
    pub fn resource_checker(mut self, checker: Arc<dyn ResourceChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn build(self) -> Result<Engine> {
        ConfigLoader::validate(&self.config)?;

        let secrets_api = self
            .secrets_api
            .ok_or_else(|| Error::validation("engine needs a secret store API"))?;
        let environment_api = self
            .environment_api
            .ok_or_else(|| Error::validation("engine needs an environment API"))?;
        let store: Arc<dyn Store> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let audit: Arc<dyn AuditSink> = match self.audit {
            Some(audit) => audit,
            None => Arc::new(MemoryAuditSink::new()),
        };
        let checker: Arc<dyn ResourceChecker> =
            match (self.checker, &self.config.linked_resources) {
                (Some(checker), _) => checker,
                (None, Some(known)) => Arc::new(StaticResourceChecker::from_config(known)),
                (None, None) => Arc::new(AssumePresent),
            };

        let config = self.config;
        let caller = ResilientCaller::new(config.retry.clone());
        let quota = Arc::new(QuotaGovernor::new(
            secrets_api.clone(),
            store.clone(),
            caller.clone(),
            &config.quota,
        ));
        let keys = Arc::new(KeyCache::new(
            secrets_api.clone(),
            caller.clone(),
            Duration::from_secs(config.encryption.key_ttl_secs),
        ));

        let resolver = SyncResolver::new(
            secrets_api.clone(),
            store.clone(),
            audit.clone(),
            quota.clone(),
            keys.clone(),
            caller.clone(),
            SyncSettings::from_config(&config),
        );
        let provisioner = Provisioner::new(
            environment_api,
            secrets_api,
            store.clone(),
            audit.clone(),
            quota.clone(),
            keys.clone(),
            checker,
            caller,
            config.protection.clone(),
            config.quota.write_cost,
        );

        Ok(Engine {
            config,
            store,
            audit,
            quota,
            keys,
            resolver,
            provisioner,
        })
    }
}

/// Secret distribution and environment provisioning for one account
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    quota: Arc<QuotaGovernor>,
    keys: Arc<KeyCache>,
    resolver: SyncResolver,
    provisioner: Provisioner,
}

impl Engine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Look up a configured project
    pub fn project(&self, id: &str) -> Result<&ProjectConfig> {
        self.config
            .project(id)
            .ok_or_else(|| vaultline_core::Error::unknown_project(id).into())
    }

    /// Look up a project for an operation, auditing the refusal when unknown
    async fn operation_project(
        &self,
        ctx: &OperationContext,
        id: &str,
        operation: AuditOperation,
        subject: &str,
    ) -> Result<&ProjectConfig> {
        match self.project(id) {
            Ok(project) => Ok(project),
            Err(e) => {
                let record = AuditRecord::new(ctx, id, operation)
                    .subject(subject)
                    .status("error")
                    .counts(0, 1)
                    .error(e.to_string());
                self.audit.record(&record).await?;
                Err(e)
            }
        }
    }

    /// Sync one secret value to its target scopes
    pub async fn sync_secret(
        &self,
        ctx: &OperationContext,
        project: &str,
        name: &str,
        value: &SecretString,
        targets: &[SecretScope],
        force: bool,
    ) -> Result<SecretReport> {
        let project = self
            .operation_project(ctx, project, AuditOperation::SyncSecret, name)
            .await?;
        self.resolver
            .sync_secret(ctx, project, name, value, targets, force)
            .await
    }

    /// Sync every secret `source` holds for the project
    pub async fn sync_all_secrets(
        &self,
        ctx: &OperationContext,
        project: &str,
        source: &dyn SourceScope,
    ) -> Result<SyncSummary> {
        let project = self
            .operation_project(ctx, project, AuditOperation::SyncAllSecrets, source.name())
            .await?;
        self.resolver.sync_all_secrets(ctx, project, source).await
    }

    /// Delete a secret from its target scopes
    pub async fn remove_secret(
        &self,
        ctx: &OperationContext,
        project: &str,
        name: &str,
        targets: &[SecretScope],
    ) -> Result<SecretReport> {
        let project = self
            .operation_project(ctx, project, AuditOperation::RemoveSecret, name)
            .await?;
        self.resolver.remove_secret(ctx, project, name, targets).await
    }

    /// Create or update a protected deployment environment
    pub async fn provision_environment(
        &self,
        ctx: &OperationContext,
        project: &str,
        request: &ProvisionRequest,
    ) -> Result<ProvisionOutcome> {
        let project = self
            .operation_project(
                ctx,
                project,
                AuditOperation::ProvisionEnvironment,
                request.name.as_str(),
            )
            .await?;
        self.provisioner
            .provision_environment(ctx, project, request)
            .await
    }

    /// Refresh and persist live quota counters
    pub async fn check_quota(
        &self,
        ctx: &OperationContext,
        account: &str,
        category: QuotaCategory,
    ) -> Result<QuotaRecord> {
        self.quota.check_quota(ctx, account, category).await
    }

    /// Refresh and refuse when `required` would eat into the reserve
    pub async fn block_if_insufficient(
        &self,
        ctx: &OperationContext,
        account: &str,
        category: QuotaCategory,
        required: u64,
    ) -> Result<QuotaRecord> {
        self.quota
            .block_if_insufficient(ctx, account, category, required)
            .await
    }

    /// Last persisted quota snapshot, without a remote call
    pub async fn get_cached_quota(
        &self,
        account: &str,
        category: QuotaCategory,
    ) -> Result<Option<QuotaRecord>> {
        self.quota.get_cached_quota(account, category).await
    }

    /// Persist an exclusion pattern after checking that it compiles
    ///
    /// Returns false when the same pattern was already stored.
    pub async fn add_exclusion_pattern(&self, pattern: ExclusionPattern) -> Result<bool> {
        compile_pattern(&pattern.pattern)?;
        if let PatternScope::Project(project) = &pattern.scope {
            self.project(project)?;
        }
        self.store.add_exclusion(&pattern).await
    }

    /// Configured global patterns followed by stored ones
    pub async fn list_exclusions(&self) -> Result<Vec<ExclusionPattern>> {
        let mut patterns = SyncSettings::from_config(&self.config).global_exclusions;
        patterns.extend(self.store.list_exclusions().await?);
        Ok(patterns)
    }

    pub async fn key_cache_stats(&self) -> KeyCacheStats {
        self.keys.stats().await
    }

    /// Force the next encryption for `dest` to re-fetch its key
    pub async fn invalidate_key(&self, dest: &Destination) {
        self.keys.invalidate(dest).await
    }
}
