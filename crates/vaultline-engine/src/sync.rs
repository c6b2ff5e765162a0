//! Secret propagation with conflict detection
//!
//! For every secret the resolver compares the fingerprint of the source
//! value with the fingerprint last propagated. A mismatch without `force`
//! is a conflict and nothing is written. Otherwise each target scope is
//! sealed, admitted, and written independently.
//!
//! Callers must not run two syncs of the same (project, secret) at once:
//! the read-compare-write sequence spans network round trips.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use vaultline_core::types::{EngineConfig, ProjectConfig};

use crate::audit::{AuditOperation, AuditRecord, AuditSink};
use crate::encryption::KeyCache;
use crate::error::{Error, Result};
use crate::exclusion::ExclusionMatcher;
use crate::quota::QuotaGovernor;
use crate::remote::SecretStoreApi;
use crate::resilient::ResilientCaller;
use crate::security::{sanitize_error, SecretString};
use crate::source::SourceScope;
use crate::store::Store;
use crate::types::{
    Destination, ExclusionPattern, OperationContext, QuotaCategory, RepoRef, SecretMapping,
    SecretReport, SecretScope, SecretSyncStatus, SyncStatus, SyncSummary, TargetOutcome,
    TargetStatus,
};

/// Settings the resolver takes from the engine configuration
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub source_scope: String,
    pub write_cost: u64,
    pub global_exclusions: Vec<ExclusionPattern>,
}

impl SyncSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            source_scope: config.sync.source_scope.clone(),
            write_cost: config.quota.write_cost,
            global_exclusions: config
                .sync
                .global_exclusions
                .iter()
                .map(ExclusionPattern::global)
                .collect(),
        }
    }
}

/// Propagates source secrets to target scopes
pub struct SyncResolver {
    api: Arc<dyn SecretStoreApi>,
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    quota: Arc<QuotaGovernor>,
    keys: Arc<KeyCache>,
    caller: ResilientCaller,
    settings: SyncSettings,
}

impl SyncResolver {
    pub fn new(
        api: Arc<dyn SecretStoreApi>,
        store: Arc<dyn Store>,
        audit: Arc<dyn AuditSink>,
        quota: Arc<QuotaGovernor>,
        keys: Arc<KeyCache>,
        caller: ResilientCaller,
        settings: SyncSettings,
    ) -> Self {
        Self {
            api,
            store,
            audit,
            quota,
            keys,
            caller,
            settings,
        }
    }

    /// Configured global patterns plus every persisted pattern
    pub async fn exclusions(&self) -> Result<ExclusionMatcher> {
        let stored = self.store.list_exclusions().await?;
        ExclusionMatcher::compile(self.settings.global_exclusions.iter().chain(stored.iter()))
    }

    /// Sync one secret to `targets` (or the project's default targets)
    ///
    /// Conflicts, exclusions and per-target failures are reported. Quota
    /// exhaustion, missing encryption keys and deadline expiry are raised
    /// after the targets that already succeeded have been persisted.
    pub async fn sync_secret(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        name: &str,
        value: &SecretString,
        targets: &[SecretScope],
        force: bool,
    ) -> Result<SecretReport> {
        let started = Instant::now();
        let existing = self.store.get_mapping(&project.id, name).await?;

        if let Some(hit) = self.exclusions().await?.matches(&project.id, name) {
            debug!(
                project = %project.id,
                secret = %name,
                pattern = %hit.pattern,
                global = hit.global,
                "secret excluded"
            );
            let mut mapping = existing.unwrap_or_else(|| self.new_mapping(project, name));
            mapping.is_excluded = true;
            self.store.upsert_mapping(&mapping).await?;
            return self
                .finish_skipped(ctx, project, name, AuditOperation::SyncSecret, hit.pattern, started)
                .await;
        }

        let targets = match resolve_targets(project, targets) {
            Ok(targets) => targets,
            Err(e) => {
                return self
                    .reject(ctx, project, name, AuditOperation::SyncSecret, e, started)
                    .await
            }
        };
        let new_hash = value.fingerprint();
        let mut mapping = existing.unwrap_or_else(|| self.new_mapping(project, name));
        mapping.is_excluded = false;
        mapping.target_scopes = targets.clone();

        if !force && mapping.value_hash.as_deref().is_some_and(|h| h != new_hash) {
            return self
                .finish_conflict(ctx, project, mapping, &targets, started)
                .await;
        }

        let repo = RepoRef::new(&project.owner, &project.repo);
        let writes = targets.iter().map(|scope| {
            let dest = Destination::new(repo.clone(), scope.clone());
            let current = mapping.target_hash(scope).map(str::to_string);
            let new_hash = new_hash.as_str();
            async move {
                let result = self
                    .write_target(ctx, &project.account, &dest, name, value, new_hash, current)
                    .await;
                (dest.scope, result)
            }
        });
        let results = join_all(writes).await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut fatal = None;
        for (scope, result) in results {
            match result {
                Ok(status) => {
                    mapping
                        .target_hashes
                        .insert(scope.to_string(), new_hash.clone());
                    outcomes.push(TargetOutcome {
                        scope,
                        status,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(project = %project.id, secret = %name, scope = %scope, error = %e, "target write failed");
                    outcomes.push(TargetOutcome {
                        scope,
                        status: TargetStatus::Failed,
                        error: Some(sanitize_error(&e.to_string())),
                    });
                    if e.is_fatal() && fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        let report = self
            .finish_writes(ctx, project, name, mapping, new_hash, outcomes, started)
            .await?;

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Sync every secret present in `source` for `project`
    ///
    /// All audit records of the run share `ctx.correlation_id`. The run stops
    /// at the first raised error, after recording a run-level audit entry.
    pub async fn sync_all_secrets(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        source: &dyn SourceScope,
    ) -> Result<SyncSummary> {
        let started = Instant::now();
        let mut summary = SyncSummary::new(ctx.correlation_id);

        let result = self.sync_each(ctx, project, source, &mut summary).await;

        let succeeded = summary.synced_count + summary.unchanged_count;
        let failed = summary.failed_count + summary.conflict_count;
        let mut record = AuditRecord::new(ctx, &project.id, AuditOperation::SyncAllSecrets)
            .subject(source.name())
            .scopes(&project.targets)
            .counts(succeeded, failed)
            .duration(started.elapsed());

        record = match &result {
            Ok(()) => record.status("completed"),
            Err(e) => record.status("aborted").error(e.to_string()),
        };
        self.audit.record(&record).await?;

        info!(
            project = %project.id,
            correlation_id = %ctx.correlation_id,
            synced = summary.synced_count,
            unchanged = summary.unchanged_count,
            skipped = summary.skipped_count,
            failed = summary.failed_count,
            conflict = summary.conflict_count,
            "sync run finished"
        );

        result.map(|()| summary)
    }

    async fn sync_each(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        source: &dyn SourceScope,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let targets = resolve_targets(project, &[])?;
        for (name, value) in source.list(&project.id).await? {
            let report = self
                .sync_secret(ctx, project, &name, &value, &targets, false)
                .await?;
            summary.add(report);
        }
        Ok(())
    }

    /// Delete a secret from its target scopes and forget its mapping
    ///
    /// The mapping is kept, minus the removed targets, when any deletion
    /// failed. A secret already absent from a target counts as removed.
    pub async fn remove_secret(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        name: &str,
        targets: &[SecretScope],
    ) -> Result<SecretReport> {
        let started = Instant::now();

        if let Some(hit) = self.exclusions().await?.matches(&project.id, name) {
            return self
                .finish_skipped(ctx, project, name, AuditOperation::RemoveSecret, hit.pattern, started)
                .await;
        }

        let existing = self.store.get_mapping(&project.id, name).await?;
        let targets = match (targets.is_empty(), &existing) {
            (true, Some(mapping)) if !mapping.target_scopes.is_empty() => {
                mapping.target_scopes.clone()
            }
            _ => match resolve_targets(project, targets) {
                Ok(targets) => targets,
                Err(e) => {
                    return self
                        .reject(ctx, project, name, AuditOperation::RemoveSecret, e, started)
                        .await
                }
            },
        };

        let repo = RepoRef::new(&project.owner, &project.repo);
        let deletes = targets.iter().map(|scope| {
            let dest = Destination::new(repo.clone(), scope.clone());
            async move {
                let result = self.delete_target(ctx, &project.account, &dest, name).await;
                (dest.scope, result)
            }
        });
        let results = join_all(deletes).await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut fatal = None;
        for (scope, result) in results {
            match result {
                Ok(()) => outcomes.push(TargetOutcome {
                    scope,
                    status: TargetStatus::Removed,
                    error: None,
                }),
                Err(e) => {
                    outcomes.push(TargetOutcome {
                        scope,
                        status: TargetStatus::Failed,
                        error: Some(sanitize_error(&e.to_string())),
                    });
                    if e.is_fatal() && fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        let failures: Vec<&TargetOutcome> = outcomes.iter().filter(|o| !o.succeeded()).collect();
        let status = if failures.is_empty() {
            self.store.delete_mapping(&project.id, name).await?;
            SecretSyncStatus::Synced
        } else {
            if let Some(mut mapping) = existing {
                for outcome in outcomes.iter().filter(|o| o.succeeded()) {
                    mapping.target_hashes.remove(&outcome.scope.to_string());
                    mapping.target_scopes.retain(|s| s != &outcome.scope);
                }
                mapping.sync_status = SyncStatus::Failed;
                mapping.error_message = failures[0].error.clone();
                self.store.upsert_mapping(&mapping).await?;
            }
            SecretSyncStatus::Failed
        };

        let report = SecretReport {
            name: name.to_string(),
            status,
            message: failures.first().and_then(|f| f.error.clone()),
            targets: outcomes,
            correlation_id: ctx.correlation_id,
        };
        self.record_report(ctx, project, AuditOperation::RemoveSecret, &report, started)
            .await?;
        self.quota.record_observed(&project.account).await?;

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_target(
        &self,
        ctx: &OperationContext,
        account: &str,
        dest: &Destination,
        name: &str,
        value: &SecretString,
        new_hash: &str,
        current: Option<String>,
    ) -> Result<TargetStatus> {
        if current.as_deref() == Some(new_hash) {
            return Ok(TargetStatus::Unchanged);
        }

        let sealed = self.keys.encrypt(ctx, dest, value).await?;
        self.quota
            .block_if_insufficient(ctx, account, QuotaCategory::Secrets, self.settings.write_cost)
            .await?;

        let result = self
            .caller
            .call("put-secret", ctx, || self.api.put_secret(dest, name, &sealed))
            .await;

        match result {
            Ok(()) => Ok(TargetStatus::Written),
            Err(e) => {
                // A rejected payload usually means the destination rotated its key
                if e.status() == Some(422) {
                    self.keys.invalidate(dest).await;
                }
                Err(e)
            }
        }
    }

    async fn delete_target(
        &self,
        ctx: &OperationContext,
        account: &str,
        dest: &Destination,
        name: &str,
    ) -> Result<()> {
        self.quota
            .block_if_insufficient(ctx, account, QuotaCategory::Secrets, self.settings.write_cost)
            .await?;

        match self
            .caller
            .call("delete-secret", ctx, || self.api.delete_secret(dest, name))
            .await
        {
            Err(e) if e.status() == Some(404) => Ok(()),
            other => other,
        }
    }

    /// Audit a request refused before any target was touched
    async fn reject(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        name: &str,
        operation: AuditOperation,
        error: Error,
        started: Instant,
    ) -> Result<SecretReport> {
        let record = AuditRecord::new(ctx, &project.id, operation)
            .subject(name)
            .status("error")
            .counts(0, 1)
            .duration(started.elapsed())
            .error(error.to_string());
        self.audit.record(&record).await?;
        Err(error)
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_writes(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        name: &str,
        mut mapping: SecretMapping,
        new_hash: String,
        outcomes: Vec<TargetOutcome>,
        started: Instant,
    ) -> Result<SecretReport> {
        let any_success = outcomes.iter().any(TargetOutcome::succeeded);
        let first_error = outcomes.iter().find_map(|o| o.error.clone());
        let all_unchanged = outcomes
            .iter()
            .all(|o| o.status == TargetStatus::Unchanged);

        if any_success {
            mapping.value_hash = Some(new_hash);
            mapping.last_synced_at = Some(Utc::now());
        }

        let status = match (&first_error, all_unchanged) {
            (Some(_), _) => SecretSyncStatus::Failed,
            (None, true) => SecretSyncStatus::Unchanged,
            (None, false) => SecretSyncStatus::Synced,
        };
        mapping.sync_status = if first_error.is_some() {
            SyncStatus::Failed
        } else {
            SyncStatus::Synced
        };
        mapping.error_message = first_error.clone();
        self.store.upsert_mapping(&mapping).await?;

        let report = SecretReport {
            name: name.to_string(),
            status,
            targets: outcomes,
            correlation_id: ctx.correlation_id,
            message: first_error,
        };
        self.record_report(ctx, project, AuditOperation::SyncSecret, &report, started)
            .await?;
        self.quota.record_observed(&project.account).await?;

        info!(
            project = %project.id,
            secret = %name,
            status = %status,
            succeeded = report.success_count(),
            failed = report.failure_count(),
            "secret sync finished"
        );
        Ok(report)
    }

    async fn finish_conflict(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        mut mapping: SecretMapping,
        targets: &[SecretScope],
        started: Instant,
    ) -> Result<SecretReport> {
        let conflict = Error::ValueConflict {
            secret: mapping.name.clone(),
            source_scope: mapping.source_scope.clone(),
            target_scopes: targets.iter().map(ToString::to_string).collect(),
        };
        warn!(project = %project.id, "{}", conflict);

        mapping.sync_status = SyncStatus::Conflict;
        mapping.error_message = Some(conflict.to_string());
        self.store.upsert_mapping(&mapping).await?;

        let report = SecretReport {
            name: mapping.name.clone(),
            status: SecretSyncStatus::Conflict,
            targets: Vec::new(),
            correlation_id: ctx.correlation_id,
            message: Some(conflict.to_string()),
        };
        let record = AuditRecord::new(ctx, &project.id, AuditOperation::SyncSecret)
            .subject(&mapping.name)
            .scopes(targets)
            .status(SecretSyncStatus::Conflict)
            .duration(started.elapsed())
            .error(conflict.to_string());
        self.audit.record(&record).await?;
        Ok(report)
    }

    async fn finish_skipped(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        name: &str,
        operation: AuditOperation,
        pattern: String,
        started: Instant,
    ) -> Result<SecretReport> {
        let report = SecretReport {
            name: name.to_string(),
            status: SecretSyncStatus::Skipped,
            targets: Vec::new(),
            correlation_id: ctx.correlation_id,
            message: Some(format!("excluded by pattern {}", pattern)),
        };
        self.record_report(ctx, project, operation, &report, started)
            .await?;
        Ok(report)
    }

    async fn record_report(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        operation: AuditOperation,
        report: &SecretReport,
        started: Instant,
    ) -> Result<()> {
        let mut record = AuditRecord::new(ctx, &project.id, operation)
            .subject(&report.name)
            .scopes(report.targets.iter().map(|t| &t.scope))
            .status(report.status)
            .counts(report.success_count(), report.failure_count())
            .duration(started.elapsed());
        if report.status == SecretSyncStatus::Failed {
            if let Some(message) = &report.message {
                record = record.error(message);
            }
        }
        self.audit.record(&record).await
    }

    fn new_mapping(&self, project: &ProjectConfig, name: &str) -> SecretMapping {
        SecretMapping::new(&project.id, name, &self.settings.source_scope)
    }
}

/// Explicit targets, or the project's configured defaults
pub fn resolve_targets(project: &ProjectConfig, explicit: &[SecretScope]) -> Result<Vec<SecretScope>> {
    let mut targets: Vec<SecretScope> = if explicit.is_empty() {
        project
            .targets
            .iter()
            .map(|t| t.parse())
            .collect::<Result<_>>()?
    } else {
        explicit.to_vec()
    };

    let mut seen = std::collections::HashSet::new();
    targets.retain(|t| seen.insert(t.clone()));

    if targets.is_empty() {
        return Err(Error::validation(format!(
            "project {} has no target scopes",
            project.id
        )));
    }
    Ok(targets)
}
