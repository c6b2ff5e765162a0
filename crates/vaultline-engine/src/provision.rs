//! Deployment environment provisioning
//!
//! Provisioning runs as a fixed sequence of idempotent steps. The remote
//! platform offers no transaction across them, so a failure leaves the
//! earlier steps applied, marks the local row as errored when the remote
//! environment exists, and records the failing step in the audit log.
//! Re-running the whole operation is always safe.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use vaultline_core::types::{ProjectConfig, ProtectionConfig};

use crate::audit::{AuditOperation, AuditRecord, AuditSink};
use crate::encryption::KeyCache;
use crate::error::{Error, Result};
use crate::linked::ResourceChecker;
use crate::quota::QuotaGovernor;
use crate::remote::{
    BranchPolicy, EnvironmentApi, EnvironmentPayload, RemoteEnvironment, SecretStoreApi,
};
use crate::resilient::ResilientCaller;
use crate::security::SecretString;
use crate::store::Store;
use crate::types::{
    Destination, EnvironmentConfig, EnvironmentName, EnvironmentSecret, EnvironmentStatus,
    LinkedResource, OperationContext, ProtectionRules, ProvisionOutcome, ProvisionStatus,
    QuotaCategory, RepoRef,
};

/// Arguments of a provisioning call
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub name: EnvironmentName,
    pub protection_rules: ProtectionRules,
    pub secrets: Vec<(String, SecretString)>,
    pub linked_resources: Vec<LinkedResource>,
}

impl ProvisionRequest {
    pub fn new(name: EnvironmentName) -> Self {
        Self {
            name,
            protection_rules: ProtectionRules::none(),
            secrets: Vec::new(),
            linked_resources: Vec::new(),
        }
    }

    pub fn with_rules(mut self, rules: ProtectionRules) -> Self {
        self.protection_rules = rules;
        self
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<SecretString>) -> Self {
        self.secrets.push((name.into(), value.into()));
        self
    }

    pub fn with_linked(mut self, resource: LinkedResource) -> Self {
        self.linked_resources.push(resource);
        self
    }
}

/// Provisioning sub-steps, named in audit records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStep {
    ValidateRules,
    CheckLinkedResources,
    UpsertEnvironment,
    BranchPolicy,
    WriteSecret(String),
    SaveConfig,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStep::ValidateRules => write!(f, "validate-rules"),
            ProvisionStep::CheckLinkedResources => write!(f, "check-linked-resources"),
            ProvisionStep::UpsertEnvironment => write!(f, "upsert-environment"),
            ProvisionStep::BranchPolicy => write!(f, "branch-policy"),
            ProvisionStep::WriteSecret(name) => write!(f, "write-secret {}", name),
            ProvisionStep::SaveConfig => write!(f, "save-config"),
        }
    }
}

/// What the steps applied before finishing or failing
#[derive(Default)]
struct Progress {
    remote: Option<RemoteEnvironment>,
    rules: ProtectionRules,
    secrets: Vec<EnvironmentSecret>,
}

/// Creates or refreshes protected deployment environments
pub struct Provisioner {
    environments: Arc<dyn EnvironmentApi>,
    secrets: Arc<dyn SecretStoreApi>,
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    quota: Arc<QuotaGovernor>,
    keys: Arc<KeyCache>,
    checker: Arc<dyn ResourceChecker>,
    caller: ResilientCaller,
    protection: ProtectionConfig,
    write_cost: u64,
}

impl Provisioner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        environments: Arc<dyn EnvironmentApi>,
        secrets: Arc<dyn SecretStoreApi>,
        store: Arc<dyn Store>,
        audit: Arc<dyn AuditSink>,
        quota: Arc<QuotaGovernor>,
        keys: Arc<KeyCache>,
        checker: Arc<dyn ResourceChecker>,
        caller: ResilientCaller,
        protection: ProtectionConfig,
        write_cost: u64,
    ) -> Self {
        Self {
            environments,
            secrets,
            store,
            audit,
            quota,
            keys,
            checker,
            caller,
            protection,
            write_cost,
        }
    }

    /// Create or update `request.name` for `project`
    ///
    /// The returned status is `created` when no local row existed before
    /// this call and `updated` otherwise.
    pub async fn provision_environment(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        request: &ProvisionRequest,
    ) -> Result<ProvisionOutcome> {
        let started = Instant::now();
        let existing = self.store.get_environment(&project.id, request.name).await?;
        let mut progress = Progress::default();

        let result = self.run_steps(ctx, project, request, &mut progress).await;
        let (step, error) = match result {
            Ok(()) => {
                return self
                    .finish(ctx, project, request, existing, progress, started)
                    .await
            }
            Err(failure) => failure,
        };

        warn!(
            project = %project.id,
            environment = %request.name,
            step = %step,
            error = %error,
            "provisioning failed"
        );

        if let Some(remote) = &progress.remote {
            let now = Utc::now();
            let mut row = existing.unwrap_or_else(|| EnvironmentConfig {
                project_id: project.id.clone(),
                name: request.name,
                remote_environment_id: None,
                protection_rules: progress.rules.clone(),
                secrets: Vec::new(),
                linked_resources: request.linked_resources.clone(),
                status: EnvironmentStatus::Error,
                created_at: now,
                updated_at: now,
                last_error: None,
            });
            row.remote_environment_id = Some(remote.id);
            row.protection_rules = progress.rules.clone();
            row.linked_resources = request.linked_resources.clone();
            merge_secrets(&mut row.secrets, progress.secrets);
            row.status = EnvironmentStatus::Error;
            row.updated_at = now;
            row.last_error = Some(format!("{} failed: {}", step, error));
            self.store.upsert_environment(&row).await?;
        }

        let record = AuditRecord::new(ctx, &project.id, AuditOperation::ProvisionEnvironment)
            .subject(request.name.as_str())
            .scopes([request.name.scope()])
            .status("error")
            .counts(0, 1)
            .duration(started.elapsed())
            .error(format!("{} failed: {}", step, error));
        self.audit.record(&record).await?;

        Err(error)
    }

    async fn run_steps(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        request: &ProvisionRequest,
        progress: &mut Progress,
    ) -> std::result::Result<(), (ProvisionStep, Error)> {
        let rules = normalize_rules(request.name, &request.protection_rules, &self.protection)
            .map_err(|e| (ProvisionStep::ValidateRules, e))?;
        progress.rules = rules.clone();

        self.check_linked(project, &request.linked_resources)
            .await
            .map_err(|e| (ProvisionStep::CheckLinkedResources, e))?;

        let repo = RepoRef::new(&project.owner, &project.repo);
        let env_name = request.name.as_str();
        let payload = EnvironmentPayload {
            wait_timer: rules.wait_timer_minutes,
            reviewers: rules.reviewers.clone(),
            deployment_branch_policy: rules.restrict_branches.then_some(BranchPolicy {
                protected_branches: false,
                custom_branch_policies: true,
            }),
        };

        self.admit_core(ctx, &project.account)
            .await
            .map_err(|e| (ProvisionStep::UpsertEnvironment, e))?;
        let remote = self
            .caller
            .call("upsert-environment", ctx, || {
                self.environments.upsert_environment(&repo, env_name, &payload)
            })
            .await
            .map_err(|e| (ProvisionStep::UpsertEnvironment, e))?;
        debug!("Remote environment {} has id {}", env_name, remote.id);
        progress.remote = Some(remote);

        if rules.restrict_branches {
            let branch = self.protection.main_branch.as_str();
            self.admit_core(ctx, &project.account)
                .await
                .map_err(|e| (ProvisionStep::BranchPolicy, e))?;
            self.caller
                .call("branch-policy", ctx, || {
                    self.environments.ensure_branch_policy(&repo, env_name, branch)
                })
                .await
                .map_err(|e| (ProvisionStep::BranchPolicy, e))?;
        }

        let dest = Destination::new(repo.clone(), request.name.scope());
        for (name, value) in &request.secrets {
            self.write_secret(ctx, &project.account, &dest, name, value)
                .await
                .map_err(|e| (ProvisionStep::WriteSecret(name.clone()), e))?;
            progress.secrets.push(EnvironmentSecret {
                name: name.clone(),
                updated_at: Utc::now(),
            });
        }

        Ok(())
    }

    async fn check_linked(&self, project: &ProjectConfig, resources: &[LinkedResource]) -> Result<()> {
        for resource in resources {
            if !self.checker.exists(&project.id, resource).await? {
                return Err(Error::LinkedResourceMissing {
                    kind: resource.kind.to_string(),
                    id: resource.id.clone(),
                });
            }
        }
        Ok(())
    }

    async fn admit_core(&self, ctx: &OperationContext, account: &str) -> Result<()> {
        self.quota
            .block_if_insufficient(ctx, account, QuotaCategory::Core, self.write_cost)
            .await
            .map(|_| ())
    }

    async fn write_secret(
        &self,
        ctx: &OperationContext,
        account: &str,
        dest: &Destination,
        name: &str,
        value: &SecretString,
    ) -> Result<()> {
        let sealed = self.keys.encrypt(ctx, dest, value).await?;
        self.quota
            .block_if_insufficient(ctx, account, QuotaCategory::Secrets, self.write_cost)
            .await?;

        let result = self
            .caller
            .call("put-secret", ctx, || self.secrets.put_secret(dest, name, &sealed))
            .await;
        if let Err(e) = &result {
            if e.status() == Some(422) {
                self.keys.invalidate(dest).await;
            }
        }
        result
    }

    async fn finish(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        request: &ProvisionRequest,
        existing: Option<EnvironmentConfig>,
        progress: Progress,
        started: Instant,
    ) -> Result<ProvisionOutcome> {
        let now = Utc::now();
        let status = if existing.is_some() {
            ProvisionStatus::Updated
        } else {
            ProvisionStatus::Created
        };
        let written = progress.secrets.len();

        let mut row = existing.unwrap_or_else(|| EnvironmentConfig {
            project_id: project.id.clone(),
            name: request.name,
            remote_environment_id: None,
            protection_rules: ProtectionRules::none(),
            secrets: Vec::new(),
            linked_resources: Vec::new(),
            status: EnvironmentStatus::Active,
            created_at: now,
            updated_at: now,
            last_error: None,
        });
        row.remote_environment_id = progress.remote.map(|r| r.id);
        row.protection_rules = progress.rules;
        merge_secrets(&mut row.secrets, progress.secrets);
        row.linked_resources = request.linked_resources.clone();
        row.status = EnvironmentStatus::Active;
        row.updated_at = now;
        row.last_error = None;

        if let Err(e) = self.store.upsert_environment(&row).await {
            let record = AuditRecord::new(ctx, &project.id, AuditOperation::ProvisionEnvironment)
                .subject(request.name.as_str())
                .scopes([request.name.scope()])
                .status("error")
                .counts(written, 1)
                .duration(started.elapsed())
                .error(format!("{} failed: {}", ProvisionStep::SaveConfig, e));
            self.audit.record(&record).await?;
            return Err(e);
        }

        let record = AuditRecord::new(ctx, &project.id, AuditOperation::ProvisionEnvironment)
            .subject(request.name.as_str())
            .scopes([request.name.scope()])
            .status(status)
            .counts(written, 0)
            .duration(started.elapsed());
        self.audit.record(&record).await?;

        info!(
            project = %project.id,
            environment = %request.name,
            status = %status,
            secrets = written,
            "environment provisioned"
        );

        Ok(ProvisionOutcome {
            status,
            environment: row,
            correlation_id: ctx.correlation_id,
        })
    }
}

/// Apply the per-environment protection policy and the provider's bounds
///
/// dev never carries restrictions, staging allows at most one reviewer, and
/// production needs at least one reviewer and is limited to the main line.
pub fn normalize_rules(
    name: EnvironmentName,
    requested: &ProtectionRules,
    bounds: &ProtectionConfig,
) -> Result<ProtectionRules> {
    if requested.wait_timer_minutes > bounds.max_wait_timer_minutes {
        return Err(Error::validation(format!(
            "wait timer of {} minutes exceeds the maximum of {}",
            requested.wait_timer_minutes, bounds.max_wait_timer_minutes
        )));
    }
    if requested.required_reviewers() > bounds.max_reviewers {
        return Err(Error::validation(format!(
            "{} reviewers requested, at most {} are supported",
            requested.required_reviewers(),
            bounds.max_reviewers
        )));
    }

    match name {
        EnvironmentName::Dev => {
            if *requested != ProtectionRules::none() {
                debug!("Ignoring protection rules requested for dev");
            }
            Ok(ProtectionRules::none())
        }
        EnvironmentName::Staging => {
            if requested.required_reviewers() > 1 {
                return Err(Error::validation(format!(
                    "staging allows at most one reviewer, {} requested",
                    requested.required_reviewers()
                )));
            }
            Ok(ProtectionRules {
                reviewers: requested.reviewers.clone(),
                restrict_branches: false,
                wait_timer_minutes: requested.wait_timer_minutes,
            })
        }
        EnvironmentName::Production => {
            if requested.required_reviewers() == 0 {
                return Err(Error::validation(
                    "production requires at least one reviewer",
                ));
            }
            Ok(ProtectionRules {
                reviewers: requested.reviewers.clone(),
                restrict_branches: true,
                wait_timer_minutes: requested.wait_timer_minutes,
            })
        }
    }
}

fn merge_secrets(existing: &mut Vec<EnvironmentSecret>, written: Vec<EnvironmentSecret>) {
    for secret in written {
        match existing.iter_mut().find(|s| s.name == secret.name) {
            Some(slot) => slot.updated_at = secret.updated_at,
            None => existing.push(secret),
        }
    }
}
