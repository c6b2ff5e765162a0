//! Data model for secret distribution and environment provisioning

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::Error;

// ============================================================================
// Request context
// ============================================================================

/// Per-call context threaded through every engine operation
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Identity recorded in the audit trail
    pub actor: String,
    /// Remote calls and backoff sleeps are not started past this instant
    pub deadline: Option<Instant>,
    /// Shared by every audit record the operation produces
    pub correlation_id: Uuid,
}

impl OperationContext {
    /// Create a context for `actor` with a fresh correlation id and no deadline
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            deadline: None,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Set a deadline relative to now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Set an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Use a specific correlation id
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

// ============================================================================
// Destinations
// ============================================================================

/// An independent store of secret material inside a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SecretScope {
    /// CI workflow secrets
    Actions,
    /// Dependency update bot secrets
    Dependabot,
    /// Cloud development environment secrets
    Codespaces,
    /// Secrets of a named deployment environment
    Environment(String),
}

impl SecretScope {
    /// Scope for a deployment environment
    pub fn environment(name: impl Into<String>) -> Self {
        Self::Environment(name.into())
    }
}

impl fmt::Display for SecretScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretScope::Actions => write!(f, "actions"),
            SecretScope::Dependabot => write!(f, "dependabot"),
            SecretScope::Codespaces => write!(f, "codespaces"),
            SecretScope::Environment(name) => write!(f, "environment:{}", name),
        }
    }
}

impl FromStr for SecretScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actions" => Ok(SecretScope::Actions),
            "dependabot" => Ok(SecretScope::Dependabot),
            "codespaces" => Ok(SecretScope::Codespaces),
            other => match other.strip_prefix("environment:") {
                Some(name) if !name.is_empty() => Ok(SecretScope::Environment(name.to_string())),
                _ => Err(Error::validation(format!("unknown secret scope: {}", s))),
            },
        }
    }
}

impl TryFrom<String> for SecretScope {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SecretScope> for String {
    fn from(scope: SecretScope) -> Self {
        scope.to_string()
    }
}

/// Owner and name of a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A place a sealed secret can be written to; each has its own public key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub repo: RepoRef,
    pub scope: SecretScope,
}

impl Destination {
    pub fn new(repo: RepoRef, scope: SecretScope) -> Self {
        Self { repo, scope }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo, self.scope)
    }
}

// ============================================================================
// Secret mappings
// ============================================================================

/// Persisted sync status of a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Failed,
    Conflict,
}

/// One row per (project, secret name)
///
/// Only fingerprints are kept. `value_hash` and each entry of `target_hashes`
/// move forward only after the corresponding write was confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretMapping {
    pub project_id: String,
    pub name: String,
    pub value_hash: Option<String>,
    pub source_scope: String,
    pub target_scopes: Vec<SecretScope>,
    /// Fingerprint last confirmed per target scope
    #[serde(default)]
    pub target_hashes: BTreeMap<String, String>,
    pub is_excluded: bool,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl SecretMapping {
    /// A mapping for a secret that has never been propagated
    pub fn new(
        project_id: impl Into<String>,
        name: impl Into<String>,
        source_scope: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            name: name.into(),
            value_hash: None,
            source_scope: source_scope.into(),
            target_scopes: Vec::new(),
            target_hashes: BTreeMap::new(),
            is_excluded: false,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
            error_message: None,
        }
    }

    /// Fingerprint last confirmed for `scope`
    pub fn target_hash(&self, scope: &SecretScope) -> Option<&str> {
        self.target_hashes.get(&scope.to_string()).map(String::as_str)
    }
}

/// Where an exclusion pattern applies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternScope {
    Global,
    Project(String),
}

/// A regular expression of secret names that are never propagated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionPattern {
    pub pattern: String,
    pub scope: PatternScope,
}

impl ExclusionPattern {
    pub fn global(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            scope: PatternScope::Global,
        }
    }

    pub fn project(project: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            scope: PatternScope::Project(project.into()),
        }
    }

    pub fn is_global(&self) -> bool {
        self.scope == PatternScope::Global
    }
}

// ============================================================================
// Quota
// ============================================================================

/// A named bucket of remote rate-limit accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaCategory {
    Core,
    Secrets,
    Graphql,
}

impl QuotaCategory {
    pub const ALL: [QuotaCategory; 3] = [Self::Core, Self::Secrets, Self::Graphql];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaCategory::Core => "core",
            QuotaCategory::Secrets => "secrets",
            QuotaCategory::Graphql => "graphql",
        }
    }
}

impl fmt::Display for QuotaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotaCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(QuotaCategory::Core),
            "secrets" => Ok(QuotaCategory::Secrets),
            "graphql" => Ok(QuotaCategory::Graphql),
            other => Err(Error::validation(format!("unknown quota category: {}", other))),
        }
    }
}

/// Last observed rate-limit counters for (account, category)
///
/// Values always mirror the remote counter; the engine never adjusts them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaRecord {
    pub account: String,
    pub category: QuotaCategory,
    pub remaining: u64,
    pub limit: u64,
    pub reset_at: DateTime<Utc>,
    pub observed_at: DateTime<Utc>,
}

impl QuotaRecord {
    /// Whole minutes until the counter resets, rounded up, never negative
    pub fn minutes_until_reset(&self, now: DateTime<Utc>) -> i64 {
        let seconds = (self.reset_at - now).num_seconds().max(0);
        (seconds + 59) / 60
    }
}

// ============================================================================
// Environments
// ============================================================================

/// Deployment environment names the provisioner manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentName {
    Dev,
    Staging,
    Production,
}

impl EnvironmentName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentName::Dev => "dev",
            EnvironmentName::Staging => "staging",
            EnvironmentName::Production => "production",
        }
    }

    /// Secret scope of this environment
    pub fn scope(&self) -> SecretScope {
        SecretScope::environment(self.as_str())
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(EnvironmentName::Dev),
            "staging" => Ok(EnvironmentName::Staging),
            "production" => Ok(EnvironmentName::Production),
            other => Err(Error::validation(format!(
                "unknown environment '{}': expected dev, staging or production",
                other
            ))),
        }
    }
}

/// Kind of identity allowed to approve a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewerKind {
    User,
    Team,
}

/// A required deployment reviewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    #[serde(rename = "type")]
    pub kind: ReviewerKind,
    pub id: u64,
}

impl Reviewer {
    pub fn user(id: u64) -> Self {
        Self {
            kind: ReviewerKind::User,
            id,
        }
    }

    pub fn team(id: u64) -> Self {
        Self {
            kind: ReviewerKind::Team,
            id,
        }
    }
}

/// Approval rules of a deployment environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionRules {
    #[serde(default)]
    pub reviewers: Vec<Reviewer>,
    /// Restrict deployments to the main line
    #[serde(default)]
    pub restrict_branches: bool,
    #[serde(default)]
    pub wait_timer_minutes: u32,
}

impl ProtectionRules {
    /// Rules with no restrictions
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_reviewers(reviewers: Vec<Reviewer>) -> Self {
        Self {
            reviewers,
            ..Self::default()
        }
    }

    pub fn required_reviewers(&self) -> usize {
        self.reviewers.len()
    }
}

/// Secret attached to an environment; values are never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSecret {
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// Kind of resource an environment can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    DatabaseBranch,
    ComputeWorker,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::DatabaseBranch => write!(f, "database-branch"),
            ResourceKind::ComputeWorker => write!(f, "compute-worker"),
        }
    }
}

/// Reference to another provisioned resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedResource {
    pub kind: ResourceKind,
    pub id: String,
}

impl LinkedResource {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Lifecycle state of a provisioned environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    Active,
    Error,
}

/// One row per (project, environment name)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    pub project_id: String,
    pub name: EnvironmentName,
    pub remote_environment_id: Option<u64>,
    pub protection_rules: ProtectionRules,
    pub secrets: Vec<EnvironmentSecret>,
    pub linked_resources: Vec<LinkedResource>,
    pub status: EnvironmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

// ============================================================================
// Reports
// ============================================================================

/// Outcome of one target write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Written,
    Unchanged,
    Removed,
    Failed,
}

/// Per-target result of a sync or removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub scope: SecretScope,
    pub status: TargetStatus,
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn succeeded(&self) -> bool {
        self.status != TargetStatus::Failed
    }
}

/// Reported status of a secret after a sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretSyncStatus {
    /// Written to every target that needed it
    Synced,
    /// Every target already held this value
    Unchanged,
    /// Matched an exclusion pattern
    Skipped,
    /// Source value diverges from the last propagated value
    Conflict,
    /// At least one target write failed
    Failed,
}

impl SecretSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretSyncStatus::Synced => "synced",
            SecretSyncStatus::Unchanged => "unchanged",
            SecretSyncStatus::Skipped => "skipped",
            SecretSyncStatus::Conflict => "conflict",
            SecretSyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SecretSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of syncing or removing one secret
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretReport {
    pub name: String,
    pub status: SecretSyncStatus,
    pub targets: Vec<TargetOutcome>,
    pub correlation_id: Uuid,
    pub message: Option<String>,
}

impl SecretReport {
    pub fn success_count(&self) -> usize {
        self.targets.iter().filter(|t| t.succeeded()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.targets.len() - self.success_count()
    }
}

/// Aggregate result of a whole-project sync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub correlation_id: Uuid,
    pub synced_count: usize,
    pub unchanged_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub conflict_count: usize,
    pub secrets: Vec<SecretReport>,
}

impl SyncSummary {
    pub fn new(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            ..Self::default()
        }
    }

    /// Count a secret report and keep it
    pub fn add(&mut self, report: SecretReport) {
        match report.status {
            SecretSyncStatus::Synced => self.synced_count += 1,
            SecretSyncStatus::Unchanged => self.unchanged_count += 1,
            SecretSyncStatus::Skipped => self.skipped_count += 1,
            SecretSyncStatus::Failed => self.failed_count += 1,
            SecretSyncStatus::Conflict => self.conflict_count += 1,
        }
        self.secrets.push(report);
    }
}

/// Whether provisioning created or refreshed the local row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionStatus {
    Created,
    Updated,
}

impl fmt::Display for ProvisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStatus::Created => write!(f, "created"),
            ProvisionStatus::Updated => write!(f, "updated"),
        }
    }
}

/// Result of provisioning an environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionOutcome {
    pub status: ProvisionStatus,
    pub environment: EnvironmentConfig,
    pub correlation_id: Uuid,
}
