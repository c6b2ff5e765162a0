//! Secret distribution and environment provisioning for Vaultline
//!
//! This crate keeps secrets consistent across the scopes of managed
//! repositories:
//! - **Resilience**: every remote call is retried with bounded, jittered backoff
//! - **Quota**: writes are refused before they would eat into the reserve
//! - **Encryption**: values are sealed to per-destination public keys, cached with a TTL
//! - **Sync**: hash-based conflict detection, exclusion patterns, per-target outcomes
//! - **Provisioning**: idempotent dev/staging/production environments with protection rules
//! - **Audit**: one sanitized JSONL record per operation

pub mod audit;
pub mod encryption;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod linked;
pub mod provision;
pub mod quota;
pub mod remote;
pub mod resilient;
pub mod security;
pub mod source;
pub mod store;
pub mod sync;
pub mod types;

pub use audit::{AuditOperation, AuditRecord, AuditSink, JsonlAuditLog, MemoryAuditSink};
pub use encryption::{KeyCache, KeyCacheStats};
pub use engine::{Engine, EngineBuilder};
pub use error::{Error, Result};
pub use exclusion::ExclusionMatcher;
pub use linked::{AssumePresent, ResourceChecker, StaticResourceChecker};
pub use provision::{ProvisionRequest, Provisioner};
pub use quota::QuotaGovernor;
pub use remote::{EnvironmentApi, GitHubClient, RemoteError, SecretStoreApi};
pub use resilient::ResilientCaller;
pub use security::SecretString;
pub use source::{EnvFileSource, SourceScope, StaticSource};
pub use store::{FileStore, MemoryStore, Store};
pub use sync::SyncResolver;
pub use types::{
    Destination, EnvironmentName, ExclusionPattern, OperationContext, ProtectionRules,
    ProvisionOutcome, ProvisionStatus, QuotaCategory, QuotaRecord, Reviewer, SecretReport,
    SecretScope, SecretSyncStatus, SyncSummary,
};
