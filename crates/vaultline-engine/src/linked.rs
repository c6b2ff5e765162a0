//! Existence checks for resources an environment links to
//!
//! No provider for database branches or compute workers is wired in yet.
//! With a `linked-resources` config section the engine checks references
//! against the listed ids. Without one, [`AssumePresent`] keeps provisioning
//! usable and says so in the log every time it lets a reference through
//! unchecked.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::warn;
use vaultline_core::types::LinkedResourcesConfig;

use crate::error::Result;
use crate::types::{LinkedResource, ResourceKind};

/// Confirms that a linked resource exists
#[async_trait]
pub trait ResourceChecker: Send + Sync {
    async fn exists(&self, project: &str, resource: &LinkedResource) -> Result<bool>;
}

/// Passes every reference without checking it
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumePresent;

#[async_trait]
impl ResourceChecker for AssumePresent {
    async fn exists(&self, project: &str, resource: &LinkedResource) -> Result<bool> {
        warn!(
            project = %project,
            kind = %resource.kind,
            id = %resource.id,
            "linked resource NOT verified: no existence check is configured"
        );
        Ok(true)
    }
}

/// Checks references against a known set
#[derive(Debug, Clone, Default)]
pub struct StaticResourceChecker {
    known: HashSet<LinkedResource>,
}

impl StaticResourceChecker {
    pub fn new(known: impl IntoIterator<Item = LinkedResource>) -> Self {
        Self {
            known: known.into_iter().collect(),
        }
    }

    /// Known set from the `linked-resources` config section
    pub fn from_config(config: &LinkedResourcesConfig) -> Self {
        let branches = config
            .database_branches
            .iter()
            .map(|id| LinkedResource::new(ResourceKind::DatabaseBranch, id.as_str()));
        let workers = config
            .workers
            .iter()
            .map(|id| LinkedResource::new(ResourceKind::ComputeWorker, id.as_str()));
        Self::new(branches.chain(workers))
    }
}

#[async_trait]
impl ResourceChecker for StaticResourceChecker {
    async fn exists(&self, _project: &str, resource: &LinkedResource) -> Result<bool> {
        Ok(self.known.contains(resource))
    }
}
