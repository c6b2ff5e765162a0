//! Remote secret-store and environment APIs
//!
//! The engine talks to the remote platform only through these traits.
//! [`GitHubClient`] implements both over REST; tests substitute mocks.

mod github;

pub use github::GitHubClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use vaultline_core::retry::HttpStatusError;

use crate::types::{Destination, QuotaCategory, RepoRef, Reviewer};

/// Error returned by every remote call
///
/// `status` is `None` when no response was received (reset, timeout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl RemoteError {
    /// A response with a non-success status
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            retry_after: None,
        }
    }

    /// No response was received
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// A 429 carrying the remote's retry instruction
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            status: Some(429),
            message: "rate limited".to_string(),
            retry_after,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

impl HttpStatusError for RemoteError {
    fn status_code(&self) -> Option<u16> {
        self.status
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

/// A destination's current public encryption key
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublicKey {
    pub key_id: String,
    /// Base64-encoded 32-byte curve25519 key
    pub key: String,
}

/// A sealed value ready to be written to one destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SealedSecret {
    /// Base64-encoded sealed box
    pub encrypted_value: String,
    pub key_id: String,
}

/// Rate-limit counters for one category, as reported by the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub category: QuotaCategory,
    pub remaining: u64,
    pub limit: u64,
    pub reset_at: DateTime<Utc>,
}

/// Protection payload for an environment create-or-update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvironmentPayload {
    pub wait_timer: u32,
    pub reviewers: Vec<Reviewer>,
    pub deployment_branch_policy: Option<BranchPolicy>,
}

/// Branch restriction flags of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BranchPolicy {
    pub protected_branches: bool,
    pub custom_branch_policies: bool,
}

/// The remote entity behind a deployment environment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteEnvironment {
    pub id: u64,
    pub name: String,
}

/// Secret-store operations of the remote platform
#[async_trait]
pub trait SecretStoreApi: Send + Sync {
    /// Fetch the destination's current public key
    async fn public_key(&self, dest: &Destination) -> Result<PublicKey, RemoteError>;

    /// Create or replace a secret at the destination
    async fn put_secret(
        &self,
        dest: &Destination,
        name: &str,
        sealed: &SealedSecret,
    ) -> Result<(), RemoteError>;

    /// Delete a secret from the destination
    async fn delete_secret(&self, dest: &Destination, name: &str) -> Result<(), RemoteError>;

    /// Names of the secrets stored at the destination
    async fn list_secret_names(&self, dest: &Destination) -> Result<Vec<String>, RemoteError>;

    /// Live rate-limit counters for every category
    async fn rate_limit(&self) -> Result<Vec<RateLimitSnapshot>, RemoteError>;

    /// Counters parsed from the headers of the most recent response
    fn last_observed_rate_limit(&self) -> Vec<RateLimitSnapshot> {
        Vec::new()
    }
}

/// Deployment environment operations of the remote platform
#[async_trait]
pub trait EnvironmentApi: Send + Sync {
    /// Create or update a named environment; idempotent on (repo, name)
    async fn upsert_environment(
        &self,
        repo: &RepoRef,
        name: &str,
        payload: &EnvironmentPayload,
    ) -> Result<RemoteEnvironment, RemoteError>;

    /// Allow deployments from `branch`; succeeds when the policy already exists
    async fn ensure_branch_policy(
        &self,
        repo: &RepoRef,
        environment: &str,
        branch: &str,
    ) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultline_core::retry::{HttpStatusPredicate, RetryPredicate};

    #[test]
    fn test_remote_error_classification() {
        let predicate = HttpStatusPredicate;
        assert!(!predicate.should_retry(&RemoteError::status(404, "Not Found")));
        assert!(predicate.should_retry(&RemoteError::status(502, "Bad Gateway")));
        assert!(predicate.should_retry(&RemoteError::transport("connection reset")));

        let limited = RemoteError::rate_limited(Some(Duration::from_secs(60)));
        assert!(predicate.should_retry(&limited));
        assert_eq!(predicate.retry_after(&limited), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_payload_serialization() {
        let payload = EnvironmentPayload {
            wait_timer: 5,
            reviewers: vec![Reviewer::user(7)],
            deployment_branch_policy: Some(BranchPolicy {
                protected_branches: false,
                custom_branch_policies: true,
            }),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["wait_timer"], 5);
        assert_eq!(json["reviewers"][0]["type"], "User");
        assert_eq!(json["reviewers"][0]["id"], 7);
        assert_eq!(json["deployment_branch_policy"]["custom_branch_policies"], true);
    }
}
