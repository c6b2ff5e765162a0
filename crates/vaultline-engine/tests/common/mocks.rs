//! Mock remote platform for testing
//!
//! Implements both remote APIs in memory. Sealed values are opened with a
//! real key pair so tests can assert on what reached each destination.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{Duration as ChronoDuration, Utc};
use crypto_box::aead::OsRng;
use crypto_box::SecretKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use vaultline_engine::remote::{
    EnvironmentApi, EnvironmentPayload, PublicKey, RateLimitSnapshot, RemoteEnvironment,
    RemoteError, SealedSecret, SecretStoreApi,
};
use vaultline_engine::types::{Destination, QuotaCategory, RepoRef};

/// Record of a remote call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteCall {
    PublicKey(String),
    PutSecret { scope: String, name: String },
    DeleteSecret { scope: String, name: String },
    ListSecrets(String),
    RateLimit,
    UpsertEnvironment(String),
    BranchPolicy { environment: String, branch: String },
}

/// In-memory remote platform
pub struct MockRemote {
    secret: SecretKey,
    calls: Arc<Mutex<Vec<RemoteCall>>>,
    /// Status returned by puts and deletes per scope
    failures: Arc<Mutex<HashMap<String, u16>>>,
    /// Status returned by environment upserts
    environment_failure: Arc<Mutex<Option<u16>>>,
    /// Opened values per (scope, name)
    values: Arc<Mutex<HashMap<(String, String), String>>>,
    environments: Arc<Mutex<HashMap<String, u64>>>,
    payloads: Arc<Mutex<Vec<EnvironmentPayload>>>,
    remaining: Arc<Mutex<u64>>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            secret: SecretKey::generate(&mut OsRng),
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            environment_failure: Arc::new(Mutex::new(None)),
            values: Arc::new(Mutex::new(HashMap::new())),
            environments: Arc::new(Mutex::new(HashMap::new())),
            payloads: Arc::new(Mutex::new(Vec::new())),
            remaining: Arc::new(Mutex::new(5000)),
        }
    }

    /// Make puts and deletes on `scope` fail with `status`
    pub fn fail_scope(&self, scope: &str, status: u16) {
        self.failures
            .lock()
            .unwrap()
            .insert(scope.to_string(), status);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Make environment upserts fail with `status`
    pub fn fail_environments(&self, status: Option<u16>) {
        *self.environment_failure.lock().unwrap() = status;
    }

    /// Remaining requests reported for every category
    pub fn set_remaining(&self, remaining: u64) {
        *self.remaining.lock().unwrap() = remaining;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Put calls for `name`, as scope strings
    pub fn puts_for(&self, name: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::PutSecret { scope, name: n } if n == name => Some(scope),
                _ => None,
            })
            .collect()
    }

    pub fn put_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RemoteCall::PutSecret { .. }))
            .count()
    }

    pub fn count(&self, call: &RemoteCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Plaintext last written to `scope` under `name`
    pub fn value(&self, scope: &str, name: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap()
            .get(&(scope.to_string(), name.to_string()))
            .cloned()
    }

    pub fn environment_count(&self) -> usize {
        self.environments.lock().unwrap().len()
    }

    pub fn last_payload(&self) -> Option<EnvironmentPayload> {
        self.payloads.lock().unwrap().last().cloned()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn injected(&self, scope: &str) -> Option<RemoteError> {
        self.failures
            .lock()
            .unwrap()
            .get(scope)
            .map(|status| RemoteError::status(*status, "injected failure"))
    }
}

#[async_trait]
impl SecretStoreApi for MockRemote {
    async fn public_key(&self, dest: &Destination) -> Result<PublicKey, RemoteError> {
        self.record(RemoteCall::PublicKey(dest.scope.to_string()));
        Ok(PublicKey {
            key_id: "mock-key".to_string(),
            key: BASE64.encode(self.secret.public_key().as_bytes()),
        })
    }

    async fn put_secret(
        &self,
        dest: &Destination,
        name: &str,
        sealed: &SealedSecret,
    ) -> Result<(), RemoteError> {
        let scope = dest.scope.to_string();
        self.record(RemoteCall::PutSecret {
            scope: scope.clone(),
            name: name.to_string(),
        });
        if let Some(err) = self.injected(&scope) {
            return Err(err);
        }

        let ciphertext = BASE64
            .decode(&sealed.encrypted_value)
            .map_err(|e| RemoteError::status(422, e.to_string()))?;
        let opened = self
            .secret
            .unseal(&ciphertext)
            .map_err(|_| RemoteError::status(422, "bad ciphertext"))?;
        self.values.lock().unwrap().insert(
            (scope, name.to_string()),
            String::from_utf8_lossy(&opened).into_owned(),
        );
        Ok(())
    }

    async fn delete_secret(&self, dest: &Destination, name: &str) -> Result<(), RemoteError> {
        let scope = dest.scope.to_string();
        self.record(RemoteCall::DeleteSecret {
            scope: scope.clone(),
            name: name.to_string(),
        });
        if let Some(err) = self.injected(&scope) {
            return Err(err);
        }
        match self
            .values
            .lock()
            .unwrap()
            .remove(&(scope, name.to_string()))
        {
            Some(_) => Ok(()),
            None => Err(RemoteError::status(404, "Not Found")),
        }
    }

    async fn list_secret_names(&self, dest: &Destination) -> Result<Vec<String>, RemoteError> {
        let scope = dest.scope.to_string();
        self.record(RemoteCall::ListSecrets(scope.clone()));
        let mut names: Vec<String> = self
            .values
            .lock()
            .unwrap()
            .keys()
            .filter(|(s, _)| *s == scope)
            .map(|(_, n)| n.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn rate_limit(&self) -> Result<Vec<RateLimitSnapshot>, RemoteError> {
        self.record(RemoteCall::RateLimit);
        let remaining = *self.remaining.lock().unwrap();
        let reset_at = Utc::now() + ChronoDuration::minutes(3);
        Ok(QuotaCategory::ALL
            .iter()
            .map(|category| RateLimitSnapshot {
                category: *category,
                remaining,
                limit: 5000,
                reset_at,
            })
            .collect())
    }
}

#[async_trait]
impl EnvironmentApi for MockRemote {
    async fn upsert_environment(
        &self,
        repo: &RepoRef,
        name: &str,
        payload: &EnvironmentPayload,
    ) -> Result<RemoteEnvironment, RemoteError> {
        self.record(RemoteCall::UpsertEnvironment(name.to_string()));
        if let Some(status) = *self.environment_failure.lock().unwrap() {
            return Err(RemoteError::status(status, "injected failure"));
        }
        self.payloads.lock().unwrap().push(payload.clone());

        let mut environments = self.environments.lock().unwrap();
        let next_id = environments.len() as u64 + 100;
        let id = *environments
            .entry(format!("{}/{}", repo, name))
            .or_insert(next_id);
        Ok(RemoteEnvironment {
            id,
            name: name.to_string(),
        })
    }

    async fn ensure_branch_policy(
        &self,
        _repo: &RepoRef,
        environment: &str,
        branch: &str,
    ) -> Result<(), RemoteError> {
        self.record(RemoteCall::BranchPolicy {
            environment: environment.to_string(),
            branch: branch.to_string(),
        });
        Ok(())
    }
}
