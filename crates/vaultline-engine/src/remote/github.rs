//! GitHub REST implementation of the remote APIs

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use vaultline_core::types::GitHubConfig;

use super::{
    EnvironmentApi, EnvironmentPayload, PublicKey, RateLimitSnapshot, RemoteEnvironment,
    RemoteError, SealedSecret, SecretStoreApi,
};
use crate::error::{Error, Result};
use crate::security::{sanitize_error, SecretString};
use crate::types::{Destination, QuotaCategory, RepoRef, SecretScope};

const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: usize = 100;

/// GitHub REST client for secrets, environments and rate limits
///
/// One client serves one account; its token decides whose quota is used.
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    token: SecretString,
    observed: Mutex<Vec<RateLimitSnapshot>>,
}

impl GitHubClient {
    /// Create a client with an explicit token
    pub fn new(config: &GitHubConfig, token: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| {
                vaultline_core::Error::invalid_config(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            observed: Mutex::new(Vec::new()),
        })
    }

    /// Create a client whose token is read from `config.token_env`
    pub fn from_env(config: &GitHubConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env).map_err(|_| {
            Error::Config(vaultline_core::Error::invalid_config(format!(
                "environment variable {} is not set",
                config.token_env
            )))
        })?;
        Self::new(config, SecretString::new(token))
    }

    /// Base URL of the secret collection behind a destination
    fn secrets_url(&self, dest: &Destination) -> String {
        let repo = format!("{}/repos/{}/{}", self.api_url, dest.repo.owner, dest.repo.repo);
        match &dest.scope {
            SecretScope::Actions => format!("{}/actions/secrets", repo),
            SecretScope::Dependabot => format!("{}/dependabot/secrets", repo),
            SecretScope::Codespaces => format!("{}/codespaces/secrets", repo),
            SecretScope::Environment(name) => format!("{}/environments/{}/secrets", repo, name),
        }
    }

    fn environment_url(&self, repo: &RepoRef, name: &str) -> String {
        format!(
            "{}/repos/{}/{}/environments/{}",
            self.api_url, repo.owner, repo.repo, name
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .bearer_auth(self.token.expose())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Send a request, record rate-limit headers, and map failures
    async fn send(&self, builder: RequestBuilder) -> std::result::Result<Response, RemoteError> {
        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::transport(sanitize_error(&e.to_string())))?;

        self.observe_headers(response.headers());

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

        let mut error = RemoteError::status(status.as_u16(), sanitize_error(&message));
        error.retry_after = parse_retry_after(&headers);

        // An exhausted primary limit is reported as 403; treat it as 429 so it is retried
        if status.as_u16() == 403 && header_u64(&headers, "x-ratelimit-remaining") == Some(0) {
            error.status = Some(429);
        }

        Err(error)
    }

    fn observe_headers(&self, headers: &HeaderMap) {
        let (Some(remaining), Some(limit), Some(reset)) = (
            header_u64(headers, "x-ratelimit-remaining"),
            header_u64(headers, "x-ratelimit-limit"),
            header_u64(headers, "x-ratelimit-reset"),
        ) else {
            return;
        };

        let resource = headers
            .get("x-ratelimit-resource")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("core");

        let snapshots = snapshots_for_resource(resource, remaining, limit, epoch(reset));
        if snapshots.is_empty() {
            return;
        }
        if let Ok(mut observed) = self.observed.lock() {
            *observed = snapshots;
        }
    }
}

#[async_trait]
impl SecretStoreApi for GitHubClient {
    async fn public_key(&self, dest: &Destination) -> std::result::Result<PublicKey, RemoteError> {
        let url = format!("{}/public-key", self.secrets_url(dest));
        let response = self.send(self.request(Method::GET, &url)).await?;
        response
            .json::<PublicKey>()
            .await
            .map_err(|e| RemoteError::transport(format!("invalid public key response: {}", e)))
    }

    async fn put_secret(
        &self,
        dest: &Destination,
        name: &str,
        sealed: &SealedSecret,
    ) -> std::result::Result<(), RemoteError> {
        let url = format!("{}/{}", self.secrets_url(dest), name);
        self.send(self.request(Method::PUT, &url).json(sealed))
            .await
            .map(|_| ())
    }

    async fn delete_secret(
        &self,
        dest: &Destination,
        name: &str,
    ) -> std::result::Result<(), RemoteError> {
        let url = format!("{}/{}", self.secrets_url(dest), name);
        self.send(self.request(Method::DELETE, &url))
            .await
            .map(|_| ())
    }

    async fn list_secret_names(
        &self,
        dest: &Destination,
    ) -> std::result::Result<Vec<String>, RemoteError> {
        #[derive(Deserialize)]
        struct Page {
            secrets: Vec<Entry>,
        }
        #[derive(Deserialize)]
        struct Entry {
            name: String,
        }

        let mut names = Vec::new();
        for page in 1.. {
            let url = format!(
                "{}?per_page={}&page={}",
                self.secrets_url(dest),
                PAGE_SIZE,
                page
            );
            let response = self.send(self.request(Method::GET, &url)).await?;
            let page: Page = response
                .json()
                .await
                .map_err(|e| RemoteError::transport(format!("invalid secret list: {}", e)))?;

            let count = page.secrets.len();
            names.extend(page.secrets.into_iter().map(|entry| entry.name));
            if count < PAGE_SIZE {
                break;
            }
        }
        Ok(names)
    }

    async fn rate_limit(&self) -> std::result::Result<Vec<RateLimitSnapshot>, RemoteError> {
        #[derive(Deserialize)]
        struct RateLimitResponse {
            resources: std::collections::HashMap<String, Bucket>,
        }
        #[derive(Deserialize)]
        struct Bucket {
            limit: u64,
            remaining: u64,
            reset: i64,
        }

        let url = format!("{}/rate_limit", self.api_url);
        let response = self.send(self.request(Method::GET, &url)).await?;
        let body: RateLimitResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::transport(format!("invalid rate limit response: {}", e)))?;

        let mut snapshots: Vec<RateLimitSnapshot> = body
            .resources
            .iter()
            .flat_map(|(resource, bucket)| {
                snapshots_for_resource(resource, bucket.remaining, bucket.limit, epoch_i64(bucket.reset))
            })
            .collect();
        snapshots.sort_by_key(|s| s.category);
        Ok(snapshots)
    }

    fn last_observed_rate_limit(&self) -> Vec<RateLimitSnapshot> {
        self.observed
            .lock()
            .map(|observed| observed.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EnvironmentApi for GitHubClient {
    async fn upsert_environment(
        &self,
        repo: &RepoRef,
        name: &str,
        payload: &EnvironmentPayload,
    ) -> std::result::Result<RemoteEnvironment, RemoteError> {
        let url = self.environment_url(repo, name);
        let response = self.send(self.request(Method::PUT, &url).json(payload)).await?;
        response
            .json::<RemoteEnvironment>()
            .await
            .map_err(|e| RemoteError::transport(format!("invalid environment response: {}", e)))
    }

    async fn ensure_branch_policy(
        &self,
        repo: &RepoRef,
        environment: &str,
        branch: &str,
    ) -> std::result::Result<(), RemoteError> {
        let url = format!(
            "{}/deployment-branch-policies",
            self.environment_url(repo, environment)
        );
        let body = serde_json::json!({ "name": branch, "type": "branch" });
        match self.send(self.request(Method::POST, &url).json(&body)).await {
            Ok(_) => Ok(()),
            // 303 means the policy already exists
            Err(e) if e.status == Some(303) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Map a remote resource bucket to engine quota categories
///
/// Secret endpoints draw on the core bucket, so `core` feeds both.
fn snapshots_for_resource(
    resource: &str,
    remaining: u64,
    limit: u64,
    reset_at: DateTime<Utc>,
) -> Vec<RateLimitSnapshot> {
    let categories: &[QuotaCategory] = match resource {
        "core" => &[QuotaCategory::Core, QuotaCategory::Secrets],
        "graphql" => &[QuotaCategory::Graphql],
        _ => &[],
    };
    categories
        .iter()
        .map(|&category| RateLimitSnapshot {
            category,
            remaining,
            limit,
            reset_at,
        })
        .collect()
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_u64(headers, "retry-after").map(Duration::from_secs)
}

fn epoch(seconds: u64) -> DateTime<Utc> {
    epoch_i64(i64::try_from(seconds).unwrap_or(i64::MAX))
}

fn epoch_i64(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap_or_else(Utc::now)
}

fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("message")?.as_str().map(str::to_string)
}
