//! Engine configuration types
//!
//! These types control how the distribution engine talks to the remote
//! platform: retry policy, quota reserve, key cache lifetime, protection
//! rule bounds, and where local state is kept.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Remote platform connection settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Retry policy for every remote call
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Request quota admission settings
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Public key cache settings
    #[serde(default)]
    pub encryption: EncryptionConfig,

    /// Protection rule bounds for deployment environments
    #[serde(default)]
    pub protection: ProtectionConfig,

    /// Secret synchronization settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Local state and audit locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Resources environments may link to; references go unchecked when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_resources: Option<LinkedResourcesConfig>,

    /// Managed projects
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

impl EngineConfig {
    /// Look up a project by id
    pub fn project(&self, id: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.id == id)
    }
}

/// Remote platform connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubConfig {
    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Name of the environment variable holding the API token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// User agent string for HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            user_agent: default_user_agent(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_user_agent() -> String {
    format!(
        "vaultline/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
fn default_http_timeout() -> u64 {
    30
}

/// Retry policy for an operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Backoff multiplier for exponential strategies
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds (before jitter)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Upper bound of the random jitter added to each delay, in milliseconds
    #[serde(default = "default_jitter")]
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            jitter_ms: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    32000
}
fn default_jitter() -> u64 {
    1000
}

/// Retry strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// No delay between attempts
    None,

    /// Fixed delay between retries
    FixedDelay,

    /// Exponential backoff (default)
    #[default]
    ExponentialBackoff,
}

/// Request quota admission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QuotaConfig {
    /// Requests held back for critical operations, regardless of category
    #[serde(default = "default_reserve")]
    pub reserve: u64,

    /// Requests a single secret write is assumed to consume
    #[serde(default = "default_write_cost")]
    pub write_cost: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            reserve: default_reserve(),
            write_cost: default_write_cost(),
        }
    }
}

fn default_reserve() -> u64 {
    100
}
fn default_write_cost() -> u64 {
    1
}

/// Public key cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EncryptionConfig {
    /// How long a fetched destination key stays valid
    #[serde(default = "default_key_ttl")]
    pub key_ttl_secs: u64,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            key_ttl_secs: default_key_ttl(),
        }
    }
}

fn default_key_ttl() -> u64 {
    300 // 5 minutes
}

/// Protection rule bounds; these are provider limits, not engine policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProtectionConfig {
    /// Maximum number of required reviewers the provider accepts
    #[serde(default = "default_max_reviewers")]
    pub max_reviewers: usize,

    /// Maximum wait timer the provider accepts, in minutes
    #[serde(default = "default_max_wait_timer")]
    pub max_wait_timer_minutes: u32,

    /// Branch production deployments are restricted to
    #[serde(default = "default_main_branch")]
    pub main_branch: String,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            max_reviewers: default_max_reviewers(),
            max_wait_timer_minutes: default_max_wait_timer(),
            main_branch: default_main_branch(),
        }
    }
}

fn default_max_reviewers() -> usize {
    6
}
fn default_max_wait_timer() -> u32 {
    43200 // 30 days
}
fn default_main_branch() -> String {
    "main".to_string()
}

/// Secret synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncConfig {
    /// Name of the source-of-truth scope
    #[serde(default = "default_source_scope")]
    pub source_scope: String,

    /// Regular expressions excluded from every project
    #[serde(default)]
    pub global_exclusions: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_scope: default_source_scope(),
            global_exclusions: Vec::new(),
        }
    }
}

fn default_source_scope() -> String {
    "source".to_string()
}

/// Local state and audit locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// JSON document holding mappings, quota records, and environments
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Append-only JSONL audit log
    #[serde(default = "default_audit_path")]
    pub audit_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            audit_path: default_audit_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from(".vaultline/state.json")
}
fn default_audit_path() -> PathBuf {
    PathBuf::from(".vaultline/audit.jsonl")
}

/// Known resources a deployment environment may reference
///
/// Any linked database branch or compute worker not listed here makes
/// provisioning fail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LinkedResourcesConfig {
    /// Existing database branch ids
    #[serde(default)]
    pub database_branches: Vec<String>,

    /// Existing compute worker ids
    #[serde(default)]
    pub workers: Vec<String>,
}

/// A managed project and the repository it maps to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    /// Stable project identifier
    pub id: String,

    /// Account whose request quota the project consumes
    pub account: String,

    /// Repository owner
    pub owner: String,

    /// Repository name
    pub repo: String,

    /// Default target scopes (e.g. `actions`, `environment:production`)
    #[serde(default)]
    pub targets: Vec<String>,
}
