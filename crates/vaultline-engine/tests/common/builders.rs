//! Builders for engines wired to the mock remote

#![allow(dead_code)]

use std::sync::Arc;
use vaultline_core::types::{EngineConfig, ProjectConfig, RetryPolicy, RetryStrategy};
use vaultline_engine::linked::ResourceChecker;
use vaultline_engine::types::{EnvironmentConfig, EnvironmentName, SecretMapping};
use vaultline_engine::Store;
use vaultline_engine::{Engine, EngineBuilder, MemoryAuditSink, MemoryStore, OperationContext};

use super::mocks::MockRemote;

pub const ACCOUNT: &str = "acme-bot";
pub const PROJECT: &str = "web";
pub const ACTOR: &str = "tester";

/// Project `id` in `acme/<id>` targeting actions and dependabot
pub fn project(id: &str) -> ProjectConfig {
    ProjectConfig {
        id: id.to_string(),
        account: ACCOUNT.to_string(),
        owner: "acme".to_string(),
        repo: id.to_string(),
        targets: vec!["actions".to_string(), "dependabot".to_string()],
    }
}

/// Configuration with one project and undelayed retries
pub fn test_config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            max_attempts: 2,
            strategy: RetryStrategy::None,
            ..RetryPolicy::default()
        },
        projects: vec![project(PROJECT)],
        ..EngineConfig::default()
    }
}

pub fn ctx() -> OperationContext {
    OperationContext::new(ACTOR)
}

/// An engine plus handles on everything it talks to
pub struct Harness {
    pub engine: Engine,
    pub remote: Arc<MockRemote>,
    pub store: Arc<MemoryStore>,
    pub audit: Arc<MemoryAuditSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(test_config(), None)
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_checker(checker: Arc<dyn ResourceChecker>) -> Self {
        Self::build(test_config(), Some(checker))
    }

    fn build(config: EngineConfig, checker: Option<Arc<dyn ResourceChecker>>) -> Self {
        let remote = Arc::new(MockRemote::new());
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());

        let mut builder = EngineBuilder::new(config)
            .github(remote.clone())
            .store(store.clone())
            .audit(audit.clone());
        if let Some(checker) = checker {
            builder = builder.resource_checker(checker);
        }

        Self {
            engine: builder.build().unwrap(),
            remote,
            store,
            audit,
        }
    }

    /// Stored mapping for `name` in the default project
    pub async fn mapping(&self, name: &str) -> Option<SecretMapping> {
        self.store.get_mapping(PROJECT, name).await.unwrap()
    }

    pub async fn store_mapping(&self, name: &str) -> SecretMapping {
        self.mapping(name).await.expect("mapping should exist")
    }

    pub async fn environment(&self, name: EnvironmentName) -> Option<EnvironmentConfig> {
        self.store.get_environment(PROJECT, name).await.unwrap()
    }
}
