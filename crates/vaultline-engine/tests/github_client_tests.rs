//! GitHub client tests against a wiremock server
//!
//! Tests cover:
//! - Request headers and endpoint paths
//! - Error mapping, including rate-limited 403 responses
//! - Rate limit parsing from the body and from response headers
//! - Pagination of secret listings
//! - A full sync through the engine over HTTP

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use crypto_box::aead::OsRng;
use crypto_box::SecretKey;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use vaultline_core::types::{EngineConfig, GitHubConfig, ProjectConfig, RetryPolicy, RetryStrategy};
use vaultline_engine::remote::{EnvironmentPayload, SealedSecret};
use vaultline_engine::types::{Destination, RepoRef};
use vaultline_engine::{
    EngineBuilder, EnvironmentApi, GitHubClient, OperationContext, QuotaCategory,
    ResilientCaller, SecretScope, SecretStoreApi, SecretString, SecretSyncStatus,
};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

fn client(server: &MockServer) -> GitHubClient {
    let config = GitHubConfig {
        api_url: server.uri(),
        ..GitHubConfig::default()
    };
    GitHubClient::new(&config, SecretString::from(TOKEN)).unwrap()
}

fn dest(scope: SecretScope) -> Destination {
    Destination::new(RepoRef::new("acme", "web"), scope)
}

fn rate_limit_body(remaining: u64) -> serde_json::Value {
    serde_json::json!({
        "resources": {
            "core": { "limit": 5000, "remaining": remaining, "reset": 4_102_444_800u64, "used": 0 },
            "graphql": { "limit": 5000, "remaining": 4999, "reset": 4_102_444_800u64, "used": 1 },
            "search": { "limit": 30, "remaining": 30, "reset": 4_102_444_800u64, "used": 0 }
        }
    })
}

#[tokio::test]
async fn test_put_secret_sends_auth_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/repos/acme/web/actions/secrets/API_KEY"))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .and(header("accept", "application/vnd.github+json"))
        .and(header("x-github-api-version", "2022-11-28"))
        .and(body_json(serde_json::json!({
            "encrypted_value": "c2VhbGVk",
            "key_id": "k1"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let sealed = SealedSecret {
        encrypted_value: "c2VhbGVk".to_string(),
        key_id: "k1".to_string(),
    };
    client(&server)
        .put_secret(&dest(SecretScope::Actions), "API_KEY", &sealed)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_error_status_and_message_are_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/repos/acme/web/dependabot/secrets/GONE"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({ "message": "Not Found" })),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .delete_secret(&dest(SecretScope::Dependabot), "GONE")
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.message, "Not Found");
}

#[tokio::test]
async fn test_exhausted_primary_limit_becomes_429() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/actions/secrets/public-key"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-limit", "5000")
                .insert_header("x-ratelimit-reset", "4102444800")
                .insert_header("retry-after", "30"),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client
        .public_key(&dest(SecretScope::Actions))
        .await
        .unwrap_err();

    assert_eq!(err.status, Some(429));
    assert_eq!(err.retry_after, Some(Duration::from_secs(30)));

    let observed = client.last_observed_rate_limit();
    assert!(observed
        .iter()
        .any(|s| s.category == QuotaCategory::Secrets && s.remaining == 0));
}

#[tokio::test]
async fn test_plain_403_is_not_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/actions/secrets/public-key"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(serde_json::json!({ "message": "Resource not accessible" })),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .public_key(&dest(SecretScope::Actions))
        .await
        .unwrap_err();
    assert_eq!(err.status, Some(403));
}

#[tokio::test]
async fn test_rate_limit_body_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rate_limit_body(4990)))
        .mount(&server)
        .await;

    let snapshots = client(&server).rate_limit().await.unwrap();

    let categories: Vec<QuotaCategory> = snapshots.iter().map(|s| s.category).collect();
    assert_eq!(
        categories,
        vec![QuotaCategory::Core, QuotaCategory::Secrets, QuotaCategory::Graphql]
    );
    assert_eq!(snapshots[1].remaining, 4990);
    assert_eq!(snapshots[2].remaining, 4999);
}

#[tokio::test]
async fn test_secret_listing_follows_pages() {
    let server = MockServer::start().await;
    let first: Vec<_> = (0..100)
        .map(|i| serde_json::json!({ "name": format!("S{}", i) }))
        .collect();

    Mock::given(method("GET"))
        .and(path("/repos/acme/web/environments/staging/secrets"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "total_count": 101, "secrets": first })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/environments/staging/secrets"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({ "total_count": 101, "secrets": [{ "name": "LAST" }] }),
        ))
        .mount(&server)
        .await;

    let names = client(&server)
        .list_secret_names(&dest(SecretScope::environment("staging")))
        .await
        .unwrap();

    assert_eq!(names.len(), 101);
    assert_eq!(names.last().map(String::as_str), Some("LAST"));
}

#[tokio::test]
async fn test_environment_upsert_and_existing_branch_policy() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/repos/acme/web/environments/production"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 42,
            "name": "production",
            "protection_rules": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(
            "/repos/acme/web/environments/production/deployment-branch-policies",
        ))
        .and(body_json(serde_json::json!({ "name": "main", "type": "branch" })))
        .respond_with(ResponseTemplate::new(303))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let repo = RepoRef::new("acme", "web");
    let remote = client
        .upsert_environment(&repo, "production", &EnvironmentPayload::default())
        .await
        .unwrap();
    assert_eq!(remote.id, 42);

    client
        .ensure_branch_policy(&repo, "production", "main")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/actions/secrets/public-key"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/actions/secrets/public-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "key_id": "k1", "key": "AAAA" })),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let caller = ResilientCaller::new(RetryPolicy {
        strategy: RetryStrategy::None,
        ..RetryPolicy::default()
    });
    let ctx = OperationContext::new("tester");
    let actions = dest(SecretScope::Actions);

    let key = caller
        .call("public-key", &ctx, || client.public_key(&actions))
        .await
        .unwrap();
    assert_eq!(key.key_id, "k1");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_engine_sync_over_http() {
    let server = MockServer::start().await;
    let secret = SecretKey::generate(&mut OsRng);

    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rate_limit_body(4000)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/actions/secrets/public-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "key_id": "k1",
            "key": BASE64.encode(secret.public_key().as_bytes())
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/repos/acme/web/actions/secrets/API_KEY"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let config = EngineConfig {
        github: GitHubConfig {
            api_url: server.uri(),
            ..GitHubConfig::default()
        },
        projects: vec![ProjectConfig {
            id: "web".to_string(),
            account: "acme-bot".to_string(),
            owner: "acme".to_string(),
            repo: "web".to_string(),
            targets: vec!["actions".to_string()],
        }],
        ..EngineConfig::default()
    };
    let client = Arc::new(GitHubClient::new(&config.github, SecretString::from(TOKEN)).unwrap());
    let engine = EngineBuilder::new(config).github(client).build().unwrap();

    let report = engine
        .sync_secret(
            &OperationContext::new("tester"),
            "web",
            "API_KEY",
            &SecretString::from("s3cret"),
            &[],
            false,
        )
        .await
        .unwrap();
    assert_eq!(report.status, SecretSyncStatus::Synced);

    let put = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&put.body).unwrap();
    assert_eq!(body["key_id"], "k1");
    let ciphertext = BASE64
        .decode(body["encrypted_value"].as_str().unwrap())
        .unwrap();
    assert_eq!(secret.unseal(&ciphertext).unwrap(), b"s3cret");

    let quota = engine
        .get_cached_quota("acme-bot", QuotaCategory::Secrets)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(quota.remaining, 4000);
}

#[test]
#[serial]
fn test_client_from_env() {
    let config = GitHubConfig {
        token_env: "VAULTLINE_TEST_TOKEN".to_string(),
        ..GitHubConfig::default()
    };

    std::env::remove_var("VAULTLINE_TEST_TOKEN");
    assert!(GitHubClient::from_env(&config).is_err());

    std::env::set_var("VAULTLINE_TEST_TOKEN", "from-env");
    assert!(GitHubClient::from_env(&config).is_ok());
    std::env::remove_var("VAULTLINE_TEST_TOKEN");
}
