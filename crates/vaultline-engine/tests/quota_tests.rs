//! Quota governor tests through the engine

mod common;

use common::*;
use vaultline_engine::{Error, QuotaCategory};

#[tokio::test]
async fn test_block_when_required_eats_into_reserve() {
    let h = Harness::new();
    h.remote.set_remaining(150);

    let err = h
        .engine
        .block_if_insufficient(&ctx(), ACCOUNT, QuotaCategory::Secrets, 60)
        .await
        .unwrap_err();

    match err {
        Error::QuotaExhausted {
            account,
            category,
            remaining,
            required,
            reserve,
            minutes_until_reset,
        } => {
            assert_eq!(account, ACCOUNT);
            assert_eq!(category, QuotaCategory::Secrets);
            assert_eq!(remaining, 150);
            assert_eq!(required, 60);
            assert_eq!(reserve, 100);
            assert_eq!(minutes_until_reset, 3);
        }
        other => panic!("expected quota exhaustion, got {other}"),
    }
}

#[tokio::test]
async fn test_admits_when_reserve_is_kept() {
    let h = Harness::new();
    let ctx = ctx();

    h.remote.set_remaining(200);
    let record = h
        .engine
        .block_if_insufficient(&ctx, ACCOUNT, QuotaCategory::Core, 60)
        .await
        .unwrap();
    assert_eq!(record.remaining, 200);

    h.remote.set_remaining(160);
    assert!(h
        .engine
        .block_if_insufficient(&ctx, ACCOUNT, QuotaCategory::Core, 60)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_cached_quota_makes_no_remote_call() {
    let h = Harness::new();

    assert!(h
        .engine
        .get_cached_quota(ACCOUNT, QuotaCategory::Core)
        .await
        .unwrap()
        .is_none());

    h.engine
        .check_quota(&ctx(), ACCOUNT, QuotaCategory::Core)
        .await
        .unwrap();
    h.remote.clear_calls();

    let core = h
        .engine
        .get_cached_quota(ACCOUNT, QuotaCategory::Core)
        .await
        .unwrap()
        .unwrap();
    let graphql = h
        .engine
        .get_cached_quota(ACCOUNT, QuotaCategory::Graphql)
        .await
        .unwrap();

    assert_eq!(core.account, ACCOUNT);
    assert_eq!(core.limit, 5000);
    assert!(graphql.is_some());
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn test_quota_is_per_account() {
    let h = Harness::new();

    h.engine
        .check_quota(&ctx(), ACCOUNT, QuotaCategory::Secrets)
        .await
        .unwrap();

    assert!(h
        .engine
        .get_cached_quota("other-bot", QuotaCategory::Secrets)
        .await
        .unwrap()
        .is_none());
}
