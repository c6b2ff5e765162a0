//! Request quota admission
//!
//! The governor never counts requests itself. It refreshes counters from the
//! remote platform, persists what it saw, and refuses work that would eat
//! into the reserve kept for critical operations.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use vaultline_core::types::QuotaConfig;

use crate::error::{Error, Result};
use crate::remote::{RateLimitSnapshot, SecretStoreApi};
use crate::resilient::ResilientCaller;
use crate::store::Store;
use crate::types::{OperationContext, QuotaCategory, QuotaRecord};

/// Tracks remaining request capacity per (account, category)
pub struct QuotaGovernor {
    api: Arc<dyn SecretStoreApi>,
    store: Arc<dyn Store>,
    caller: ResilientCaller,
    reserve: u64,
}

impl QuotaGovernor {
    pub fn new(
        api: Arc<dyn SecretStoreApi>,
        store: Arc<dyn Store>,
        caller: ResilientCaller,
        config: &QuotaConfig,
    ) -> Self {
        Self {
            api,
            store,
            caller,
            reserve: config.reserve,
        }
    }

    /// Requests held back regardless of category
    pub fn reserve(&self) -> u64 {
        self.reserve
    }

    /// Refresh counters from the remote and persist every category seen
    ///
    /// Returns the record for `category`.
    pub async fn check_quota(
        &self,
        ctx: &OperationContext,
        account: &str,
        category: QuotaCategory,
    ) -> Result<QuotaRecord> {
        let snapshots = self
            .caller
            .call("rate-limit", ctx, || self.api.rate_limit())
            .await?;

        let now = Utc::now();
        let mut found = None;
        for snapshot in &snapshots {
            let record = to_record(account, snapshot, now);
            self.store.upsert_quota(&record).await?;
            if snapshot.category == category {
                found = Some(record);
            }
        }

        let record = found.ok_or_else(|| Error::RemoteTransient {
            status: None,
            attempts: 1,
            message: format!("rate limit response has no {} bucket", category),
        })?;

        debug!(
            account = %account,
            category = %category,
            remaining = record.remaining,
            limit = record.limit,
            "quota refreshed"
        );
        Ok(record)
    }

    /// Refresh and refuse when `remaining < reserve + required`
    ///
    /// The error carries the minutes until the counter resets.
    pub async fn block_if_insufficient(
        &self,
        ctx: &OperationContext,
        account: &str,
        category: QuotaCategory,
        required: u64,
    ) -> Result<QuotaRecord> {
        let record = self.check_quota(ctx, account, category).await?;
        admit(&record, self.reserve, required, Utc::now())?;
        Ok(record)
    }

    /// Last persisted snapshot; makes no remote call
    pub async fn get_cached_quota(
        &self,
        account: &str,
        category: QuotaCategory,
    ) -> Result<Option<QuotaRecord>> {
        self.store.get_quota(account, category).await
    }

    /// Persist counters the client parsed from recent response headers
    pub async fn record_observed(&self, account: &str) -> Result<()> {
        let now = Utc::now();
        for snapshot in self.api.last_observed_rate_limit() {
            self.store
                .upsert_quota(&to_record(account, &snapshot, now))
                .await?;
        }
        Ok(())
    }
}

fn to_record(account: &str, snapshot: &RateLimitSnapshot, now: DateTime<Utc>) -> QuotaRecord {
    QuotaRecord {
        account: account.to_string(),
        category: snapshot.category,
        remaining: snapshot.remaining,
        limit: snapshot.limit,
        reset_at: snapshot.reset_at,
        observed_at: now,
    }
}

/// Admission rule: at least `reserve + required` requests must remain
pub fn admit(
    record: &QuotaRecord,
    reserve: u64,
    required: u64,
    now: DateTime<Utc>,
) -> Result<()> {
    if record.remaining >= reserve.saturating_add(required) {
        return Ok(());
    }

    let minutes_until_reset = record.minutes_until_reset(now);
    warn!(
        account = %record.account,
        category = %record.category,
        remaining = record.remaining,
        required = required,
        reserve = reserve,
        minutes_until_reset = minutes_until_reset,
        reset_at = %record.reset_at,
        "quota below reserve, refusing request"
    );

    Err(Error::QuotaExhausted {
        account: record.account.clone(),
        category: record.category,
        remaining: record.remaining,
        required,
        reserve,
        minutes_until_reset,
    })
}
