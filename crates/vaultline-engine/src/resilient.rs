//! Retried remote calls
//!
//! Every remote call the engine makes goes through [`ResilientCaller`], which
//! applies the configured retry policy, the HTTP status classification and
//! the caller's deadline.

use std::future::Future;
use vaultline_core::retry::{HttpStatusPredicate, RetryExecutorBuilder, TracingObserver};
use vaultline_core::types::RetryPolicy;

use crate::error::Result;
use crate::remote::RemoteError;
use crate::types::OperationContext;

/// Runs remote operations under a retry policy
#[derive(Debug, Clone, Default)]
pub struct ResilientCaller {
    policy: RetryPolicy,
}

impl ResilientCaller {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, is rejected, runs out of attempts, or
    /// the context deadline is reached
    ///
    /// Each retry is logged at warn level under `label`.
    pub async fn call<F, Fut, T>(&self, label: &str, ctx: &OperationContext, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RemoteError>>,
    {
        RetryExecutorBuilder::new()
            .with_policy(self.policy.clone())
            .with_predicate(HttpStatusPredicate)
            .with_observer(TracingObserver::new(label))
            .with_deadline(ctx.deadline)
            .build()
            .execute(op)
            .await
            .map_err(Into::into)
    }
}
