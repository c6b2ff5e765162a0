//! Retry execution engine
//!
//! This module provides the core retry execution logic with configurable
//! policies, predicates, observers, and an optional deadline.

use std::error::Error;
use std::fmt;
use std::future::Future;
use tokio::time::Instant;

use crate::types::RetryPolicy;

use super::error::RetryError;
use super::observer::{NoOpObserver, RetryObserver};
use super::strategies::{calculate_delay, AlwaysRetry, RetryPredicate};

/// Execute an async operation with retry logic based on a policy
///
/// Every error is retried; use `RetryExecutorBuilder` for classification,
/// observation, or a deadline.
///
/// # Example
///
/// ```rust,no_run
/// use vaultline_core::retry::retry_with_policy;
/// use vaultline_core::types::RetryPolicy;
///
/// async fn example() {
///     let policy = RetryPolicy::default();
///
///     let result = retry_with_policy(&policy, || async {
///         Ok::<_, std::io::Error>("success")
///     }).await;
/// }
/// ```
pub async fn retry_with_policy<F, Fut, T, E>(policy: &RetryPolicy, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + Send + 'static,
{
    RetryExecutorBuilder::new()
        .with_policy(policy.clone())
        .build()
        .execute(op)
        .await
}

/// Builder for configuring a `RetryExecutor`
///
/// # Example
///
/// ```rust
/// use vaultline_core::retry::{HttpStatusPredicate, RetryExecutorBuilder, TracingObserver};
/// use vaultline_core::types::RetryPolicy;
///
/// let executor = RetryExecutorBuilder::new()
///     .with_policy(RetryPolicy::default())
///     .with_predicate(HttpStatusPredicate)
///     .with_observer(TracingObserver::new("put-secret"))
///     .build();
/// ```
#[derive(Debug)]
pub struct RetryExecutorBuilder<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    jitter: bool,
    deadline: Option<Instant>,
}

impl Default for RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            predicate: AlwaysRetry,
            observer: NoOpObserver,
            jitter: true,
            deadline: None,
        }
    }
}

impl<P, O> RetryExecutorBuilder<P, O> {
    /// Set the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the retry predicate
    pub fn with_predicate<P2>(self, predicate: P2) -> RetryExecutorBuilder<P2, O> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate,
            observer: self.observer,
            jitter: self.jitter,
            deadline: self.deadline,
        }
    }

    /// Set the observer
    pub fn with_observer<O2>(self, observer: O2) -> RetryExecutorBuilder<P, O2> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate: self.predicate,
            observer,
            jitter: self.jitter,
            deadline: self.deadline,
        }
    }

    /// Enable or disable jitter (enabled by default)
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Stop before any attempt or sleep that would run past `deadline`
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Build the executor
    pub fn build(self) -> RetryExecutor<P, O> {
        RetryExecutor {
            policy: self.policy,
            predicate: self.predicate,
            observer: self.observer,
            jitter: self.jitter,
            deadline: self.deadline,
        }
    }
}

/// A retry executor with configurable policy, predicate, and observer
///
/// Use `RetryExecutorBuilder` to create an instance.
#[derive(Debug)]
pub struct RetryExecutor<P, O> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    jitter: bool,
    deadline: Option<Instant>,
}

impl<P, O> RetryExecutor<P, O>
where
    O: RetryObserver,
{
    /// Execute an operation with retry logic
    ///
    /// The operation is attempted at most `max_attempts` times. A
    /// `retry_after` hint from the predicate replaces the computed backoff.
    pub async fn execute<F, Fut, T, E>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display + Send + 'static,
        P: RetryPredicate<E>,
    {
        let start = Instant::now();
        let mut last_error: Option<E> = None;

        for attempt in 1..=self.policy.max_attempts {
            if self.deadline_reached(Instant::now()) {
                let display_err = last_error.as_ref().map(DisplayError::from_display);
                self.observer
                    .on_cancelled(attempt, display_err.as_ref().map(|e| e as &dyn Error));
                return Err(RetryError::cancelled(attempt - 1, last_error));
            }

            self.observer
                .on_attempt_start(attempt, self.policy.max_attempts);

            match op().await {
                Ok(result) => {
                    self.observer.on_success(attempt, start.elapsed());
                    return Ok(result);
                }
                Err(err) => {
                    let display_err = DisplayError::from_display(&err);

                    if !self.predicate.should_retry(&err) {
                        self.observer.on_cancelled(attempt, Some(&display_err));
                        return Err(RetryError::non_retryable(err));
                    }

                    if attempt >= self.policy.max_attempts {
                        self.observer.on_exhausted(attempt, &display_err);
                        return Err(RetryError::exhausted(attempt, err, start.elapsed()));
                    }

                    let delay = self
                        .predicate
                        .retry_after(&err)
                        .unwrap_or_else(|| calculate_delay(&self.policy, attempt, self.jitter));

                    if self.deadline_reached(Instant::now() + delay) {
                        self.observer.on_cancelled(attempt, Some(&display_err));
                        return Err(RetryError::cancelled(attempt, Some(err)));
                    }

                    self.observer.on_attempt_failed(attempt, &display_err, delay);
                    last_error = Some(err);

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        // Only reachable with max_attempts == 0
        Err(RetryError::cancelled(self.policy.max_attempts, last_error))
    }

    fn deadline_reached(&self, at: Instant) -> bool {
        self.deadline.is_some_and(|deadline| at >= deadline)
    }
}

/// Adapts a `Display` error to `dyn Error` for observer callbacks
#[derive(Debug)]
struct DisplayError(String);

impl DisplayError {
    fn from_display(err: &impl fmt::Display) -> Self {
        Self(err.to_string())
    }
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for DisplayError {}
