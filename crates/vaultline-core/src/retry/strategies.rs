//! Retry delay strategies and predicates
//!
//! Delays follow `min(max_delay, initial * multiplier^(attempt-1))` plus a
//! uniformly random jitter in `[0, jitter_ms]`. Predicates decide whether an
//! error is worth another attempt and may override the computed delay.

use crate::types::{RetryPolicy, RetryStrategy};
use rand::Rng;
use std::time::Duration;

/// Calculate the delay before the next retry attempt
///
/// # Arguments
///
/// * `policy` - The retry policy containing strategy and timing parameters
/// * `attempt` - The attempt that just failed (1-indexed)
/// * `jitter` - Whether to add random jitter to the delay
///
/// # Example
///
/// ```rust
/// use vaultline_core::retry::calculate_delay;
/// use vaultline_core::types::RetryPolicy;
///
/// let policy = RetryPolicy::default();
///
/// assert_eq!(calculate_delay(&policy, 1, false).as_millis(), 1000);
/// assert_eq!(calculate_delay(&policy, 3, false).as_millis(), 4000);
/// assert_eq!(calculate_delay(&policy, 9, false).as_millis(), 32000);
/// ```
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let attempt_index = attempt.saturating_sub(1);

    let base_delay_ms = match policy.strategy {
        RetryStrategy::None => 0,

        RetryStrategy::FixedDelay => policy.initial_delay_ms,

        RetryStrategy::ExponentialBackoff => {
            let multiplier = policy.backoff_multiplier.powf(f64::from(attempt_index));
            // Cap in floating point so large attempt numbers cannot overflow
            (policy.initial_delay_ms as f64 * multiplier).min(policy.max_delay_ms as f64) as u64
        }
    };

    let capped_delay_ms = base_delay_ms.min(policy.max_delay_ms);

    let final_delay_ms = if jitter && capped_delay_ms > 0 && policy.jitter_ms > 0 {
        capped_delay_ms + rand::rng().random_range(0..=policy.jitter_ms)
    } else {
        capped_delay_ms
    };

    Duration::from_millis(final_delay_ms)
}

/// A predicate that determines whether an error should be retried
///
/// # Example
///
/// ```rust
/// use vaultline_core::retry::RetryPredicate;
/// use std::io::{Error, ErrorKind};
///
/// struct IoRetryPredicate;
///
/// impl RetryPredicate<Error> for IoRetryPredicate {
///     fn should_retry(&self, error: &Error) -> bool {
///         !matches!(error.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied)
///     }
/// }
/// ```
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    /// Determine whether the given error should be retried
    fn should_retry(&self, error: &E) -> bool;

    /// A delay dictated by the remote side, used verbatim instead of backoff
    fn retry_after(&self, error: &E) -> Option<Duration> {
        let _ = error;
        None
    }
}

/// A predicate that always returns true (all errors are retryable)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// A predicate that never retries (no errors are retryable)
#[derive(Debug, Clone, Copy)]
pub struct NeverRetry;

impl<E: ?Sized> RetryPredicate<E> for NeverRetry {
    fn should_retry(&self, _error: &E) -> bool {
        false
    }
}

/// A predicate that uses a closure to determine retryability
pub struct ClosurePredicate<F> {
    predicate: F,
}

impl<F> ClosurePredicate<F> {
    /// Create a new closure-based predicate
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> RetryPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}

/// A trait for errors that carry HTTP response information
pub trait HttpStatusError {
    /// Get the HTTP status code if a response was received
    fn status_code(&self) -> Option<u16>;

    /// The `retry-after` value the response carried, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Classifies remote errors by HTTP status
///
/// Client errors (400-499) other than 429 are rejected requests and are
/// never retried. Everything else, including errors without a status
/// (connection reset, timeout), is transient.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpStatusPredicate;

impl HttpStatusPredicate {
    /// Check if a status code is retryable
    pub fn is_retryable_code(code: u16) -> bool {
        !(400..500).contains(&code) || code == 429
    }
}

impl<E: HttpStatusError> RetryPredicate<E> for HttpStatusPredicate {
    fn should_retry(&self, error: &E) -> bool {
        error
            .status_code()
            .map(Self::is_retryable_code)
            .unwrap_or(true)
    }

    fn retry_after(&self, error: &E) -> Option<Duration> {
        match error.status_code() {
            Some(429) => error.retry_after(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn policy(strategy: RetryStrategy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            strategy,
            backoff_multiplier: 2.0,
            initial_delay_ms: 1000,
            max_delay_ms: 32000,
            jitter_ms: 1000,
        }
    }

    #[derive(Debug)]
    struct StatusErr(Option<u16>, Option<Duration>);

    impl HttpStatusError for StatusErr {
        fn status_code(&self) -> Option<u16> {
            self.0
        }

        fn retry_after(&self) -> Option<Duration> {
            self.1
        }
    }

    #[test]
    fn test_none_strategy() {
        let policy = policy(RetryStrategy::None);
        assert_eq!(calculate_delay(&policy, 1, true), Duration::ZERO);
        assert_eq!(calculate_delay(&policy, 3, false), Duration::ZERO);
    }

    #[test]
    fn test_fixed_strategy() {
        let policy = policy(RetryStrategy::FixedDelay);
        for attempt in 1..=4 {
            assert_eq!(
                calculate_delay(&policy, attempt, false),
                Duration::from_millis(1000)
            );
        }
    }

    #[test]
    fn test_exponential_strategy() {
        let policy = policy(RetryStrategy::ExponentialBackoff);

        assert_eq!(calculate_delay(&policy, 1, false), Duration::from_millis(1000));
        assert_eq!(calculate_delay(&policy, 2, false), Duration::from_millis(2000));
        assert_eq!(calculate_delay(&policy, 4, false), Duration::from_millis(8000));
        assert_eq!(calculate_delay(&policy, 6, false), Duration::from_millis(32000));
        assert_eq!(calculate_delay(&policy, 60, false), Duration::from_millis(32000));
    }

    #[test]
    fn test_jitter_is_additive_and_bounded() {
        let policy = policy(RetryStrategy::ExponentialBackoff);

        for _ in 0..200 {
            let delay = calculate_delay(&policy, 2, true);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(3000));
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(HttpStatusPredicate::is_retryable_code(429));
        assert!(HttpStatusPredicate::is_retryable_code(500));
        assert!(HttpStatusPredicate::is_retryable_code(503));
        assert!(!HttpStatusPredicate::is_retryable_code(400));
        assert!(!HttpStatusPredicate::is_retryable_code(404));
        assert!(!HttpStatusPredicate::is_retryable_code(422));
    }

    #[test]
    fn test_no_status_is_retryable() {
        let predicate = HttpStatusPredicate;
        assert!(predicate.should_retry(&StatusErr(None, None)));
        assert!(!predicate.should_retry(&StatusErr(Some(401), None)));
    }

    #[test]
    fn test_retry_after_only_for_429() {
        let predicate = HttpStatusPredicate;
        let hint = Some(Duration::from_secs(60));

        assert_eq!(
            predicate.retry_after(&StatusErr(Some(429), hint)),
            Some(Duration::from_secs(60))
        );
        assert_eq!(predicate.retry_after(&StatusErr(Some(503), hint)), None);
    }

    #[test]
    fn test_closure_predicate() {
        let predicate = ClosurePredicate::new(|err: &io::Error| {
            matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted)
        });

        assert!(predicate.should_retry(&io::Error::new(io::ErrorKind::TimedOut, "t")));
        assert!(!predicate.should_retry(&io::Error::new(io::ErrorKind::NotFound, "n")));
    }

    #[test]
    fn test_always_and_never() {
        let error = io::Error::other("boom");
        assert!(AlwaysRetry.should_retry(&error));
        assert!(!NeverRetry.should_retry(&error));
    }
}
