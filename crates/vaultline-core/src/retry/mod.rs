//! Retry execution engine with policy-based configuration
//!
//! Every remote call the engine makes goes through a [`RetryExecutor`].
//!
//! # Features
//!
//! - Exponential backoff capped at `max-delay-ms`, plus additive jitter
//! - Status-based classification: 4xx other than 429 is never retried
//! - A 429 carrying `retry-after` is honored exactly, without jitter or cap
//! - Optional deadline checked before every attempt and every backoff sleep
//! - Observable retry attempts via the `RetryObserver` trait
//!
//! # Example
//!
//! ```rust,no_run
//! use vaultline_core::retry::{retry_with_policy, RetryError};
//! use vaultline_core::types::RetryPolicy;
//!
//! async fn example() -> Result<String, RetryError<std::io::Error>> {
//!     let policy = RetryPolicy::default();
//!
//!     retry_with_policy(&policy, || async {
//!         // Your fallible operation here
//!         Ok("success".to_string())
//!     }).await
//! }
//! ```

mod error;
mod executor;
mod observer;
mod strategies;

pub use error::RetryError;
pub use executor::{retry_with_policy, RetryExecutor, RetryExecutorBuilder};
pub use observer::{NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use strategies::{
    calculate_delay, AlwaysRetry, ClosurePredicate, HttpStatusError, HttpStatusPredicate,
    NeverRetry, RetryPredicate,
};
