//! # vaultline-core
//!
//! Core library for Vaultline providing:
//! - Engine configuration (`vaultline.yaml`) types and loading
//! - The core error type for configuration and IO failures
//! - Retry execution engine with policy-based configuration

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::ConfigLoader;
pub use error::{Error, Result};
pub use types::EngineConfig;
