//! Type definitions for Vaultline configuration

mod engine_config;

pub use engine_config::*;
