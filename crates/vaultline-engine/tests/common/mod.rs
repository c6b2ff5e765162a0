//! Common test utilities for vaultline-engine
//!
//! - An in-process remote platform that records every call
//! - Builders for configured engines and projects

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
