//! Configuration loading and validation

mod loader;

pub use loader::ConfigLoader;
