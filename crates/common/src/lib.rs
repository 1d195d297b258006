//! spectree Common Library
//!
//! Shared types, configuration and errors for the spectree engine, the
//! parallel synchronizer and the CLI.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{ReporterConfig, RetryScope, RunConfig, SuiteConfig};
pub use error::{ConfigError, ConfigErrors, Error, Result};
pub use types::*;

/// spectree version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default location of the run configuration file
pub fn default_config_path() -> std::path::PathBuf {
    std::path::PathBuf::from("spectree.toml")
}
