//! Error types for spectree

use thiserror::Error;

/// Result type alias using the spectree common Error
pub type Result<T> = std::result::Result<T, Error>;

/// spectree common error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Invalid environment override {key}={value}: {reason}")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },
}

/// A single configuration problem found before any spec runs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("parallel_total must be >= 1")]
    InvalidParallelTotal,

    #[error("parallel_node {node} must be in [1, {total}]")]
    InvalidParallelNode { node: u32, total: u32 },

    #[error("parallel_host is required when parallel_total > 1")]
    MissingParallelHost,

    #[error("parallel host {0} is unreachable")]
    UnreachableParallelHost(String),

    #[error("dry_run cannot be combined with parallel_total > 1")]
    DryRunInParallel,

    #[error("verbose and succinct reporter settings conflict")]
    ConflictingVerboseSuccinct,

    #[error("invalid {kind} pattern {pattern:?}: {reason}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        reason: String,
    },
}

/// Every configuration problem found, reported together
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
#[error(
    "invalid configuration ({} problem(s)){}",
    .0.len(),
    .0.iter().map(|e| format!("\n  - {e}")).collect::<String>()
)]
pub struct ConfigErrors(pub Vec<ConfigError>);

impl ConfigErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, error: ConfigError) {
        self.0.push(error);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConfigError> {
        self.0.iter()
    }

    /// `Ok(())` when no problem was collected
    pub fn into_result(self) -> std::result::Result<(), ConfigErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<Vec<ConfigError>> for ConfigErrors {
    fn from(errors: Vec<ConfigError>) -> Self {
        Self(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_list_every_problem() {
        let errors = ConfigErrors::from(vec![
            ConfigError::MissingParallelHost,
            ConfigError::InvalidParallelNode { node: 3, total: 2 },
        ]);
        assert_eq!(
            errors.to_string(),
            "invalid configuration (2 problem(s))\n  \
             - parallel_host is required when parallel_total > 1\n  \
             - parallel_node 3 must be in [1, 2]"
        );
    }
}
