//! Run configuration
//!
//! A run is configured by a [`RunConfig`], loaded from an optional TOML file
//! and then overridden by `SPECTREE_*` environment variables. Every key is
//! optional; missing keys keep their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigError, ConfigErrors, Error, Result};

/// How much of a failing spec is repeated on a flake-retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryScope {
    /// Setup chain, subject and teardown chain
    Spec,
    /// Only the subject, between a single setup and teardown
    Subject,
}

impl Default for RetryScope {
    fn default() -> Self {
        Self::Spec
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Seed for spec ordering
    pub random_seed: i64,

    /// Permute siblings at every level, not just the top level
    pub randomize_all_specs: bool,

    /// Include the code location's file in focus/skip matching
    pub regex_scans_file_path: bool,

    /// Focus patterns, ORed
    pub focus_strings: Vec<String>,

    /// Skip patterns, ORed
    pub skip_strings: Vec<String>,

    /// Fail the suite when any spec is pending
    pub fail_on_pending: bool,

    /// Stop running the shard after the first failure
    pub fail_fast: bool,

    /// Total attempts per spec (0 and 1 disable retries)
    pub flake_attempts: u32,

    /// What a flake-retry repeats
    pub flake_retry_scope: RetryScope,

    /// Write a progress line before each step into the captured output
    pub emit_spec_progress: bool,

    /// Walk the tree without running any body
    pub dry_run: bool,

    /// This worker's 1-based shard index
    pub parallel_node: u32,

    /// Number of workers
    pub parallel_total: u32,

    /// Base URL of the synchronizer
    pub parallel_host: Option<String>,

    /// Per-subject timeout in milliseconds (0 = none)
    pub spec_timeout_ms: u64,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            random_seed: chrono::Utc::now().timestamp(),
            randomize_all_specs: false,
            regex_scans_file_path: false,
            focus_strings: Vec::new(),
            skip_strings: Vec::new(),
            fail_on_pending: false,
            fail_fast: false,
            flake_attempts: 0,
            flake_retry_scope: RetryScope::default(),
            emit_spec_progress: false,
            dry_run: false,
            parallel_node: 1,
            parallel_total: 1,
            parallel_host: None,
            spec_timeout_ms: 0,
        }
    }
}

impl SuiteConfig {
    pub fn spec_timeout(&self) -> Option<Duration> {
        if self.spec_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.spec_timeout_ms))
        }
    }

    /// Total attempts each spec gets
    pub fn max_attempts(&self) -> u32 {
        self.flake_attempts.max(1)
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel_total > 1
    }
}

/// Reporter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    pub no_color: bool,

    /// Specs slower than this are flagged, in seconds
    pub slow_spec_threshold_secs: f64,

    pub succinct: bool,

    pub verbose: bool,

    /// Include backtraces of panicked specs
    pub full_trace: bool,

    /// Include captured output of passed specs
    pub report_passed: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            no_color: false,
            slow_spec_threshold_secs: 5.0,
            succinct: false,
            verbose: false,
            full_trace: false,
            report_passed: false,
        }
    }
}

impl ReporterConfig {
    pub fn slow_spec_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.slow_spec_threshold_secs.max(0.0))
    }
}

/// Full run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub suite: SuiteConfig,
    pub reporter: ReporterConfig,
}

impl RunConfig {
    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            debug!("Loaded run configuration from {}", path.display());
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `SPECTREE_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `SPECTREE_*` overrides from an arbitrary lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let suite = &mut self.suite;

        if let Some(v) = lookup("SPECTREE_SEED") {
            suite.random_seed = parse_env("SPECTREE_SEED", &v)?;
        }
        if let Some(v) = lookup("SPECTREE_RANDOMIZE_ALL") {
            suite.randomize_all_specs = parse_bool("SPECTREE_RANDOMIZE_ALL", &v)?;
        }
        if let Some(v) = lookup("SPECTREE_FOCUS") {
            suite.focus_strings.push(v);
        }
        if let Some(v) = lookup("SPECTREE_SKIP") {
            suite.skip_strings.push(v);
        }
        if let Some(v) = lookup("SPECTREE_REGEX_SCANS_FILE_PATH") {
            suite.regex_scans_file_path = parse_bool("SPECTREE_REGEX_SCANS_FILE_PATH", &v)?;
        }
        if let Some(v) = lookup("SPECTREE_FAIL_ON_PENDING") {
            suite.fail_on_pending = parse_bool("SPECTREE_FAIL_ON_PENDING", &v)?;
        }
        if let Some(v) = lookup("SPECTREE_FAIL_FAST") {
            suite.fail_fast = parse_bool("SPECTREE_FAIL_FAST", &v)?;
        }
        if let Some(v) = lookup("SPECTREE_FLAKE_ATTEMPTS") {
            suite.flake_attempts = parse_env("SPECTREE_FLAKE_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("SPECTREE_DRY_RUN") {
            suite.dry_run = parse_bool("SPECTREE_DRY_RUN", &v)?;
        }
        if let Some(v) = lookup("SPECTREE_PARALLEL_NODE") {
            suite.parallel_node = parse_env("SPECTREE_PARALLEL_NODE", &v)?;
        }
        if let Some(v) = lookup("SPECTREE_PARALLEL_TOTAL") {
            suite.parallel_total = parse_env("SPECTREE_PARALLEL_TOTAL", &v)?;
        }
        if let Some(v) = lookup("SPECTREE_PARALLEL_HOST") {
            if !v.trim().is_empty() {
                suite.parallel_host = Some(v.trim().to_string());
            }
        }
        if let Some(v) = lookup("SPECTREE_TIMEOUT_MS") {
            suite.spec_timeout_ms = parse_env("SPECTREE_TIMEOUT_MS", &v)?;
        }

        Ok(())
    }

    /// Collect every local configuration problem
    ///
    /// Reachability of the parallel host needs the network and is checked by
    /// the engine before a parallel run.
    pub fn vet(&self) -> ConfigErrors {
        let mut errors = ConfigErrors::default();
        let suite = &self.suite;

        if suite.parallel_total < 1 {
            errors.push(ConfigError::InvalidParallelTotal);
        }

        if suite.parallel_node < 1 || suite.parallel_node > suite.parallel_total {
            errors.push(ConfigError::InvalidParallelNode {
                node: suite.parallel_node,
                total: suite.parallel_total,
            });
        }

        if suite.is_parallel() && suite.parallel_host.is_none() {
            errors.push(ConfigError::MissingParallelHost);
        }

        if suite.dry_run && suite.is_parallel() {
            errors.push(ConfigError::DryRunInParallel);
        }

        if self.reporter.succinct && self.reporter.verbose {
            errors.push(ConfigError::ConflictingVerboseSuccinct);
        }

        for (kind, patterns) in [("focus", &suite.focus_strings), ("skip", &suite.skip_strings)] {
            for pattern in patterns {
                if let Err(e) = regex::Regex::new(pattern) {
                    errors.push(ConfigError::InvalidPattern {
                        kind,
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        errors
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| Error::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::InvalidEnv {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
