//! Check a run configuration before starting workers

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use spectree_common::{ConfigError, RunConfig};
use spectree_sync::SyncClient;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::output::{print_list, print_success, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct VetArgs {
    /// Run configuration file (TOML); missing means defaults
    #[arg(short, long, default_value_os_t = spectree_common::default_config_path())]
    pub config: PathBuf,

    /// Also check that the parallel host answers
    #[arg(long)]
    pub probe: bool,
}

#[derive(Serialize)]
pub struct ProblemDisplay {
    pub problem: String,
}

impl TableDisplay for ProblemDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Problem"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.problem.clone()]
    }
}

/// Load `path`, apply `SPECTREE_*` overrides and list every problem
pub async fn collect_problems(path: &Path, probe: bool) -> Result<Vec<ConfigError>> {
    let mut config = RunConfig::load(path)?;
    config.apply_env()?;

    let mut problems: Vec<ConfigError> = config.vet().iter().cloned().collect();
    if probe && problems.is_empty() && config.suite.is_parallel() {
        if let Some(host) = &config.suite.parallel_host {
            let client = SyncClient::new(host)?;
            if client.wait_until_up(3, Duration::from_millis(200)).await.is_err() {
                problems.push(ConfigError::UnreachableParallelHost(host.clone()));
            }
        }
    }
    Ok(problems)
}

/// Returns whether the configuration is usable
pub async fn execute(args: VetArgs, format: OutputFormat) -> Result<bool> {
    let problems = collect_problems(&args.config, args.probe).await?;
    if problems.is_empty() {
        print_success(&format!("{} is valid", args.config.display()));
        return Ok(true);
    }

    let displays: Vec<ProblemDisplay> = problems
        .iter()
        .map(|p| ProblemDisplay {
            problem: p.to_string(),
        })
        .collect();
    print_list(&displays, format);
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_problems_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spectree.toml");
        std::fs::write(
            &path,
            r#"
[suite]
parallel_total = 2
parallel_node = 5
skip_strings = ["("]

[reporter]
verbose = true
succinct = true
"#,
        )
        .unwrap();

        let problems = collect_problems(&path, false).await.unwrap();
        assert!(problems.contains(&ConfigError::InvalidParallelNode { node: 5, total: 2 }));
        assert!(problems.contains(&ConfigError::MissingParallelHost));
        assert!(problems.contains(&ConfigError::ConflictingVerboseSuccinct));
        assert!(problems
            .iter()
            .any(|p| matches!(p, ConfigError::InvalidPattern { kind: "skip", .. })));
    }

    #[tokio::test]
    async fn test_missing_file_is_default_config() {
        let dir = TempDir::new().unwrap();
        let problems = collect_problems(&dir.path().join("absent.toml"), true)
            .await
            .unwrap();
        assert!(problems.is_empty());
    }
}
