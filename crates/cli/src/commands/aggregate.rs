//! Fetch the aggregate outcome of a parallel run

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use spectree_common::AggregateReport;
use spectree_sync::SyncClient;
use tracing::info;

use crate::output::{print_item, verdict, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct AggregateArgs {
    /// Synchronizer URL
    #[arg(long, default_value = "http://127.0.0.1:8099", env = "SPECTREE_PARALLEL_HOST")]
    pub host: String,
}

#[derive(Serialize)]
pub struct AggregateDisplay {
    pub workers: u32,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    pub skipped: usize,
    pub flaked: usize,
    pub succeeded: bool,
}

impl From<AggregateReport> for AggregateDisplay {
    fn from(report: AggregateReport) -> Self {
        Self {
            workers: report.workers,
            total: report.counts.total,
            passed: report.counts.passed,
            failed: report.counts.failed,
            pending: report.counts.pending,
            skipped: report.counts.skipped,
            flaked: report.counts.flaked,
            succeeded: report.succeeded,
        }
    }
}

impl TableDisplay for AggregateDisplay {
    fn headers() -> Vec<&'static str> {
        vec![
            "Workers", "Total", "Passed", "Failed", "Pending", "Skipped", "Flaked", "Result",
        ]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.workers.to_string(),
            self.total.to_string(),
            self.passed.to_string(),
            self.failed.to_string(),
            self.pending.to_string(),
            self.skipped.to_string(),
            self.flaked.to_string(),
            verdict(self.succeeded),
        ]
    }
}

/// Blocks until every worker has reported; returns the aggregate verdict
pub async fn execute(args: AggregateArgs, format: OutputFormat) -> Result<bool> {
    let client = SyncClient::new(&args.host)?;
    info!("Waiting for every worker to report to {}...", client.base_url());
    let report = client.aggregate().await?;
    let display = AggregateDisplay::from(report);
    print_item(&display, format);
    Ok(display.succeeded)
}
