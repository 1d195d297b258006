//! Probe a running synchronizer

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use spectree_sync::SyncClient;

use crate::output::{print_error, print_item, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct StatusArgs {
    /// Synchronizer URL
    #[arg(long, default_value = "http://127.0.0.1:8099", env = "SPECTREE_PARALLEL_HOST")]
    pub host: String,
}

#[derive(Serialize)]
pub struct StatusDisplay {
    pub host: String,
    pub status: String,
    pub service: String,
    pub parallel_total: u32,
}

impl TableDisplay for StatusDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Host", "Status", "Service", "Workers"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.host.clone(),
            self.status.clone(),
            self.service.clone(),
            self.parallel_total.to_string(),
        ]
    }
}

/// Returns whether the synchronizer answered
pub async fn execute(args: StatusArgs, format: OutputFormat) -> Result<bool> {
    let client = SyncClient::new(&args.host)?;
    match client.health().await {
        Ok(health) => {
            let display = StatusDisplay {
                host: client.base_url().to_string(),
                status: health.status,
                service: health.service,
                parallel_total: health.parallel_total,
            };
            print_item(&display, format);
            Ok(true)
        }
        Err(e) => {
            print_error(&format!("Synchronizer is not responding at {}: {}", args.host, e));
            Ok(false)
        }
    }
}
