//! Host the synchronizer

use anyhow::{bail, Context, Result};
use clap::Args;
use std::net::SocketAddr;

#[derive(Args)]
pub struct ServeArgs {
    /// Bind address
    #[arg(long, default_value = "127.0.0.1:8099", env = "SPECTREE_SYNC_LISTEN")]
    pub listen: String,

    /// Number of parallel workers that will report
    #[arg(long, env = "SPECTREE_PARALLEL_TOTAL")]
    pub total: u32,
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    if args.total < 1 {
        bail!("--total must be at least 1");
    }
    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {:?}", args.listen))?;

    spectree_sync::server::serve(addr, args.total).await
}
