//! spectree parallel synchronizer
//!
//! Lets N independently started worker processes agree on when the suite
//! began, and on the aggregate outcome once every shard has finished.
//!
//! ```text
//! worker 1 ─┐  POST /up        readiness probe
//! worker 2 ─┼─ POST /begin     {node}            -> {suite_started_at}
//! worker N ─┘  POST /end       {node, counts, succeeded}
//!              GET  /aggregate blocks until N reports -> AggregateReport
//! ```

pub mod aggregator;
pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use aggregator::Aggregator;
pub use client::SyncClient;
pub use error::{SyncError, SyncResult};
pub use server::SyncServer;
