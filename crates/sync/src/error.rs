//! Error types for the parallel synchronizer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Synchronizer at {host} is unreachable after {attempts} attempts")]
    Unreachable { host: String, attempts: usize },

    #[error("Unexpected response from {endpoint}: {status} {body}")]
    UnexpectedStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Node {node} is out of range [1, {total}]")]
    NodeOutOfRange { node: u32, total: u32 },

    #[error("Node {0} already reported its results")]
    DuplicateReport(u32),

    #[error("Synchronizer shut down before all workers reported")]
    Closed,
}

pub type SyncResult<T> = Result<T, SyncError>;
