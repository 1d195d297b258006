//! Wire types shared by the synchronizer server and its client
//!
//! Only same-version workers talk to each other, so these carry no
//! compatibility guarantees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UP_PATH: &str = "/up";
pub const BEGIN_PATH: &str = "/begin";
pub const END_PATH: &str = "/end";
pub const AGGREGATE_PATH: &str = "/aggregate";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub parallel_total: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BeginRequest {
    pub node: u32,
}

/// Suite start origin agreed by all workers
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BeginResponse {
    pub suite_started_at: DateTime<Utc>,
}

/// Acknowledgement of an end-of-shard report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndResponse {
    pub received: u32,
    pub expected: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
