//! In-memory aggregation of worker reports
//!
//! Accumulation is serialized behind a single lock. Once every expected
//! worker has reported, the grand total is published on a watch channel and
//! every waiting reader is released. Nothing is ever rolled back.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use spectree_common::{AggregateReport, SuiteCounts, WorkerReport};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::protocol::EndResponse;

#[derive(Debug, Default)]
struct AggregatorState {
    started_at: Option<DateTime<Utc>>,
    begun: BTreeSet<u32>,
    reports: BTreeMap<u32, WorkerReport>,
}

/// Collects begin/end reports from `parallel_total` workers
pub struct Aggregator {
    parallel_total: u32,
    state: Mutex<AggregatorState>,
    complete: watch::Sender<Option<AggregateReport>>,
}

impl Aggregator {
    pub fn new(parallel_total: u32) -> Self {
        let (complete, _) = watch::channel(None);
        Self {
            parallel_total,
            state: Mutex::new(AggregatorState::default()),
            complete,
        }
    }

    pub fn parallel_total(&self) -> u32 {
        self.parallel_total
    }

    fn check_node(&self, node: u32) -> SyncResult<()> {
        if node < 1 || node > self.parallel_total {
            return Err(SyncError::NodeOutOfRange {
                node,
                total: self.parallel_total,
            });
        }
        Ok(())
    }

    /// Record that a worker is beginning; returns the agreed suite start time
    ///
    /// The first worker to begin fixes the origin. Workers are never held back.
    pub fn begin(&self, node: u32) -> SyncResult<DateTime<Utc>> {
        self.check_node(node)?;
        let mut state = self.state.lock();
        let started_at = *state.started_at.get_or_insert_with(Utc::now);
        if state.begun.insert(node) {
            debug!("Node {} began ({}/{})", node, state.begun.len(), self.parallel_total);
        }
        Ok(started_at)
    }

    /// Accumulate one worker's end-of-shard report
    pub fn report(&self, report: WorkerReport) -> SyncResult<EndResponse> {
        self.check_node(report.node)?;
        let mut state = self.state.lock();
        if state.reports.contains_key(&report.node) {
            warn!("Ignoring second report from node {}", report.node);
            return Err(SyncError::DuplicateReport(report.node));
        }
        state.reports.insert(report.node, report);

        let received = state.reports.len() as u32;
        info!(
            "Node {} reported: {} ({}/{})",
            report.node, report.counts, received, self.parallel_total
        );

        if received == self.parallel_total {
            let aggregate = Self::total(&state.reports);
            info!(
                "All {} nodes reported: {} - {}",
                received,
                aggregate.counts,
                if aggregate.succeeded { "passed" } else { "failed" }
            );
            self.complete.send_replace(Some(aggregate));
        }

        Ok(EndResponse {
            received,
            expected: self.parallel_total,
        })
    }

    fn total(reports: &BTreeMap<u32, WorkerReport>) -> AggregateReport {
        let mut counts = SuiteCounts::default();
        let mut succeeded = true;
        for report in reports.values() {
            counts.merge(&report.counts);
            succeeded &= report.succeeded;
        }
        AggregateReport {
            counts,
            succeeded,
            workers: reports.len() as u32,
        }
    }

    /// The grand total, if every worker has reported
    pub fn aggregate(&self) -> Option<AggregateReport> {
        *self.complete.borrow()
    }

    /// Wait until every worker has reported
    pub async fn wait_aggregate(&self) -> SyncResult<AggregateReport> {
        let mut rx = self.complete.subscribe();
        loop {
            if let Some(aggregate) = *rx.borrow_and_update() {
                return Ok(aggregate);
            }
            rx.changed().await.map_err(|_| SyncError::Closed)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn report(node: u32, passed: usize, failed: usize) -> WorkerReport {
        WorkerReport {
            node,
            counts: SuiteCounts {
                total: passed + failed,
                passed,
                failed,
                ..Default::default()
            },
            succeeded: failed == 0,
        }
    }

    #[test]
    fn test_aggregate_after_all_reports() {
        let agg = Aggregator::new(3);

        agg.report(report(1, 2, 0)).unwrap();
        assert!(agg.aggregate().is_none());
        agg.report(report(2, 1, 1)).unwrap();
        assert!(agg.aggregate().is_none());
        let ack = agg.report(report(3, 3, 0)).unwrap();
        assert_eq!(ack, EndResponse { received: 3, expected: 3 });

        let total = agg.aggregate().unwrap();
        assert_eq!(total.counts.passed, 6);
        assert_eq!(total.counts.failed, 1);
        assert_eq!(total.counts.total, 7);
        assert_eq!(total.workers, 3);
        assert!(!total.succeeded);
    }

    #[test]
    fn test_all_passing_shards_succeed() {
        let agg = Aggregator::new(2);
        agg.report(report(1, 1, 0)).unwrap();
        agg.report(report(2, 4, 0)).unwrap();
        let total = agg.aggregate().unwrap();
        assert!(total.succeeded);
        assert_eq!(total.counts.passed, 5);
    }

    #[test]
    fn test_duplicate_report_keeps_first() {
        let agg = Aggregator::new(2);
        agg.report(report(1, 2, 0)).unwrap();
        let err = agg.report(report(1, 0, 2)).unwrap_err();
        assert!(matches!(err, SyncError::DuplicateReport(1)));

        agg.report(report(2, 1, 0)).unwrap();
        let total = agg.aggregate().unwrap();
        assert_eq!(total.counts.passed, 3);
        assert_eq!(total.counts.failed, 0);
    }

    #[test]
    fn test_out_of_range_nodes() {
        let agg = Aggregator::new(2);
        assert!(matches!(
            agg.report(report(0, 1, 0)),
            Err(SyncError::NodeOutOfRange { node: 0, total: 2 })
        ));
        assert!(matches!(
            agg.begin(3),
            Err(SyncError::NodeOutOfRange { node: 3, total: 2 })
        ));
    }

    #[test]
    fn test_begin_agrees_on_origin() {
        let agg = Aggregator::new(2);
        let first = agg.begin(1).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = agg.begin(2).unwrap();
        assert_eq!(first, second);
        assert_eq!(agg.begin(1).unwrap(), first);
    }

    #[tokio::test]
    async fn test_wait_blocks_until_complete() {
        let agg = Arc::new(Aggregator::new(2));
        let waiter = {
            let agg = agg.clone();
            tokio::spawn(async move { agg.wait_aggregate().await })
        };

        agg.report(report(1, 1, 0)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        agg.report(report(2, 1, 0)).unwrap();
        let total = waiter.await.unwrap().unwrap();
        assert_eq!(total.counts.passed, 2);
        assert!(total.succeeded);
    }
}
