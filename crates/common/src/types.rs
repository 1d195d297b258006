//! Core types for spectree

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Source position where a node was declared or a failure was signalled
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl CodeLocation {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Location of the caller of the `#[track_caller]` chain that reaches this function
    #[track_caller]
    pub fn caller() -> Self {
        Self::from(std::panic::Location::caller())
    }
}

impl From<&std::panic::Location<'_>> for CodeLocation {
    fn from(loc: &std::panic::Location<'_>) -> Self {
        Self::new(loc.file(), loc.line(), loc.column())
    }
}

impl std::fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Kind of node in a spec tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Container,
    It,
    Measure,
    BeforeEach,
    JustBeforeEach,
    AfterEach,
    JustAfterEach,
    BeforeSuite,
    AfterSuite,
}

impl NodeKind {
    /// Leaves that terminate a spec path
    pub fn is_subject(&self) -> bool {
        matches!(self, NodeKind::It | NodeKind::Measure)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Container => write!(f, "Container"),
            NodeKind::It => write!(f, "It"),
            NodeKind::Measure => write!(f, "Measure"),
            NodeKind::BeforeEach => write!(f, "BeforeEach"),
            NodeKind::JustBeforeEach => write!(f, "JustBeforeEach"),
            NodeKind::AfterEach => write!(f, "AfterEach"),
            NodeKind::JustAfterEach => write!(f, "JustAfterEach"),
            NodeKind::BeforeSuite => write!(f, "BeforeSuite"),
            NodeKind::AfterSuite => write!(f, "AfterSuite"),
        }
    }
}

/// Focus/pending marker carried by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeFlag {
    None,
    Focused,
    Pending,
}

impl Default for NodeFlag {
    fn default() -> Self {
        Self::None
    }
}

/// Lifecycle state of a spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecState {
    NotRun,
    Passed,
    Failed,
    Panicked,
    TimedOut,
    Skipped,
    Pending,
}

impl SpecState {
    /// Failed, panicked or timed out
    pub fn is_failure(&self) -> bool {
        matches!(self, SpecState::Failed | SpecState::Panicked | SpecState::TimedOut)
    }
}

impl Default for SpecState {
    fn default() -> Self {
        Self::NotRun
    }
}

impl std::fmt::Display for SpecState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecState::NotRun => write!(f, "not run"),
            SpecState::Passed => write!(f, "passed"),
            SpecState::Failed => write!(f, "failed"),
            SpecState::Panicked => write!(f, "panicked"),
            SpecState::TimedOut => write!(f, "timed out"),
            SpecState::Skipped => write!(f, "skipped"),
            SpecState::Pending => write!(f, "pending"),
        }
    }
}

/// Details of why a spec (or a suite-level node) failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecFailure {
    pub message: String,
    /// Where the failure was signalled (or where the panic happened)
    pub location: CodeLocation,
    /// Kind of the node that was executing
    pub component: NodeKind,
    /// Declaration site of the node that was executing
    pub component_location: CodeLocation,
    /// Panic payload text, for panicked steps
    #[serde(default)]
    pub panic_payload: Option<String>,
    #[serde(default)]
    pub backtrace: Option<String>,
}

/// Timing samples of a measure leaf
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecMeasurement {
    pub samples_ms: Vec<f64>,
}

impl SpecMeasurement {
    pub fn record(&mut self, sample: Duration) {
        self.samples_ms.push(sample.as_secs_f64() * 1000.0);
    }

    pub fn len(&self) -> usize {
        self.samples_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples_ms.is_empty()
    }

    pub fn min_ms(&self) -> Option<f64> {
        self.samples_ms.iter().copied().reduce(f64::min)
    }

    pub fn max_ms(&self) -> Option<f64> {
        self.samples_ms.iter().copied().reduce(f64::max)
    }

    pub fn mean_ms(&self) -> Option<f64> {
        if self.samples_ms.is_empty() {
            return None;
        }
        Some(self.samples_ms.iter().sum::<f64>() / self.samples_ms.len() as f64)
    }
}

/// Outcome record of one spec, consumed by reporters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecSummary {
    /// Container texts and subject text joined by spaces
    pub description: String,
    pub container_texts: Vec<String>,
    pub text: String,
    pub location: CodeLocation,
    pub state: SpecState,
    pub failure: Option<SpecFailure>,
    pub run_time: Duration,
    pub captured_output: String,
    pub attempts: u32,
    pub measurement: Option<SpecMeasurement>,
}

impl SpecSummary {
    /// Passed only after a retry
    pub fn flaked(&self) -> bool {
        self.state == SpecState::Passed && self.attempts > 1
    }
}

/// Spec counts by outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    pub skipped: usize,
    pub flaked: usize,
}

impl SuiteCounts {
    /// Count one finished spec
    pub fn record(&mut self, spec: &SpecSummary) {
        self.total += 1;
        match spec.state {
            SpecState::Passed => {
                self.passed += 1;
                if spec.flaked() {
                    self.flaked += 1;
                }
            }
            SpecState::Failed | SpecState::Panicked | SpecState::TimedOut => self.failed += 1,
            SpecState::Pending => self.pending += 1,
            SpecState::Skipped | SpecState::NotRun => self.skipped += 1,
        }
    }

    /// Accumulate another worker's counts
    pub fn merge(&mut self, other: &SuiteCounts) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.pending += other.pending;
        self.skipped += other.skipped;
        self.flaked += other.flaked;
    }
}

impl std::fmt::Display for SuiteCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} pending, {} skipped ({} flaked) of {}",
            self.passed, self.failed, self.pending, self.skipped, self.flaked, self.total
        )
    }
}

/// One worker's end-of-shard report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub node: u32,
    pub counts: SuiteCounts,
    pub succeeded: bool,
}

/// Grand total across all parallel workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub counts: SuiteCounts,
    /// True iff every worker's shard succeeded
    pub succeeded: bool,
    pub workers: u32,
}

/// Result of a full (local) suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub description: String,
    pub random_seed: i64,
    pub parallel_node: u32,
    pub parallel_total: u32,
    pub counts: SuiteCounts,
    /// Outcome of this worker's shard
    pub succeeded: bool,
    pub run_time: Duration,
    pub specs: Vec<SpecSummary>,
    /// BeforeSuite/AfterSuite failures
    #[serde(default)]
    pub suite_failures: Vec<SpecFailure>,
    /// Grand total, present when running with more than one worker
    #[serde(default)]
    pub aggregate: Option<AggregateReport>,
}

impl SuiteSummary {
    /// Global outcome: the aggregate's when parallel, the local shard's otherwise
    pub fn overall_succeeded(&self) -> bool {
        match &self.aggregate {
            Some(aggregate) => aggregate.succeeded,
            None => self.succeeded,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.overall_succeeded() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(state: SpecState, attempts: u32) -> SpecSummary {
        SpecSummary {
            description: "a b".to_string(),
            container_texts: vec!["a".to_string()],
            text: "b".to_string(),
            location: CodeLocation::new("spec.rs", 1, 1),
            state,
            failure: None,
            run_time: Duration::ZERO,
            captured_output: String::new(),
            attempts,
            measurement: None,
        }
    }

    #[test]
    fn test_counts_record_states() {
        let mut counts = SuiteCounts::default();
        counts.record(&summary(SpecState::Passed, 1));
        counts.record(&summary(SpecState::Passed, 3));
        counts.record(&summary(SpecState::TimedOut, 1));
        counts.record(&summary(SpecState::Panicked, 1));
        counts.record(&summary(SpecState::Pending, 0));
        counts.record(&summary(SpecState::Skipped, 0));

        assert_eq!(counts.total, 6);
        assert_eq!(counts.passed, 2);
        assert_eq!(counts.flaked, 1);
        assert_eq!(counts.failed, 2);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.skipped, 1);
    }

    #[test]
    fn test_counts_merge() {
        let mut total = SuiteCounts {
            total: 2,
            passed: 2,
            ..Default::default()
        };
        total.merge(&SuiteCounts {
            total: 2,
            passed: 1,
            failed: 1,
            ..Default::default()
        });
        assert_eq!(total.total, 4);
        assert_eq!(total.passed, 3);
        assert_eq!(total.failed, 1);
    }

    #[test]
    fn test_measurement_stats() {
        let mut m = SpecMeasurement::default();
        assert!(m.mean_ms().is_none());
        m.record(Duration::from_millis(10));
        m.record(Duration::from_millis(30));
        assert_eq!(m.len(), 2);
        assert_eq!(m.min_ms(), Some(10.0));
        assert_eq!(m.max_ms(), Some(30.0));
        assert_eq!(m.mean_ms(), Some(20.0));
    }

    #[test]
    fn test_caller_location() {
        let here = line!() + 1;
        let loc = CodeLocation::caller();
        assert_eq!(loc.line, here);
        assert!(loc.file.ends_with("types.rs"));
    }

    #[test]
    fn test_overall_prefers_aggregate() {
        let s = SuiteSummary {
            description: "suite".to_string(),
            random_seed: 1,
            parallel_node: 1,
            parallel_total: 2,
            counts: SuiteCounts::default(),
            succeeded: true,
            run_time: Duration::ZERO,
            specs: vec![],
            suite_failures: vec![],
            aggregate: Some(AggregateReport {
                counts: SuiteCounts::default(),
                succeeded: false,
                workers: 2,
            }),
        };
        assert!(!s.overall_succeeded());
        assert_eq!(s.exit_code(), 1);
    }
}
