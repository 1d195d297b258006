//! Reporter interface and the two built-in reporters

use serde::Serialize;
use spectree_common::{ReporterConfig, SpecState, SpecSummary, SuiteSummary};
use tracing::{debug, error, info, warn};

/// Announced once before any spec runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteBegin {
    pub description: String,
    pub random_seed: i64,
    pub parallel_node: u32,
    pub parallel_total: u32,
    /// Specs in this worker's shard
    pub total_specs: usize,
    /// Shard specs that are neither pending nor filtered out
    pub specs_to_run: usize,
}

/// Receives suite and spec lifecycle events
///
/// Every spec of the shard gets a `spec_will_run` / `spec_did_complete`
/// pair, including the ones that end up pending or skipped.
pub trait Reporter: Send {
    fn suite_will_begin(&mut self, begin: &SuiteBegin);
    fn spec_will_run(&mut self, spec: &SpecSummary);
    fn spec_did_complete(&mut self, spec: &SpecSummary);
    fn suite_did_end(&mut self, summary: &SuiteSummary);
}

/// Logs every event through `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingReporter {
    config: ReporterConfig,
}

impl TracingReporter {
    pub fn new(config: ReporterConfig) -> Self {
        Self { config }
    }
}

impl Reporter for TracingReporter {
    fn suite_will_begin(&mut self, begin: &SuiteBegin) {
        info!(
            "Running Suite: {} (seed {})",
            begin.description, begin.random_seed
        );
        if begin.parallel_total > 1 {
            info!(
                "Parallel node {} of {}",
                begin.parallel_node, begin.parallel_total
            );
        }
        info!(
            "Will run {} of {} specs",
            begin.specs_to_run, begin.total_specs
        );
    }

    fn spec_will_run(&mut self, spec: &SpecSummary) {
        if self.config.verbose {
            debug!("Starting {} ({})", spec.description, spec.location);
        }
    }

    fn spec_did_complete(&mut self, spec: &SpecSummary) {
        match spec.state {
            SpecState::Passed => {
                if spec.run_time > self.config.slow_spec_threshold() {
                    warn!(
                        "SLOW TEST [{:.3}s] {} ({})",
                        spec.run_time.as_secs_f64(),
                        spec.description,
                        spec.location
                    );
                } else if self.config.verbose || self.config.report_passed {
                    info!("✓ {} ({} ms)", spec.description, spec.run_time.as_millis());
                }
                if spec.flaked() {
                    warn!(
                        "{} passed after {} attempts",
                        spec.description, spec.attempts
                    );
                }
                if self.config.report_passed && !spec.captured_output.is_empty() {
                    info!("{}", spec.captured_output.trim_end());
                }
            }
            SpecState::Failed | SpecState::Panicked | SpecState::TimedOut => {
                let message = spec
                    .failure
                    .as_ref()
                    .map(|f| format!("{} [{} at {}] ({})", f.message, f.component, f.component_location, f.location))
                    .unwrap_or_else(|| "unknown failure".to_string());
                error!("✗ {} {}: {}", spec.state, spec.description, message);

                if !self.config.succinct && !spec.captured_output.is_empty() {
                    error!("Captured output:\n{}", spec.captured_output.trim_end());
                }
                if self.config.full_trace {
                    if let Some(backtrace) = spec.failure.as_ref().and_then(|f| f.backtrace.as_ref()) {
                        error!("{}", backtrace);
                    }
                }
            }
            SpecState::Pending => {
                if !self.config.succinct {
                    info!("P [PENDING] {}", spec.description);
                }
            }
            SpecState::Skipped | SpecState::NotRun => {
                if self.config.verbose {
                    debug!("S [SKIPPED] {}", spec.description);
                }
            }
        }
    }

    fn suite_did_end(&mut self, summary: &SuiteSummary) {
        for failure in &summary.suite_failures {
            error!(
                "{} failed: {} ({})",
                failure.component, failure.message, failure.location
            );
        }

        let ran = summary.counts.passed + summary.counts.failed;
        info!(
            "Ran {} of {} specs in {:.3} seconds",
            ran,
            summary.counts.total,
            summary.run_time.as_secs_f64()
        );
        if summary.succeeded {
            info!("SUCCESS! -- {}", summary.counts);
        } else {
            error!("FAIL! -- {}", summary.counts);
        }

        if let Some(aggregate) = &summary.aggregate {
            let verdict = if aggregate.succeeded { "SUCCESS" } else { "FAIL" };
            info!(
                "Aggregate of {} node(s): {} -- {}",
                aggregate.workers, verdict, aggregate.counts
            );
        }
    }
}

/// One recorded reporter call
#[derive(Debug, Clone)]
pub enum ReporterEvent {
    SuiteWillBegin(SuiteBegin),
    SpecWillRun(SpecSummary),
    SpecDidComplete(SpecSummary),
    SuiteDidEnd(SuiteSummary),
}

/// Keeps every event, in order
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    events: Vec<ReporterEvent>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ReporterEvent] {
        &self.events
    }

    /// Completed specs in completion order
    pub fn completed(&self) -> Vec<&SpecSummary> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReporterEvent::SpecDidComplete(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    pub fn begin(&self) -> Option<&SuiteBegin> {
        self.events.iter().find_map(|event| match event {
            ReporterEvent::SuiteWillBegin(begin) => Some(begin),
            _ => None,
        })
    }

    pub fn summary(&self) -> Option<&SuiteSummary> {
        self.events.iter().rev().find_map(|event| match event {
            ReporterEvent::SuiteDidEnd(summary) => Some(summary),
            _ => None,
        })
    }
}

impl Reporter for RecordingReporter {
    fn suite_will_begin(&mut self, begin: &SuiteBegin) {
        self.events.push(ReporterEvent::SuiteWillBegin(begin.clone()));
    }

    fn spec_will_run(&mut self, spec: &SpecSummary) {
        self.events.push(ReporterEvent::SpecWillRun(spec.clone()));
    }

    fn spec_did_complete(&mut self, spec: &SpecSummary) {
        self.events.push(ReporterEvent::SpecDidComplete(spec.clone()));
    }

    fn suite_did_end(&mut self, summary: &SuiteSummary) {
        self.events.push(ReporterEvent::SuiteDidEnd(summary.clone()));
    }
}
