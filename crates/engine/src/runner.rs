//! Spec runner: setup chain, subject, teardown chain
//!
//! Every body runs on its own `spectree-step` thread. A panic is caught on
//! that thread and the result comes back over a oneshot channel; the subject's
//! wait is bounded by the configured timeout. A thread that outlives its
//! timeout is detached, never killed.

use spectree_common::{
    CodeLocation, NodeKind, RetryScope, SpecFailure, SpecMeasurement, SpecState, SuiteConfig,
};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::context::SpecContext;
use crate::error::EngineResult;
use crate::failure::Failure;
use crate::node::{NodeId, SpecTree};
use crate::panics::{self, panic_message, PanicDetails, STEP_THREAD_NAME};
use crate::spec::Spec;

/// Execution knobs taken from the suite configuration
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub timeout: Option<Duration>,
    pub max_attempts: u32,
    pub retry_scope: RetryScope,
    pub emit_progress: bool,
    pub dry_run: bool,
    pub parallel_node: u32,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from(&SuiteConfig::default())
    }
}

impl From<&SuiteConfig> for RunnerSettings {
    fn from(config: &SuiteConfig) -> Self {
        Self {
            timeout: config.spec_timeout(),
            max_attempts: config.max_attempts(),
            retry_scope: config.flake_retry_scope,
            emit_progress: config.emit_spec_progress,
            dry_run: config.dry_run,
            parallel_node: config.parallel_node,
        }
    }
}

/// What came back from a step thread
enum BodyOutcome {
    Returned(Result<(), Failure>),
    Panicked {
        message: String,
        details: Option<PanicDetails>,
    },
}

/// Failure state of one attempt; the first failure wins
#[derive(Default)]
struct AttemptRecord {
    failure: Option<(SpecState, SpecFailure)>,
    measurement: Option<SpecMeasurement>,
}

impl AttemptRecord {
    fn record(&mut self, ctx: &SpecContext, outcome: Option<(SpecState, SpecFailure)>) -> bool {
        match outcome {
            Some(failure) => {
                ctx.mark_failed();
                if self.failure.is_none() {
                    self.failure = Some(failure);
                }
                false
            }
            None => true,
        }
    }

    fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

pub struct SpecRunner<'a> {
    tree: &'a SpecTree,
    settings: RunnerSettings,
}

impl<'a> SpecRunner<'a> {
    pub fn new(tree: &'a SpecTree, settings: RunnerSettings) -> Self {
        panics::install_hook();
        Self { tree, settings }
    }

    /// Run `spec` to a terminal state
    ///
    /// Pending and skipped specs are left untouched. Only a failure to start a
    /// step thread is an error; everything a body does is recorded on the spec.
    pub async fn run(&self, spec: &mut Spec) -> EngineResult<()> {
        if !spec.is_runnable() {
            return Ok(());
        }

        if self.settings.dry_run {
            spec.state = SpecState::Passed;
            spec.attempts = 0;
            return Ok(());
        }

        let start = Instant::now();
        let measured = self.tree.node(spec.subject()).kind() == NodeKind::Measure;
        let (attempts, record, ctx) = match self.settings.retry_scope {
            RetryScope::Subject if !measured => self.run_with_subject_retries(spec).await?,
            _ => self.run_with_spec_retries(spec, measured).await?,
        };

        spec.run_time = start.elapsed();
        spec.attempts = attempts;
        spec.captured_output = ctx.captured_output();
        spec.measurement = record.measurement;
        match record.failure {
            Some((state, failure)) => {
                spec.state = state;
                spec.failure = Some(failure);
            }
            None => {
                spec.state = SpecState::Passed;
                spec.failure = None;
            }
        }

        if attempts > 1 && spec.state == SpecState::Passed {
            debug!("{} passed after {} attempts", spec.description(), attempts);
        }
        Ok(())
    }

    async fn run_with_spec_retries(
        &self,
        spec: &Spec,
        measured: bool,
    ) -> EngineResult<(u32, AttemptRecord, SpecContext)> {
        let max = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let ctx = SpecContext::new(spec, attempt, self.settings.parallel_node);
            let mut record = AttemptRecord::default();

            if measured {
                self.run_samples(spec, &ctx, &mut record).await?;
            } else {
                self.run_once(spec, &ctx, &mut record).await?;
            }

            if !record.failed() || attempt >= max {
                return Ok((attempt, record, ctx));
            }
            debug!(
                "{} failed attempt {} of {}, retrying",
                spec.description(),
                attempt,
                max
            );
            attempt += 1;
        }
    }

    async fn run_with_subject_retries(
        &self,
        spec: &Spec,
    ) -> EngineResult<(u32, AttemptRecord, SpecContext)> {
        let max = self.settings.max_attempts.max(1);
        let ctx = SpecContext::new(spec, 1, self.settings.parallel_node);
        let mut record = AttemptRecord::default();
        let mut attempt = 1;

        if self.run_setup(spec, &ctx, &mut record).await? {
            loop {
                let mut subject = AttemptRecord::default();
                self.run_subject(spec, &ctx, &mut subject).await?;
                if !subject.failed() || attempt >= max {
                    record.failure = subject.failure;
                    break;
                }
                attempt += 1;
                ctx.begin_retry(attempt);
            }
            if record.failed() {
                ctx.mark_failed();
            }
        }
        self.run_teardown(spec, &ctx, &mut record).await?;

        Ok((attempt, record, ctx))
    }

    /// Returns false when a setup step failed
    async fn run_setup(
        &self,
        spec: &Spec,
        ctx: &SpecContext,
        record: &mut AttemptRecord,
    ) -> EngineResult<bool> {
        for node in spec.setup_chain() {
            let outcome = self.run_step(*node, ctx, None).await?;
            if !record.record(ctx, outcome) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns false when the subject failed
    async fn run_subject(
        &self,
        spec: &Spec,
        ctx: &SpecContext,
        record: &mut AttemptRecord,
    ) -> EngineResult<bool> {
        let outcome = self.run_step(spec.subject(), ctx, self.settings.timeout).await?;
        Ok(record.record(ctx, outcome))
    }

    async fn run_once(
        &self,
        spec: &Spec,
        ctx: &SpecContext,
        record: &mut AttemptRecord,
    ) -> EngineResult<()> {
        if self.run_setup(spec, ctx, record).await? {
            self.run_subject(spec, ctx, record).await?;
        }
        self.run_teardown(spec, ctx, record).await
    }

    /// Every sample is a full setup, subject, teardown pass
    ///
    /// Only the subject is timed. Sampling stops after the first failing pass.
    async fn run_samples(
        &self,
        spec: &Spec,
        ctx: &SpecContext,
        record: &mut AttemptRecord,
    ) -> EngineResult<()> {
        let samples = self.tree.node(spec.subject()).samples();
        let mut measurement = SpecMeasurement::default();
        for _ in 0..samples {
            if self.run_setup(spec, ctx, record).await? {
                let start = Instant::now();
                if self.run_subject(spec, ctx, record).await? {
                    measurement.record(start.elapsed());
                }
            }
            self.run_teardown(spec, ctx, record).await?;
            if record.failed() {
                break;
            }
        }
        record.measurement = Some(measurement);
        Ok(())
    }

    async fn run_teardown(
        &self,
        spec: &Spec,
        ctx: &SpecContext,
        record: &mut AttemptRecord,
    ) -> EngineResult<()> {
        for node in spec.teardown_chain() {
            let outcome = self.run_step(*node, ctx, None).await?;
            record.record(ctx, outcome);
        }
        Ok(())
    }

    /// Run a BeforeSuite or AfterSuite body
    pub async fn run_suite_node(
        &self,
        node: NodeId,
        suite_description: &str,
    ) -> EngineResult<Option<SpecFailure>> {
        if self.settings.dry_run {
            return Ok(None);
        }
        let ctx = SpecContext::for_suite(suite_description, self.settings.parallel_node);
        let outcome = self.run_step(node, &ctx, None).await?;
        let captured = ctx.captured_output();
        if !captured.is_empty() {
            debug!("{} output:\n{}", self.tree.node(node).kind(), captured.trim_end());
        }
        Ok(outcome.map(|(_, failure)| failure))
    }

    /// Run one body on a step thread; `None` means it passed
    async fn run_step(
        &self,
        id: NodeId,
        ctx: &SpecContext,
        timeout: Option<Duration>,
    ) -> EngineResult<Option<(SpecState, SpecFailure)>> {
        let node = self.tree.node(id);
        let body = match node.body() {
            Some(body) => body.clone(),
            None => return Ok(None),
        };

        if self.settings.emit_progress {
            let line = format!("[{}] {}", node.kind(), node.location());
            debug!("{}", line);
            ctx.log(&line);
        }

        let (tx, rx) = oneshot::channel();
        let step_ctx = ctx.clone();
        std::thread::Builder::new()
            .name(STEP_THREAD_NAME.to_string())
            .spawn(move || {
                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| body(&step_ctx))) {
                    Ok(result) => BodyOutcome::Returned(result),
                    Err(payload) => BodyOutcome::Panicked {
                        message: panic_message(payload.as_ref()),
                        details: panics::take_last(),
                    },
                };
                let _ = tx.send(outcome);
            })?;

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    warn!("{} at {} timed out after {:?}", node.kind(), node.location(), limit);
                    return Ok(Some((
                        SpecState::TimedOut,
                        self.failure(id, format!("timed out after {:?}", limit), node.location().clone()),
                    )));
                }
            },
            None => rx.await,
        };

        let outcome = match received {
            Ok(outcome) => outcome,
            Err(_) => BodyOutcome::Panicked {
                message: "step thread exited without a result".to_string(),
                details: None,
            },
        };

        Ok(match outcome {
            BodyOutcome::Returned(Ok(())) => None,
            BodyOutcome::Returned(Err(failure)) => Some((
                SpecState::Failed,
                self.failure(id, failure.message, failure.location),
            )),
            BodyOutcome::Panicked { message, details } => {
                let details = details.unwrap_or_default();
                let location = details
                    .location
                    .unwrap_or_else(|| node.location().clone());
                let mut failure = self.failure(id, format!("panic: {}", message), location);
                failure.panic_payload = Some(message);
                failure.backtrace = details.backtrace;
                Some((SpecState::Panicked, failure))
            }
        })
    }

    fn failure(&self, id: NodeId, message: String, location: CodeLocation) -> SpecFailure {
        let node = self.tree.node(id);
        SpecFailure {
            message,
            location,
            component: node.kind(),
            component_location: node.location().clone(),
            panic_payload: None,
            backtrace: None,
        }
    }
}
