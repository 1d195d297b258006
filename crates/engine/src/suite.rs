//! Suite: declaration, collection and sequential execution of one shard

use spectree_common::{
    ConfigError, NodeKind, RunConfig, SpecFailure, SuiteCounts, SuiteSummary,
    WorkerReport,
};
use spectree_sync::SyncClient;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::collection::{SpecCollection, SpecFilter};
use crate::error::EngineResult;
use crate::node::{SpecTree, TreeBuilder};
use crate::reporter::{Reporter, SuiteBegin};
use crate::runner::{RunnerSettings, SpecRunner};
use crate::spec::Spec;

/// Probes of the parallel host before giving up on it
const HOST_PROBE_ATTEMPTS: usize = 10;
const HOST_PROBE_INTERVAL: Duration = Duration::from_millis(200);

/// A declared suite, ready to run
pub struct Suite {
    description: String,
    config: RunConfig,
    tree: SpecTree,
}

impl Suite {
    /// Run the declaration pass
    ///
    /// Fails with [`EngineError::Declaration`](crate::EngineError::Declaration)
    /// before anything runs if the tree is malformed.
    pub fn declare<F>(description: impl Into<String>, config: RunConfig, declare: F) -> EngineResult<Self>
    where
        F: FnOnce(&mut TreeBuilder),
    {
        let description = description.into();
        let tree = TreeBuilder::build(declare)?;
        debug!(
            "Suite {:?} declared {} spec(s)",
            description,
            tree.subject_count()
        );
        Ok(Self {
            description,
            config,
            tree,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn tree(&self) -> &SpecTree {
        &self.tree
    }

    /// The full ordered and filtered collection, before sharding
    pub fn collect(&self) -> EngineResult<SpecCollection> {
        let suite = &self.config.suite;
        let filter = SpecFilter::from_config(suite)?.in_suite(&self.description);
        Ok(SpecCollection::build(
            &self.tree,
            suite.random_seed,
            suite.randomize_all_specs,
            &filter,
        ))
    }

    /// Vet the configuration and, when parallel, reach the synchronizer
    async fn prepare(&self) -> EngineResult<Option<SyncClient>> {
        let suite = &self.config.suite;
        let mut errors = self.config.vet();

        let mut client = None;
        if errors.is_empty() && suite.is_parallel() {
            if let Some(host) = &suite.parallel_host {
                let candidate = SyncClient::new(host)?;
                match candidate
                    .wait_until_up(HOST_PROBE_ATTEMPTS, HOST_PROBE_INTERVAL)
                    .await
                {
                    Ok(()) => client = Some(candidate),
                    Err(e) => {
                        warn!("Parallel host {} is unreachable: {}", host, e);
                        errors.push(ConfigError::UnreachableParallelHost(host.clone()));
                    }
                }
            }
        }

        errors.into_result()?;
        Ok(client)
    }

    /// Run this worker's shard
    ///
    /// Configuration problems are all reported together before any spec runs.
    /// When parallel, the worker announces itself, runs its shard, submits its
    /// report and waits for the aggregate of every worker.
    pub async fn run(&self, reporter: &mut dyn Reporter) -> EngineResult<SuiteSummary> {
        let client = self.prepare().await?;
        let suite = &self.config.suite;
        let start = Instant::now();

        let collection = self.collect()?;
        let mut specs = collection.shard(suite.parallel_node, suite.parallel_total);

        if let Some(client) = &client {
            let origin = client.begin(suite.parallel_node).await?;
            info!(
                "Node {} of {} joined suite started at {}",
                suite.parallel_node, suite.parallel_total, origin
            );
        }

        reporter.suite_will_begin(&SuiteBegin {
            description: self.description.clone(),
            random_seed: suite.random_seed,
            parallel_node: suite.parallel_node,
            parallel_total: suite.parallel_total,
            total_specs: specs.len(),
            specs_to_run: specs.iter().filter(|s| s.is_runnable()).count(),
        });

        let runner = SpecRunner::new(&self.tree, RunnerSettings::from(suite));
        let mut suite_failures: Vec<SpecFailure> = Vec::new();

        if let Some(node) = self.tree.suite_node(NodeKind::BeforeSuite) {
            if let Some(failure) = runner.run_suite_node(node, &self.description).await? {
                warn!("BeforeSuite failed: {}", failure.message);
                suite_failures.push(failure);
                specs.iter_mut().for_each(Spec::halt);
            }
        }

        let mut halted = false;
        for spec in specs.iter_mut() {
            reporter.spec_will_run(&spec.summary());
            if halted {
                spec.halt();
            } else {
                runner.run(spec).await?;
            }
            reporter.spec_did_complete(&spec.summary());

            if suite.fail_fast && spec.state().is_failure() && !halted {
                info!("Fail-fast: halting after {}", spec.description());
                halted = true;
            }
        }

        if let Some(node) = self.tree.suite_node(NodeKind::AfterSuite) {
            if let Some(failure) = runner.run_suite_node(node, &self.description).await? {
                warn!("AfterSuite failed: {}", failure.message);
                suite_failures.push(failure);
            }
        }

        let summaries: Vec<_> = specs.iter().map(Spec::summary).collect();
        let mut counts = SuiteCounts::default();
        for summary in &summaries {
            counts.record(summary);
        }
        let pending_fails = suite.fail_on_pending && counts.pending > 0;
        let succeeded = counts.failed == 0 && suite_failures.is_empty() && !pending_fails;

        let mut summary = SuiteSummary {
            description: self.description.clone(),
            random_seed: suite.random_seed,
            parallel_node: suite.parallel_node,
            parallel_total: suite.parallel_total,
            counts,
            succeeded,
            run_time: start.elapsed(),
            specs: summaries,
            suite_failures,
            aggregate: None,
        };

        if let Some(client) = &client {
            let ack = client
                .end(&WorkerReport {
                    node: suite.parallel_node,
                    counts,
                    succeeded,
                })
                .await?;
            debug!("Reported to synchronizer ({} of {})", ack.received, ack.expected);
            summary.aggregate = Some(client.aggregate().await?);
        }

        reporter.suite_did_end(&summary);
        Ok(summary)
    }
}
