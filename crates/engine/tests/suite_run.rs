//! Whole-suite behavior: filtering, fail-fast, suite nodes, dry-run and
//! sharded runs against a live synchronizer

use parking_lot::Mutex;
use spectree::{
    ensure, fail, EngineError, RecordingReporter, RunConfig, SpecState, Suite, SuiteSummary,
};
use spectree_common::ConfigError;
use spectree_sync::SyncServer;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

type Journal = Arc<Mutex<Vec<String>>>;

fn config() -> RunConfig {
    let mut config = RunConfig::default();
    config.suite.random_seed = 1138;
    config
}

fn state_of(summary: &SuiteSummary, text: &str) -> SpecState {
    summary
        .specs
        .iter()
        .find(|s| s.text == text)
        .map(|s| s.state)
        .unwrap_or_else(|| panic!("no spec {:?}", text))
}

fn recorder(journal: &Journal, name: &'static str) -> impl Fn(&spectree::SpecContext) -> spectree::StepResult + Send + Sync + 'static {
    let journal = journal.clone();
    move |_| {
        journal.lock().push(name.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn fail_fast_skips_the_rest_without_invoking_them() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let mut config = config();
    config.suite.fail_fast = true;

    let suite = Suite::declare("fail fast", config, |t| {
        t.describe("ordered", |t| {
            let log = journal.clone();
            t.it("A", move |_| {
                log.lock().push("A".to_string());
                fail("A is broken")
            });
            t.it("B", recorder(&journal, "B"));
            t.it("C", recorder(&journal, "C"));
        });
    })
    .unwrap();

    let mut reporter = RecordingReporter::new();
    let summary = suite.run(&mut reporter).await.unwrap();

    assert_eq!(*journal.lock(), vec!["A"]);
    assert_eq!(state_of(&summary, "A"), SpecState::Failed);
    assert_eq!(state_of(&summary, "B"), SpecState::Skipped);
    assert_eq!(state_of(&summary, "C"), SpecState::Skipped);
    assert!(!summary.succeeded);
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(reporter.completed().len(), 3);
}

#[tokio::test]
async fn pending_and_filters() {
    let mut config = config();
    config.suite.focus_strings = vec!["widgets".to_string()];
    config.suite.skip_strings = vec!["broken".to_string()];

    let suite = Suite::declare("filters", config, |t| {
        t.describe("widgets", |t| {
            t.it("render", |_| Ok(()));
            t.it("broken render", |_| fail("should never run"));
            t.pending_it("future render", |_| fail("should never run"));
        });
        t.describe("gadgets", |t| {
            t.it("spin", |_| fail("should never run"));
        });
    })
    .unwrap();

    let summary = suite.run(&mut RecordingReporter::new()).await.unwrap();
    assert_eq!(state_of(&summary, "render"), SpecState::Passed);
    assert_eq!(state_of(&summary, "broken render"), SpecState::Skipped);
    assert_eq!(state_of(&summary, "future render"), SpecState::Pending);
    assert_eq!(state_of(&summary, "spin"), SpecState::Skipped);
    assert!(summary.succeeded);
    assert_eq!(summary.counts.total, 4);
    assert_eq!(summary.counts.passed, 1);
    assert_eq!(summary.counts.pending, 1);
    assert_eq!(summary.counts.skipped, 2);
}

#[tokio::test]
async fn focus_on_the_suite_description_selects_every_spec() {
    let mut config = config();
    config.suite.focus_strings = vec!["Books Suite".to_string()];

    let suite = Suite::declare("Books Suite", config, |t| {
        t.describe("Book", |t| {
            t.it("is a novel", |_| Ok(()));
            t.it("has an author", |_| Ok(()));
        });
    })
    .unwrap();

    let summary = suite.run(&mut RecordingReporter::new()).await.unwrap();
    assert_eq!(state_of(&summary, "is a novel"), SpecState::Passed);
    assert_eq!(state_of(&summary, "has an author"), SpecState::Passed);
    assert_eq!(summary.counts.passed, 2);
}

#[tokio::test]
async fn fail_on_pending_fails_the_suite() {
    let mut config = config();
    config.suite.fail_on_pending = true;

    let suite = Suite::declare("pending", config, |t| {
        t.it("works", |_| Ok(()));
        t.pending_it("todo", |_| Ok(()));
    })
    .unwrap();

    let summary = suite.run(&mut RecordingReporter::new()).await.unwrap();
    assert_eq!(summary.counts.failed, 0);
    assert!(!summary.succeeded);
}

#[tokio::test]
async fn dry_run_keeps_ordering_and_invokes_nothing() {
    let calls = Arc::new(AtomicU32::new(0));
    let declare = |calls: Arc<AtomicU32>| {
        move |t: &mut spectree::TreeBuilder| {
            let c = calls.clone();
            t.before_suite(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            for group in ["one", "two", "three", "four"] {
                let calls = calls.clone();
                t.describe(group, move |t| {
                    let c = calls.clone();
                    t.before_each(move |_| {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    });
                    let c = calls.clone();
                    t.it("runs", move |_| {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    });
                    t.pending_it("waits", |_| Ok(()));
                });
            }
        }
    };

    let mut dry = config();
    dry.suite.dry_run = true;
    let dry_suite = Suite::declare("dry", dry, declare(calls.clone())).unwrap();
    let dry_summary = dry_suite.run(&mut RecordingReporter::new()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let real_calls = Arc::new(AtomicU32::new(0));
    let real_suite = Suite::declare("real", config(), declare(real_calls.clone())).unwrap();
    let real_summary = real_suite.run(&mut RecordingReporter::new()).await.unwrap();
    assert!(real_calls.load(Ordering::SeqCst) > 0);

    let order = |summary: &SuiteSummary| -> Vec<(String, SpecState)> {
        summary
            .specs
            .iter()
            .map(|s| (s.description.clone(), s.state))
            .collect()
    };
    assert_eq!(order(&dry_summary), order(&real_summary));
    for spec in dry_summary.specs.iter().filter(|s| s.text == "runs") {
        assert_eq!(spec.state, SpecState::Passed);
        assert_eq!(spec.attempts, 0);
    }
}

#[tokio::test]
async fn before_suite_failure_skips_specs_and_after_suite_still_runs() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));

    let suite = Suite::declare("suite nodes", config(), |t| {
        t.before_suite(|_| fail("database unavailable"));
        t.after_suite(recorder(&journal, "after suite"));
        t.it("needs the database", recorder(&journal, "spec"));
    })
    .unwrap();

    let summary = suite.run(&mut RecordingReporter::new()).await.unwrap();
    assert_eq!(*journal.lock(), vec!["after suite"]);
    assert_eq!(state_of(&summary, "needs the database"), SpecState::Skipped);
    assert_eq!(summary.suite_failures.len(), 1);
    assert_eq!(summary.suite_failures[0].message, "database unavailable");
    assert!(!summary.succeeded);
}

#[tokio::test]
async fn flaky_spec_counts_as_flaked() {
    let mut config = config();
    config.suite.flake_attempts = 3;
    let calls = Arc::new(AtomicU32::new(0));

    let suite = Suite::declare("flakes", config, |t| {
        let calls = calls.clone();
        t.it("eventually", move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            ensure(n >= 1, "first call fails")
        });
    })
    .unwrap();

    let summary = suite.run(&mut RecordingReporter::new()).await.unwrap();
    assert!(summary.succeeded);
    assert_eq!(summary.counts.passed, 1);
    assert_eq!(summary.counts.flaked, 1);
    assert_eq!(summary.specs[0].attempts, 2);
}

#[tokio::test]
async fn declaration_errors_surface_before_running() {
    let result = Suite::declare("bad", config(), |t| {
        t.describe("nested", |t| t.after_suite(|_| Ok(())));
    });
    match result {
        Err(EngineError::Declaration(e)) => assert!(e.message.contains("top level")),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("declaration should fail"),
    }
}

#[tokio::test]
async fn configuration_errors_are_collected() {
    let mut config = config();
    config.suite.parallel_total = 2;
    config.suite.parallel_node = 3;
    config.suite.dry_run = true;
    config.suite.focus_strings = vec!["(".to_string()];
    config.reporter.verbose = true;
    config.reporter.succinct = true;

    let suite = Suite::declare("misconfigured", config, |t| t.it("x", |_| Ok(()))).unwrap();
    match suite.run(&mut RecordingReporter::new()).await {
        Err(EngineError::Config(errors)) => {
            let errors: Vec<&ConfigError> = errors.iter().collect();
            assert!(errors.contains(&&ConfigError::InvalidParallelNode { node: 3, total: 2 }));
            assert!(errors.contains(&&ConfigError::MissingParallelHost));
            assert!(errors.contains(&&ConfigError::DryRunInParallel));
            assert!(errors.contains(&&ConfigError::ConflictingVerboseSuccinct));
            assert!(errors
                .iter()
                .any(|e| matches!(e, ConfigError::InvalidPattern { kind: "focus", .. })));
        }
        other => panic!("expected configuration errors, got {:?}", other.map(|s| s.succeeded)),
    }
}

#[tokio::test]
async fn unreachable_parallel_host_is_a_configuration_error() {
    let mut config = config();
    config.suite.parallel_total = 2;
    config.suite.parallel_host = Some("http://127.0.0.1:9".to_string());

    let suite = Suite::declare("lonely", config, |t| t.it("x", |_| Ok(()))).unwrap();
    match suite.run(&mut RecordingReporter::new()).await {
        Err(EngineError::Config(errors)) => {
            assert!(errors
                .iter()
                .any(|e| matches!(e, ConfigError::UnreachableParallelHost(_))));
        }
        other => panic!("expected unreachable host, got {:?}", other.map(|s| s.succeeded)),
    }
}

#[tokio::test]
async fn sharded_workers_agree_on_the_aggregate() {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let (local, _server) = SyncServer::new(3).spawn(addr).await.unwrap();
    let host = format!("http://{}", local);

    let worker = |node: u32| {
        let mut config = config();
        config.suite.parallel_node = node;
        config.suite.parallel_total = 3;
        config.suite.parallel_host = Some(host.clone());
        Suite::declare("sharded", config, |t| {
            t.describe("math", |t| {
                for i in 0..6 {
                    t.it(format!("case {}", i), |_| Ok(()));
                }
                t.it("broken case", |_| fail("off by one"));
            });
        })
        .unwrap()
    };
    let (one, two, three) = (worker(1), worker(2), worker(3));

    let mut r1 = RecordingReporter::new();
    let mut r2 = RecordingReporter::new();
    let mut r3 = RecordingReporter::new();
    let (s1, s2, s3) = tokio::join!(one.run(&mut r1), two.run(&mut r2), three.run(&mut r3));
    let summaries = [s1.unwrap(), s2.unwrap(), s3.unwrap()];

    let shard_total: usize = summaries.iter().map(|s| s.counts.total).sum();
    assert_eq!(shard_total, 7);

    let aggregate = summaries[0].aggregate.unwrap();
    assert_eq!(aggregate.workers, 3);
    assert_eq!(aggregate.counts.total, 7);
    assert_eq!(aggregate.counts.passed, 6);
    assert_eq!(aggregate.counts.failed, 1);
    assert!(!aggregate.succeeded);
    for summary in &summaries {
        assert_eq!(summary.aggregate, Some(aggregate));
        assert_eq!(summary.exit_code(), 1);
    }
}
