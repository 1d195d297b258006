//! spectree: spec-tree test execution engine
//!
//! A suite is declared as a tree of nested containers and leaves, linearized
//! into an ordered, filtered and possibly shuffled collection of specs, and
//! run one spec at a time with panic and timeout isolation. Parallel workers
//! each run one shard and meet at the synchronizer (`spectree-sync`).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Suite::declare(description, RunConfig, |t| { ... })        │
//! │    └── TreeBuilder -> SpecTree (arena of Node)              │
//! │          ├── describe / context / focus_* / pending_*       │
//! │          ├── it / measure                                   │
//! │          ├── before_each / just_before_each                 │
//! │          ├── after_each / just_after_each                   │
//! │          └── before_suite / after_suite                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Suite::run(reporter)                                       │
//! │    ├── vet config, probe parallel host                      │
//! │    ├── SpecCollection::build(seed, focus, skip).shard(i, n) │
//! │    ├── SpecRunner::run(spec)                                │
//! │    │     setup chain -> subject (timeout) -> teardown chain │
//! │    └── SyncClient: begin -> end(report) -> aggregate        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use spectree::{ensure_eq, RunConfig, Suite, TracingReporter};
//!
//! # async fn demo() -> spectree::EngineResult<()> {
//! let suite = Suite::declare("arithmetic", RunConfig::default(), |t| {
//!     t.describe("addition", |t| {
//!         t.it("adds", |_| ensure_eq(1 + 1, 2));
//!     });
//! })?;
//! let mut reporter = TracingReporter::default();
//! let summary = suite.run(&mut reporter).await?;
//! std::process::exit(summary.exit_code());
//! # }
//! ```

pub mod collection;
pub mod context;
pub mod error;
pub mod failure;
pub mod node;
mod panics;
pub mod reporter;
pub mod runner;
pub mod spec;
pub mod suite;

pub use collection::{SpecCollection, SpecFilter};
pub use context::{SpecContext, SpecDescription, SpecWriter};
pub use error::{DeclarationError, EngineError, EngineResult};
pub use failure::{ensure, ensure_eq, fail, Failure, StepResult};
pub use node::{NodeId, SpecTree, TreeBuilder};
pub use reporter::{RecordingReporter, Reporter, ReporterEvent, SuiteBegin, TracingReporter};
pub use runner::{RunnerSettings, SpecRunner};
pub use spec::Spec;
pub use suite::Suite;

pub use spectree_common::{
    CodeLocation, NodeFlag, NodeKind, ReporterConfig, RetryScope, RunConfig, SpecFailure,
    SpecMeasurement, SpecState, SpecSummary, SuiteConfig, SuiteCounts, SuiteSummary,
};
