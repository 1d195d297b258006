//! Spec collection: ordering, filtering and sharding
//!
//! Building a collection is a pure function of the tree, the seed and the
//! focus/skip patterns. Every parallel worker builds the same collection and
//! then keeps its own shard of it.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use spectree_common::{ConfigError, ConfigErrors, NodeKind, SuiteConfig};
use tracing::debug;

use crate::node::{NodeId, SpecTree};
use crate::spec::Spec;

/// Compiled focus and skip patterns
#[derive(Debug, Clone, Default)]
pub struct SpecFilter {
    focus: Vec<Regex>,
    skip: Vec<Regex>,
    scan_file_path: bool,
    suite_description: String,
}

impl SpecFilter {
    pub fn new(
        focus: &[String],
        skip: &[String],
        scan_file_path: bool,
    ) -> Result<Self, ConfigErrors> {
        let mut errors = ConfigErrors::default();
        let focus = compile("focus", focus, &mut errors);
        let skip = compile("skip", skip, &mut errors);
        errors.into_result()?;

        Ok(Self {
            focus,
            skip,
            scan_file_path,
            suite_description: String::new(),
        })
    }

    /// Prefix every matched text with the suite's description
    pub fn in_suite(mut self, description: impl Into<String>) -> Self {
        self.suite_description = description.into();
        self
    }

    pub fn from_config(config: &SuiteConfig) -> Result<Self, ConfigErrors> {
        Self::new(
            &config.focus_strings,
            &config.skip_strings,
            config.regex_scans_file_path,
        )
    }

    pub fn has_focus_patterns(&self) -> bool {
        !self.focus.is_empty()
    }

    /// Suite description, container and subject texts, then the file when scanning paths
    fn subject_text(&self, spec: &Spec) -> String {
        let mut text = spec.description();
        if !self.suite_description.is_empty() {
            text = format!("{} {}", self.suite_description, text);
        }
        if self.scan_file_path {
            text.push(' ');
            text.push_str(&spec.location().file);
        }
        text
    }

    pub fn skips(&self, spec: &Spec) -> bool {
        let text = self.subject_text(spec);
        self.skip.iter().any(|re| re.is_match(&text))
    }

    pub fn focuses(&self, spec: &Spec) -> bool {
        let text = self.subject_text(spec);
        self.focus.iter().any(|re| re.is_match(&text))
    }
}

fn compile(kind: &'static str, patterns: &[String], errors: &mut ConfigErrors) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                errors.push(ConfigError::InvalidPattern {
                    kind,
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                });
                None
            }
        })
        .collect()
}

/// Ordered, filtered sequence of specs
#[derive(Debug, Clone)]
pub struct SpecCollection {
    specs: Vec<Spec>,
    programmatic_focus: bool,
}

impl SpecCollection {
    /// Linearize `tree` into specs
    ///
    /// Subject-bearing siblings are permuted with a generator seeded from
    /// `seed`: only the top level, or every level with `randomize_all`.
    /// Setup and teardown nodes keep their declaration order.
    pub fn build(tree: &SpecTree, seed: i64, randomize_all: bool, filter: &SpecFilter) -> Self {
        let mut rng = StdRng::seed_from_u64(seed as u64);
        let mut subjects = Vec::with_capacity(tree.subject_count());
        walk(tree, tree.root(), true, randomize_all, &mut rng, &mut subjects);

        let mut specs: Vec<Spec> = subjects.into_iter().map(|id| Spec::new(tree, id)).collect();
        let programmatic_focus = specs.iter().any(Spec::is_focused);
        let focusing = programmatic_focus || filter.has_focus_patterns();

        for spec in &mut specs {
            let unfocused = focusing && !(spec.is_focused() || filter.focuses(spec));
            if filter.skips(spec) || unfocused {
                spec.mark_skipped();
            }
            spec.settle_initial_state();
        }

        debug!(
            "Collected {} spec(s) with seed {} ({} runnable)",
            specs.len(),
            seed,
            specs.iter().filter(|s| s.is_runnable()).count()
        );

        Self {
            specs,
            programmatic_focus,
        }
    }

    pub fn specs(&self) -> &[Spec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Whether any node in the tree carried a focus flag
    pub fn has_programmatic_focus(&self) -> bool {
        self.programmatic_focus
    }

    /// Specs of shard `node` (1-based) out of `total`
    ///
    /// Positions are taken over the full ordered sequence, so the shards of
    /// one collection are disjoint and together cover every spec.
    pub fn shard(self, node: u32, total: u32) -> Vec<Spec> {
        let total = total.max(1) as usize;
        let index = (node.max(1) as usize - 1) % total;
        self.specs
            .into_iter()
            .enumerate()
            .filter(|(position, _)| position % total == index)
            .map(|(_, spec)| spec)
            .collect()
    }

    pub fn into_specs(self) -> Vec<Spec> {
        self.specs
    }
}

fn walk(
    tree: &SpecTree,
    id: NodeId,
    top_level: bool,
    randomize_all: bool,
    rng: &mut StdRng,
    out: &mut Vec<NodeId>,
) {
    let mut children: Vec<NodeId> = tree
        .children(id)
        .iter()
        .copied()
        .filter(|child| {
            let kind = tree.node(*child).kind();
            kind == NodeKind::Container || kind.is_subject()
        })
        .collect();

    if top_level || randomize_all {
        children.shuffle(rng);
    }

    for child in children {
        if tree.node(child).kind() == NodeKind::Container {
            walk(tree, child, false, randomize_all, rng, out);
        } else {
            out.push(child);
        }
    }
}
