//! One concrete executable path through the spec tree

use spectree_common::{
    CodeLocation, NodeFlag, NodeKind, SpecFailure, SpecMeasurement, SpecState, SpecSummary,
};
use std::time::Duration;

use crate::node::{NodeId, SpecTree};

/// A subject leaf with its setup and teardown chains
#[derive(Debug, Clone)]
pub struct Spec {
    subject: NodeId,
    setup_chain: Vec<NodeId>,
    teardown_chain: Vec<NodeId>,
    container_texts: Vec<String>,
    text: String,
    location: CodeLocation,
    pending: bool,
    focused: bool,
    skipped: bool,

    pub(crate) state: SpecState,
    pub(crate) failure: Option<SpecFailure>,
    pub(crate) run_time: Duration,
    pub(crate) captured_output: String,
    pub(crate) attempts: u32,
    pub(crate) measurement: Option<SpecMeasurement>,
}

impl Spec {
    /// Build the spec ending at `subject`
    ///
    /// The setup chain holds every BeforeEach from the outermost container
    /// inwards, then every JustBeforeEach in the same order. The teardown chain
    /// mirrors it: JustAfterEach innermost-first, then AfterEach innermost-first.
    pub fn new(tree: &SpecTree, subject: NodeId) -> Self {
        let path = tree.path(subject);
        let subject_node = tree.node(subject);

        // Containers whose setup nodes apply, root included
        let mut scopes = vec![tree.root()];
        scopes.extend(path.iter().copied().filter(|id| *id != subject));

        let of_kind = |kind: NodeKind| -> Vec<NodeId> {
            scopes
                .iter()
                .flat_map(|scope| tree.children(*scope).iter().copied())
                .filter(|id| tree.node(*id).kind() == kind)
                .collect()
        };

        let mut setup_chain = of_kind(NodeKind::BeforeEach);
        setup_chain.extend(of_kind(NodeKind::JustBeforeEach));

        let mut just_after = of_kind(NodeKind::JustAfterEach);
        just_after.reverse();
        let mut after = of_kind(NodeKind::AfterEach);
        after.reverse();
        let mut teardown_chain = just_after;
        teardown_chain.extend(after);

        let container_texts = path
            .iter()
            .filter(|id| **id != subject)
            .map(|id| tree.node(*id).text().to_string())
            .collect();

        let flags: Vec<NodeFlag> = path.iter().map(|id| tree.node(*id).flag()).collect();

        Self {
            subject,
            setup_chain,
            teardown_chain,
            container_texts,
            text: subject_node.text().to_string(),
            location: subject_node.location().clone(),
            pending: flags.contains(&NodeFlag::Pending),
            focused: flags.contains(&NodeFlag::Focused),
            skipped: false,
            state: SpecState::NotRun,
            failure: None,
            run_time: Duration::ZERO,
            captured_output: String::new(),
            attempts: 0,
            measurement: None,
        }
    }

    pub fn subject(&self) -> NodeId {
        self.subject
    }

    pub fn setup_chain(&self) -> &[NodeId] {
        &self.setup_chain
    }

    pub fn teardown_chain(&self) -> &[NodeId] {
        &self.teardown_chain
    }

    pub fn container_texts(&self) -> &[String] {
        &self.container_texts
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn location(&self) -> &CodeLocation {
        &self.location
    }

    /// Container texts and subject text joined by spaces
    pub fn description(&self) -> String {
        let mut parts: Vec<&str> = self
            .container_texts
            .iter()
            .map(String::as_str)
            .filter(|t| !t.is_empty())
            .collect();
        if !self.text.is_empty() {
            parts.push(&self.text);
        }
        parts.join(" ")
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Mark skipped by a filter; only valid before the collection is final
    pub(crate) fn mark_skipped(&mut self) {
        self.skipped = true;
        if !self.pending {
            self.state = SpecState::Skipped;
        }
    }

    /// Pending specs never run, whatever the filters say
    pub(crate) fn settle_initial_state(&mut self) {
        self.state = if self.pending {
            SpecState::Pending
        } else if self.skipped {
            SpecState::Skipped
        } else {
            SpecState::NotRun
        };
    }

    /// Skip a spec that has not run yet
    pub(crate) fn halt(&mut self) {
        if self.state == SpecState::NotRun {
            self.state = SpecState::Skipped;
        }
    }

    pub fn state(&self) -> SpecState {
        self.state
    }

    pub fn failure(&self) -> Option<&SpecFailure> {
        self.failure.as_ref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn run_time(&self) -> Duration {
        self.run_time
    }

    pub fn captured_output(&self) -> &str {
        &self.captured_output
    }

    pub fn measurement(&self) -> Option<&SpecMeasurement> {
        self.measurement.as_ref()
    }

    /// Should the runner execute this spec?
    pub fn is_runnable(&self) -> bool {
        self.state == SpecState::NotRun
    }

    pub fn summary(&self) -> SpecSummary {
        SpecSummary {
            description: self.description(),
            container_texts: self.container_texts.clone(),
            text: self.text.clone(),
            location: self.location.clone(),
            state: self.state,
            failure: self.failure.clone(),
            run_time: self.run_time,
            captured_output: self.captured_output.clone(),
            attempts: self.attempts,
            measurement: self.measurement.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SpecContext;
    use crate::failure::StepResult;
    use crate::node::TreeBuilder;

    fn ok(_: &SpecContext) -> StepResult {
        Ok(())
    }

    fn spec_for(tree: &SpecTree, text: &str) -> Spec {
        let mut stack = vec![tree.root()];
        while let Some(id) = stack.pop() {
            let node = tree.node(id);
            if node.kind().is_subject() && node.text() == text {
                return Spec::new(tree, id);
            }
            stack.extend(node.children().iter().copied());
        }
        panic!("no subject {:?}", text);
    }

    #[test]
    fn test_chains_are_ordered_by_kind_then_depth() {
        let tree = TreeBuilder::build(|t| {
            t.before_each(ok);
            t.just_after_each(ok);
            t.describe("outer", |t| {
                t.just_before_each(ok);
                t.after_each(ok);
                t.before_each(ok);
                t.describe("inner", |t| {
                    t.before_each(ok);
                    t.just_before_each(ok);
                    t.after_each(ok);
                    t.just_after_each(ok);
                    t.it("leaf", ok);
                });
            });
        })
        .unwrap();

        let spec = spec_for(&tree, "leaf");
        let setup: Vec<(NodeKind, u32)> = spec
            .setup_chain()
            .iter()
            .map(|id| (tree.node(*id).kind(), tree.node(*id).location().line))
            .collect();
        let kinds: Vec<NodeKind> = setup.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::BeforeEach,
                NodeKind::BeforeEach,
                NodeKind::BeforeEach,
                NodeKind::JustBeforeEach,
                NodeKind::JustBeforeEach
            ]
        );
        // outermost first
        assert!(setup[0].1 < setup[1].1 && setup[1].1 < setup[2].1);
        assert!(setup[3].1 < setup[4].1);

        let teardown: Vec<(NodeKind, u32)> = spec
            .teardown_chain()
            .iter()
            .map(|id| (tree.node(*id).kind(), tree.node(*id).location().line))
            .collect();
        let kinds: Vec<NodeKind> = teardown.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::JustAfterEach,
                NodeKind::JustAfterEach,
                NodeKind::AfterEach,
                NodeKind::AfterEach
            ]
        );
        // innermost first
        assert!(teardown[0].1 > teardown[1].1);
        assert!(teardown[2].1 > teardown[3].1);
    }

    #[test]
    fn test_description_and_flags() {
        let tree = TreeBuilder::build(|t| {
            t.pending_describe("books", |t| {
                t.context("when long", |t| {
                    t.focus_it("is a novel", ok);
                });
            });
        })
        .unwrap();

        let spec = spec_for(&tree, "is a novel");
        assert_eq!(spec.description(), "books when long is a novel");
        assert_eq!(spec.container_texts(), &["books".to_string(), "when long".to_string()]);
        assert!(spec.is_pending());
        assert!(spec.is_focused());
    }

    #[test]
    fn test_pending_overrides_skip() {
        let tree = TreeBuilder::build(|t| t.pending_it("later", ok)).unwrap();
        let mut spec = spec_for(&tree, "later");
        spec.mark_skipped();
        spec.settle_initial_state();
        assert_eq!(spec.state(), SpecState::Pending);
        assert!(!spec.is_runnable());
    }
}
