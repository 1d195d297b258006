//! Spec tree: node arena and the declaration-time builder
//!
//! The tree is built in one depth-first declaration pass. Declaring a
//! container runs its closure immediately with the builder positioned inside
//! the new container, so nesting is discovered by running the declarations to
//! completion. Leaf and setup/teardown bodies are stored for the execution
//! phase. Once [`TreeBuilder::build`] returns, the tree is immutable.

use spectree_common::{CodeLocation, NodeFlag, NodeKind};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

use crate::context::SpecContext;
use crate::error::DeclarationError;
use crate::failure::StepResult;
use crate::panics::panic_message;

/// Deferred action of a leaf or setup/teardown node
pub type Body = Arc<dyn Fn(&SpecContext) -> StepResult + Send + Sync>;

/// Stable index of a node in its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// A single described behavior unit
pub struct Node {
    kind: NodeKind,
    text: String,
    location: CodeLocation,
    flag: NodeFlag,
    body: Option<Body>,
    samples: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn location(&self) -> &CodeLocation {
        &self.location
    }

    pub fn flag(&self) -> NodeFlag {
        self.flag
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Repeat count; greater than 1 only for measure leaves
    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("text", &self.text)
            .field("location", &self.location)
            .field("flag", &self.flag)
            .field("samples", &self.samples)
            .field("children", &self.children)
            .finish()
    }
}

/// The immutable result of a declaration pass
#[derive(Debug)]
pub struct SpecTree {
    nodes: Vec<Node>,
}

impl SpecTree {
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Ancestors of `id` (root excluded) followed by `id`, outermost-first
    pub fn path(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == NodeId::ROOT {
                break;
            }
            path.push(current);
            cursor = self.nodes[current.0].parent;
        }
        path.reverse();
        path
    }

    /// The top-level BeforeSuite or AfterSuite node
    pub fn suite_node(&self, kind: NodeKind) -> Option<NodeId> {
        self.children(NodeId::ROOT)
            .iter()
            .copied()
            .find(|id| self.node(*id).kind == kind)
    }

    /// Number of subject leaves
    pub fn subject_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind.is_subject()).count()
    }
}

/// Declaration-phase builder
pub struct TreeBuilder {
    nodes: Vec<Node>,
    current: NodeId,
    error: Option<DeclarationError>,
}

impl TreeBuilder {
    /// Run the declaration pass and return the finished tree
    ///
    /// A panic inside any declaration closure, or an invalid declaration, is a
    /// [`DeclarationError`]; the first one wins.
    pub fn build<F>(declare: F) -> Result<SpecTree, DeclarationError>
    where
        F: FnOnce(&mut TreeBuilder),
    {
        let mut builder = TreeBuilder {
            nodes: vec![Node {
                kind: NodeKind::Container,
                text: String::new(),
                location: CodeLocation::new("", 0, 0),
                flag: NodeFlag::None,
                body: None,
                samples: 1,
                parent: None,
                children: Vec::new(),
            }],
            current: NodeId::ROOT,
            error: None,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| declare(&mut builder)));
        if let Err(payload) = outcome {
            let location = match builder.current {
                NodeId::ROOT => None,
                id => Some(builder.nodes[id.0].location.clone()),
            };
            return Err(DeclarationError {
                message: format!("panic during declaration: {}", panic_message(payload.as_ref())),
                location,
            });
        }

        if let Some(error) = builder.error {
            return Err(error);
        }

        debug!("Declared spec tree with {} node(s)", builder.nodes.len());
        Ok(SpecTree {
            nodes: builder.nodes,
        })
    }

    fn push(
        &mut self,
        kind: NodeKind,
        text: String,
        location: CodeLocation,
        flag: NodeFlag,
        body: Option<Body>,
        samples: u32,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            text,
            location,
            flag,
            body,
            samples,
            parent: Some(self.current),
            children: Vec::new(),
        });
        self.nodes[self.current.0].children.push(id);
        id
    }

    fn reject(&mut self, message: impl Into<String>, location: CodeLocation) {
        if self.error.is_none() {
            self.error = Some(DeclarationError {
                message: message.into(),
                location: Some(location),
            });
        }
    }

    fn container<F>(&mut self, text: String, flag: NodeFlag, location: CodeLocation, declare: F)
    where
        F: FnOnce(&mut TreeBuilder),
    {
        let id = self.push(NodeKind::Container, text, location, flag, None, 1);
        let parent = self.current;
        self.current = id;
        declare(self);
        self.current = parent;
    }

    fn leaf<F>(&mut self, kind: NodeKind, text: String, flag: NodeFlag, samples: u32, location: CodeLocation, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        if samples == 0 {
            self.reject(format!("{} {:?} needs at least one sample", kind, text), location.clone());
        }
        self.push(kind, text, location, flag, Some(Arc::new(body)), samples.max(1));
    }

    fn setup<F>(&mut self, kind: NodeKind, location: CodeLocation, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        self.push(kind, String::new(), location, NodeFlag::None, Some(Arc::new(body)), 1);
    }

    fn suite_level<F>(&mut self, kind: NodeKind, location: CodeLocation, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        if self.current != NodeId::ROOT {
            self.reject(format!("{} must be declared at the top level", kind), location);
            return;
        }
        let exists = self.nodes[0]
            .children
            .iter()
            .any(|id| self.nodes[id.0].kind == kind);
        if exists {
            self.reject(format!("only one {} may be declared", kind), location);
            return;
        }
        self.push(kind, String::new(), location, NodeFlag::None, Some(Arc::new(body)), 1);
    }

    /// Group nested nodes under a label
    #[track_caller]
    pub fn describe<F>(&mut self, text: impl Into<String>, declare: F)
    where
        F: FnOnce(&mut TreeBuilder),
    {
        self.container(text.into(), NodeFlag::None, CodeLocation::caller(), declare);
    }

    /// Alias of [`describe`](Self::describe)
    #[track_caller]
    pub fn context<F>(&mut self, text: impl Into<String>, declare: F)
    where
        F: FnOnce(&mut TreeBuilder),
    {
        self.container(text.into(), NodeFlag::None, CodeLocation::caller(), declare);
    }

    /// Container whose specs are focused
    #[track_caller]
    pub fn focus_describe<F>(&mut self, text: impl Into<String>, declare: F)
    where
        F: FnOnce(&mut TreeBuilder),
    {
        self.container(text.into(), NodeFlag::Focused, CodeLocation::caller(), declare);
    }

    /// Container whose specs are recorded as pending and never run
    #[track_caller]
    pub fn pending_describe<F>(&mut self, text: impl Into<String>, declare: F)
    where
        F: FnOnce(&mut TreeBuilder),
    {
        self.container(text.into(), NodeFlag::Pending, CodeLocation::caller(), declare);
    }

    /// Subject leaf
    #[track_caller]
    pub fn it<F>(&mut self, text: impl Into<String>, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        self.leaf(NodeKind::It, text.into(), NodeFlag::None, 1, CodeLocation::caller(), body);
    }

    #[track_caller]
    pub fn focus_it<F>(&mut self, text: impl Into<String>, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        self.leaf(NodeKind::It, text.into(), NodeFlag::Focused, 1, CodeLocation::caller(), body);
    }

    #[track_caller]
    pub fn pending_it<F>(&mut self, text: impl Into<String>, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        self.leaf(NodeKind::It, text.into(), NodeFlag::Pending, 1, CodeLocation::caller(), body);
    }

    /// Sampled subject leaf; the body runs `samples` times and each run is timed
    #[track_caller]
    pub fn measure<F>(&mut self, text: impl Into<String>, samples: u32, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        self.leaf(NodeKind::Measure, text.into(), NodeFlag::None, samples, CodeLocation::caller(), body);
    }

    #[track_caller]
    pub fn before_each<F>(&mut self, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        self.setup(NodeKind::BeforeEach, CodeLocation::caller(), body);
    }

    #[track_caller]
    pub fn just_before_each<F>(&mut self, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        self.setup(NodeKind::JustBeforeEach, CodeLocation::caller(), body);
    }

    #[track_caller]
    pub fn after_each<F>(&mut self, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        self.setup(NodeKind::AfterEach, CodeLocation::caller(), body);
    }

    #[track_caller]
    pub fn just_after_each<F>(&mut self, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        self.setup(NodeKind::JustAfterEach, CodeLocation::caller(), body);
    }

    /// Runs once per worker before any spec
    #[track_caller]
    pub fn before_suite<F>(&mut self, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        self.suite_level(NodeKind::BeforeSuite, CodeLocation::caller(), body);
    }

    /// Runs once per worker after every spec
    #[track_caller]
    pub fn after_suite<F>(&mut self, body: F)
    where
        F: Fn(&SpecContext) -> StepResult + Send + Sync + 'static,
    {
        self.suite_level(NodeKind::AfterSuite, CodeLocation::caller(), body);
    }
}
