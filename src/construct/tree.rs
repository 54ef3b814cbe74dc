use std::rc::Rc;

use serde_json::Value;

use crate::elements::types::ElementData;
use crate::errors::{Result, SynthError};
use crate::stack::StackData;

/// Index of a construct node inside its [`Tree`] arena.
///
/// Handles are cheap copies; all state lives in the arena owned by the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// The kind-specific payload a construct node carries.
pub enum ConstructKind {
    /// The app root; its path is empty.
    Root,
    /// A stack: collects elements, owns dependencies and cross-stack registries.
    Stack(StackData),
    /// A Terraform element contributing a JSON fragment.
    Element(ElementData),
    /// A plain logical grouping with no Terraform footprint of its own.
    Group,
}

/// A validation attached to a construct, run during the validate phase.
pub trait Validation {
    /// Return one message per problem; an empty vec means the construct is valid.
    fn validate(&self, tree: &Tree) -> Vec<String>;
}

/// A visitor registered on a construct and inherited by its subtree,
/// invoked during the prepare phase (ancestor aspects before local ones).
pub trait Aspect {
    fn visit(&self, tree: &mut Tree, node: NodeId);
}

pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) local_id: String,
    /// Cached join of ancestor ids with `/`; empty for the root.
    pub(crate) path: String,
    pub(crate) children: Vec<NodeId>,
    pub(crate) kind: ConstructKind,
    pub(crate) metadata: Vec<(String, Value)>,
    pub(crate) validations: Vec<Box<dyn Validation>>,
    pub(crate) aspects: Vec<Rc<dyn Aspect>>,
}

/// The construct tree: an append-only arena of named, parented nodes.
///
/// Nodes are created by attaching to a parent (atomically failing on sibling
/// id clashes) and are never moved or deleted before synthesis ends.
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Create a tree holding only the root node and return both.
    pub(crate) fn new() -> (Tree, NodeId) {
        let root = Node {
            parent: None,
            local_id: String::new(),
            path: String::new(),
            children: Vec::new(),
            kind: ConstructKind::Root,
            metadata: Vec::new(),
            validations: Vec::new(),
            aspects: Vec::new(),
        };
        (Tree { nodes: vec![root] }, NodeId(0))
    }

    /// Attach a new node under `parent`.
    ///
    /// Fails when the id is empty, contains the path separator, or is already
    /// taken by a sibling.
    pub fn attach(&mut self, parent: NodeId, local_id: &str, kind: ConstructKind) -> Result<NodeId> {
        if local_id.is_empty() {
            return Err(SynthError::InvalidId {
                path: self.path(parent).to_string(),
                id: local_id.to_string(),
                reason: "construct ids must not be empty".to_string(),
            });
        }
        if local_id.contains('/') {
            return Err(SynthError::InvalidId {
                path: self.path(parent).to_string(),
                id: local_id.to_string(),
                reason: "construct ids must not contain '/'".to_string(),
            });
        }
        let clash = self.nodes[parent.0]
            .children
            .iter()
            .any(|c| self.nodes[c.0].local_id == local_id);
        if clash {
            return Err(SynthError::DuplicateId {
                path: self.path(parent).to_string(),
                id: local_id.to_string(),
            });
        }

        let parent_path = self.path(parent);
        let path = if parent_path.is_empty() {
            local_id.to_string()
        } else {
            format!("{}/{}", parent_path, local_id)
        };

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            local_id: local_id.to_string(),
            path,
            children: Vec::new(),
            kind,
            metadata: Vec::new(),
            validations: Vec::new(),
            aspects: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn path(&self, node: NodeId) -> &str {
        &self.nodes[node.0].path
    }

    pub fn local_id(&self, node: NodeId) -> &str {
        &self.nodes[node.0].local_id
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub(crate) fn kind(&self, node: NodeId) -> &ConstructKind {
        &self.nodes[node.0].kind
    }

    pub(crate) fn kind_mut(&mut self, node: NodeId) -> &mut ConstructKind {
        &mut self.nodes[node.0].kind
    }

    /// Depth-first, self-first traversal; children in insertion order.
    pub fn find_all(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_depth_first(node, &mut out);
        out
    }

    fn collect_depth_first(&self, node: NodeId, out: &mut Vec<NodeId>) {
        out.push(node);
        for child in &self.nodes[node.0].children {
            self.collect_depth_first(*child, out);
        }
    }

    /// Ancestor chain from the root to `node`, inclusive.
    pub fn scopes(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = vec![node];
        let mut cur = node;
        while let Some(parent) = self.nodes[cur.0].parent {
            chain.push(parent);
            cur = parent;
        }
        chain.reverse();
        chain
    }

    /// The nearest enclosing stack, including `node` itself.
    pub fn containing_stack(&self, node: NodeId) -> Option<NodeId> {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if matches!(self.nodes[n.0].kind, ConstructKind::Stack(_)) {
                return Some(n);
            }
            cur = self.nodes[n.0].parent;
        }
        None
    }

    /// Path components of `node` below `ancestor` (exclusive), in order.
    pub fn components_below(&self, ancestor: NodeId, node: NodeId) -> Vec<String> {
        let mut comps = Vec::new();
        let mut cur = node;
        while cur != ancestor {
            comps.push(self.nodes[cur.0].local_id.clone());
            match self.nodes[cur.0].parent {
                Some(parent) => cur = parent,
                None => break,
            }
        }
        comps.reverse();
        comps
    }

    pub fn add_metadata(&mut self, node: NodeId, key: &str, value: Value) {
        self.nodes[node.0]
            .metadata
            .push((key.to_string(), value));
    }

    pub fn metadata(&self, node: NodeId) -> &[(String, Value)] {
        &self.nodes[node.0].metadata
    }

    pub fn add_validation(&mut self, node: NodeId, validation: Box<dyn Validation>) {
        self.nodes[node.0].validations.push(validation);
    }

    pub(crate) fn validations(&self, node: NodeId) -> &[Box<dyn Validation>] {
        &self.nodes[node.0].validations
    }

    pub fn add_aspect(&mut self, node: NodeId, aspect: Rc<dyn Aspect>) {
        self.nodes[node.0].aspects.push(aspect);
    }

    /// Aspects applying to `node`: inherited from ancestors first, own last.
    pub(crate) fn applicable_aspects(&self, node: NodeId) -> Vec<Rc<dyn Aspect>> {
        self.scopes(node)
            .iter()
            .flat_map(|scope| self.nodes[scope.0].aspects.iter().cloned())
            .collect()
    }
}
