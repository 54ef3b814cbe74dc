pub mod cross_stack;

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use crate::construct::tree::{ConstructKind, NodeId, Tree, Validation};
use crate::elements::backend::{BackendConfig, LocalBackendProps};
use crate::elements::fragment::{element_fragment, element_metadata};
use crate::elements::types::{ElementData, ElementKind};
use crate::errors::{Result, SynthError};
use crate::synth::app::App;
use crate::synth::merge::deep_merge;
use crate::tokens::resolver::Resolver;
use crate::tokens::table::TokenTable;

/// Forward-only lifecycle of a stack within one synthesis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    Constructed,
    Prepared,
    Validated,
    Written,
}

/// Payload of a stack node.
pub struct StackData {
    pub name: String,
    pub phase: StackPhase,
    /// Explicit dependency stacks, in registration order.
    pub dependencies: Vec<NodeId>,
    /// Outgoing cross-stack exports, keyed by `fqn[.attribute]`.
    pub cross_stack_outputs: HashMap<String, NodeId>,
    /// Incoming imports, keyed by source stack path; every reference to the
    /// same source stack shares one remote-state data source.
    pub remote_states: HashMap<String, NodeId>,
}

impl StackData {
    fn new(name: &str) -> StackData {
        StackData {
            name: name.to_string(),
            phase: StackPhase::Constructed,
            dependencies: Vec::new(),
            cross_stack_outputs: HashMap::new(),
            remote_states: HashMap::new(),
        }
    }
}

/// A stack: the unit of synthesis, producing one `cdk.tf.json`.
#[derive(Debug, Clone, Copy)]
pub struct TerraformStack {
    node: NodeId,
}

impl TerraformStack {
    /// Create a stack under the app root and register its provider-presence
    /// validation.
    pub fn new(app: &mut App, name: &str) -> Result<TerraformStack> {
        let root = app.root();
        let node = app.tree_mut().attach(
            root,
            name,
            ConstructKind::Stack(StackData::new(name)),
        )?;
        app.tree_mut()
            .add_validation(node, Box::new(ProviderPresence { stack: node }));
        Ok(TerraformStack { node })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Declare that this stack must be deployed after `other`.
    pub fn add_dependency(&self, app: &mut App, other: &TerraformStack) -> Result<()> {
        add_stack_dependency(app.tree_mut(), self.node, other.node)
    }
}

impl From<TerraformStack> for NodeId {
    fn from(stack: TerraformStack) -> NodeId {
        stack.node
    }
}

pub(crate) fn stack_data(tree: &Tree, stack: NodeId) -> &StackData {
    match tree.kind(stack) {
        ConstructKind::Stack(data) => data,
        _ => unreachable!("node is a stack"),
    }
}

pub(crate) fn stack_data_mut(tree: &mut Tree, stack: NodeId) -> &mut StackData {
    match tree.kind_mut(stack) {
        ConstructKind::Stack(data) => data,
        _ => unreachable!("node is a stack"),
    }
}

/// Record `from` → `on` in the dependency list, refusing edges that would
/// close a cycle. Idempotent.
pub(crate) fn add_stack_dependency(tree: &mut Tree, from: NodeId, on: NodeId) -> Result<()> {
    if stack_data(tree, from).dependencies.contains(&on) {
        return Ok(());
    }
    if from == on || depends_transitively(tree, on, from) {
        return Err(SynthError::CircularDependency {
            from: stack_data(tree, from).name.clone(),
            to: stack_data(tree, on).name.clone(),
        });
    }
    stack_data_mut(tree, from).dependencies.push(on);
    Ok(())
}

fn depends_transitively(tree: &Tree, from: NodeId, on: NodeId) -> bool {
    let mut pending = vec![from];
    let mut visited = HashSet::new();
    while let Some(stack) = pending.pop() {
        if stack == on {
            return true;
        }
        if visited.insert(stack) {
            pending.extend(stack_data(tree, stack).dependencies.iter().copied());
        }
    }
    false
}

/// Locate the stack's single backend element, inserting a default `local`
/// backend when none exists.
pub(crate) fn ensure_backend_exists(tree: &mut Tree, stack: NodeId) -> Result<NodeId> {
    if let Some(backend) = find_backend(tree, stack) {
        return Ok(backend);
    }
    tracing::debug!(stack = tree.path(stack), "inserting default local backend");
    tree.attach(
        stack,
        "backend",
        ConstructKind::Element(ElementData::new(ElementKind::Backend(BackendConfig::Local(
            LocalBackendProps::default(),
        )))),
    )
}

pub(crate) fn find_backend(tree: &Tree, stack: NodeId) -> Option<NodeId> {
    tree.find_all(stack)
        .into_iter()
        .find(|node| {
            matches!(
                tree.kind(*node),
                ConstructKind::Element(ElementData {
                    kind: ElementKind::Backend(_),
                    ..
                })
            )
        })
}

fn element_nodes(tree: &Tree, stack: NodeId) -> Vec<NodeId> {
    tree.find_all(stack)
        .into_iter()
        .filter(|node| *node != stack)
        .filter(|node| matches!(tree.kind(*node), ConstructKind::Element(_)))
        .collect()
}

/// Produce the stack's Terraform JSON document.
///
/// Fragments merge in depth-first insertion order over a snapshot of the
/// element list; elements the rewriter tail-appends during resolution are
/// picked up in follow-up passes until the list is quiescent.
pub(crate) fn stack_to_terraform(
    tree: &mut Tree,
    tokens: &TokenTable,
    stack: NodeId,
) -> Result<Value> {
    let name = stack_data(tree, stack).name.clone();
    let backend_type = find_backend(tree, stack)
        .map(|node| match tree.kind(node) {
            ConstructKind::Element(ElementData {
                kind: ElementKind::Backend(config),
                ..
            }) => config.backend_type(),
            _ => "local",
        })
        .unwrap_or("local");

    let mut doc = json!({
        "//": {
            "metadata": {
                "version": env!("CARGO_PKG_VERSION"),
                "stackName": name,
                "backend": backend_type,
            }
        }
    });

    let mut processed: HashSet<NodeId> = HashSet::new();
    loop {
        let pending: Vec<NodeId> = element_nodes(tree, stack)
            .into_iter()
            .filter(|node| !processed.contains(node))
            .collect();
        if pending.is_empty() {
            break;
        }

        let mut batch = Value::Object(serde_json::Map::new());
        for node in &pending {
            batch = deep_merge(batch, element_fragment(tree, *node));
            batch = deep_merge(batch, element_metadata(tree, *node));
            processed.insert(*node);
        }

        let mut resolver = Resolver::new(tree, tokens, stack);
        let resolved = resolver.resolve(&batch)?;
        doc = deep_merge(doc, resolved);
    }

    Ok(doc)
}

/// Every stack must configure at least one provider to be executable.
struct ProviderPresence {
    stack: NodeId,
}

impl Validation for ProviderPresence {
    fn validate(&self, tree: &Tree) -> Vec<String> {
        let has_provider = tree.find_all(self.stack).into_iter().any(|node| {
            matches!(
                tree.kind(node),
                ConstructKind::Element(ElementData {
                    kind: ElementKind::Provider(_),
                    ..
                })
            )
        });
        if has_provider {
            Vec::new()
        } else {
            vec![format!(
                "found no provider in stack '{}'; add at least one provider to synthesize it",
                tree.path(self.stack)
            )]
        }
    }
}
