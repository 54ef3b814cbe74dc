use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use std::collections::HashMap;

use crate::construct::tree::{ConstructKind, NodeId, Tree};
use crate::elements::types::ElementKind;
use crate::stack::stack_data;

/// Run every construct-local validation plus the structural checks, returning
/// all messages at once so users see every problem in a single failure.
pub(crate) fn collect_messages(tree: &Tree, root: NodeId, stacks: &[NodeId]) -> Vec<String> {
    let mut messages = Vec::new();

    for node in tree.find_all(root) {
        for validation in tree.validations(node) {
            messages.extend(validation.validate(tree));
        }
        structural_messages(tree, node, &mut messages);
    }

    if stack_graph_is_cyclic(tree, stacks) {
        messages.push("stack dependency graph contains a cycle".to_string());
    }

    messages
}

fn structural_messages(tree: &Tree, node: NodeId, messages: &mut Vec<String>) {
    let data = match tree.kind(node) {
        ConstructKind::Element(data) => data,
        _ => return,
    };
    let path = tree.path(node);

    match &data.kind {
        ElementKind::Resource(def) | ElementKind::DataSource(def) => {
            if def.resource_type.is_empty() {
                messages.push(format!(
                    "{} '{}' has an empty terraform resource type",
                    data.kind.kind_name(),
                    path
                ));
            }
            if def.count.is_some() && def.for_each.is_some() {
                messages.push(format!(
                    "{} '{}' sets both 'count' and 'for_each'; they are mutually exclusive",
                    data.kind.kind_name(),
                    path
                ));
            }
        }
        ElementKind::Provider(def) => {
            if def.source.is_empty() {
                messages.push(format!("provider '{}' has an empty source", path));
            }
        }
        ElementKind::Module(def) => {
            if def.source.is_empty() {
                messages.push(format!("module '{}' has an empty source", path));
            }
        }
        ElementKind::Output(def) => {
            if def.value.is_null() {
                messages.push(format!("output '{}' has no value", path));
            }
        }
        ElementKind::Backend(_) | ElementKind::Variable(_) | ElementKind::Local(_) => {}
    }
}

/// Backstop over the explicit-edge guard in `add_dependency`: the rewriter
/// also adds edges, so the assembled graph is checked as a whole.
fn stack_graph_is_cyclic(tree: &Tree, stacks: &[NodeId]) -> bool {
    let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
    let mut indices = HashMap::new();
    for stack in stacks {
        indices.insert(*stack, graph.add_node(*stack));
    }
    for stack in stacks {
        for dep in &stack_data(tree, *stack).dependencies {
            if let (Some(&from), Some(&to)) = (indices.get(dep), indices.get(stack)) {
                graph.add_edge(from, to, ());
            }
        }
    }
    is_cyclic_directed(&graph)
}
