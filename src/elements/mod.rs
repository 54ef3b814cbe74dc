pub mod backend;
pub mod fragment;
pub mod handles;
pub mod types;

use crate::construct::logical_id::allocate_logical_id;
use crate::construct::tree::{ConstructKind, NodeId, Tree};
use crate::elements::types::ElementKind;

/// The element's friendly unique id: the logical id of its path below the
/// containing stack.
pub fn friendly_unique_id(tree: &Tree, node: NodeId) -> String {
    let stack = match tree.containing_stack(node) {
        Some(stack) if stack != node => stack,
        _ => return allocate_logical_id(&tree.components_below(node, node)),
    };
    allocate_logical_id(&tree.components_below(stack, node))
}

/// The fully-qualified name an element is referenced by in expressions.
pub fn element_fqn(tree: &Tree, node: NodeId) -> String {
    let logical_id = friendly_unique_id(tree, node);
    let kind = match tree.kind(node) {
        ConstructKind::Element(data) => &data.kind,
        _ => return logical_id,
    };
    match kind {
        ElementKind::Resource(def) => format!("{}.{}", def.resource_type, logical_id),
        ElementKind::DataSource(def) => format!("data.{}.{}", def.resource_type, logical_id),
        ElementKind::Module(_) => format!("module.{}", logical_id),
        ElementKind::Variable(_) => format!("var.{}", logical_id),
        ElementKind::Local(_) => format!("local.{}", logical_id),
        ElementKind::Provider(def) => match &def.alias {
            Some(alias) => format!("{}.{}", def.provider_type, alias),
            None => def.provider_type.clone(),
        },
        ElementKind::Output(_) | ElementKind::Backend(_) => logical_id,
    }
}
