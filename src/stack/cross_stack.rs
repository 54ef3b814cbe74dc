use std::collections::HashSet;

use serde_json::json;

use crate::construct::tree::{ConstructKind, NodeId, Tree};
use crate::elements::fragment::element_fragment;
use crate::elements::types::{ElementData, ElementKind, OutputDef, ResourceDef};
use crate::elements::{element_fqn, friendly_unique_id};
use crate::errors::{Result, SynthError};
use crate::stack::{add_stack_dependency, ensure_backend_exists, stack_data, stack_data_mut};
use crate::tokens::table::{collect_token_ids, Token, TokenTable};

/// Rewrite a reference that crosses from `consumer_stack` into the stack
/// owning `source_element`.
///
/// The source stack gains a sensitive output exporting the referenced value,
/// the consumer gains a `terraform_remote_state` data source reading the
/// source's backend, the consumer is recorded as depending on the source, and
/// the reference text becomes a read through the remote state's outputs.
///
/// Idempotent: the output registry is keyed by `fqn[.attribute]` and the
/// remote-state registry by source stack path, so repeated references reuse
/// the same pair.
pub(crate) fn rewrite_foreign_ref(
    tree: &mut Tree,
    source_element: NodeId,
    attribute: Option<&str>,
    consumer_stack: NodeId,
) -> Result<String> {
    let source_stack = match tree.containing_stack(source_element) {
        Some(stack) => stack,
        None => unreachable!("foreign reference targets live under a stack"),
    };

    let fqn = element_fqn(tree, source_element);
    let ref_expr = match attribute {
        Some(attr) => format!("{}.{}", fqn, attr),
        None => fqn,
    };

    let output_node = match stack_data(tree, source_stack)
        .cross_stack_outputs
        .get(&ref_expr)
        .copied()
    {
        Some(node) => node,
        None => {
            let id = format!("cross-stack-output-{}", ref_expr);
            let node = tree.attach(
                source_stack,
                &id,
                ConstructKind::Element(ElementData::new(ElementKind::Output(OutputDef {
                    value: json!(format!("${{{}}}", ref_expr)),
                    description: None,
                    sensitive: true,
                    depends_on: Vec::new(),
                }))),
            )?;
            tracing::debug!(
                source = tree.path(source_stack),
                reference = %ref_expr,
                "exporting cross-stack output"
            );
            stack_data_mut(tree, source_stack)
                .cross_stack_outputs
                .insert(ref_expr.clone(), node);
            node
        }
    };
    let output_name = friendly_unique_id(tree, output_node);

    let source_path = tree.path(source_stack).to_string();
    let remote_state_node = match stack_data(tree, consumer_stack)
        .remote_states
        .get(&source_path)
        .copied()
    {
        Some(node) => node,
        None => {
            let backend_node = ensure_backend_exists(tree, source_stack)?;
            let source_name = stack_data(tree, source_stack).name.clone();
            let attributes = match tree.kind(backend_node) {
                ConstructKind::Element(ElementData {
                    kind: ElementKind::Backend(config),
                    ..
                }) => config.remote_state_attributes(&source_name).map_err(|()| {
                    SynthError::UnsupportedCrossStack {
                        stack: source_path.clone(),
                    }
                })?,
                _ => unreachable!("backend node holds a backend element"),
            };

            let id = format!("cross-stack-reference-{}", source_path.replace('/', "-"));
            let node = tree.attach(
                consumer_stack,
                &id,
                ConstructKind::Element(ElementData::new(ElementKind::DataSource(ResourceDef {
                    resource_type: "terraform_remote_state".to_string(),
                    attributes,
                    ..Default::default()
                }))),
            )?;
            tracing::debug!(
                consumer = tree.path(consumer_stack),
                source = %source_path,
                "importing remote state for cross-stack reference"
            );
            stack_data_mut(tree, consumer_stack)
                .remote_states
                .insert(source_path.clone(), node);
            node
        }
    };

    add_stack_dependency(tree, consumer_stack, source_stack)?;

    let remote_state_id = friendly_unique_id(tree, remote_state_node);
    Ok(format!(
        "${{data.terraform_remote_state.{}.outputs.{}}}",
        remote_state_id, output_name
    ))
}

/// Scan a stack's element fragments for references into other stacks and run
/// the rewrite for each, so outputs, remote states, and dependency edges all
/// exist before stacks are ordered and written.
pub(crate) fn prescan_stack(tree: &mut Tree, tokens: &TokenTable, stack: NodeId) -> Result<()> {
    let elements: Vec<NodeId> = tree
        .find_all(stack)
        .into_iter()
        .filter(|node| *node != stack)
        .filter(|node| matches!(tree.kind(*node), ConstructKind::Element(_)))
        .collect();

    let mut ids = Vec::new();
    for node in elements {
        let fragment = element_fragment(tree, node);
        collect_token_ids(&fragment, &mut ids);
    }

    let mut seen = HashSet::new();
    while let Some(id) = ids.pop() {
        if !seen.insert(id) {
            continue;
        }
        match tokens.get(id) {
            Some(Token::Ref { target, attribute }) => {
                let foreign = tree
                    .containing_stack(*target)
                    .map(|source| source != stack)
                    .unwrap_or(false);
                if foreign {
                    let attribute = attribute.clone();
                    rewrite_foreign_ref(tree, *target, attribute.as_deref(), stack)?;
                }
            }
            Some(Token::Fn { args, .. }) => {
                for arg in args {
                    collect_token_ids(arg, &mut ids);
                }
            }
            // Lazy producers run during resolution; Raw carries no references.
            _ => {}
        }
    }
    Ok(())
}
