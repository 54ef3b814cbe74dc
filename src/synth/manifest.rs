use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::construct::tree::{NodeId, Tree};
use crate::stack::stack_data;

/// The `manifest.json` document describing every synthesized stack.
#[derive(Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub stacks: Map<String, Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackManifest {
    pub name: String,
    pub construct_path: String,
    pub synthesized_stack_path: String,
    pub working_directory: String,
    pub annotations: Vec<StackAnnotation>,
    pub dependencies: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackAnnotation {
    pub construct_path: String,
    pub level: String,
    pub message: String,
}

/// Build the manifest over the stacks in construct-insertion order.
pub(crate) fn build_manifest(tree: &Tree, stacks: &[NodeId]) -> Manifest {
    let mut entries = Map::new();
    for stack in stacks {
        let data = stack_data(tree, *stack);
        let dependencies = data
            .dependencies
            .iter()
            .map(|dep| stack_data(tree, *dep).name.clone())
            .collect();
        let entry = StackManifest {
            name: data.name.clone(),
            construct_path: tree.path(*stack).to_string(),
            synthesized_stack_path: format!("stacks/{}/cdk.tf.json", data.name),
            working_directory: format!("stacks/{}", data.name),
            annotations: stack_annotations(tree, *stack),
            dependencies,
        };
        entries.insert(
            data.name.clone(),
            serde_json::to_value(entry).unwrap_or(Value::Null),
        );
    }
    Manifest {
        version: env!("CARGO_PKG_VERSION").to_string(),
        stacks: entries,
    }
}

/// Annotations are construct metadata at the info/warning/error levels,
/// gathered over the stack's subtree.
fn stack_annotations(tree: &Tree, stack: NodeId) -> Vec<StackAnnotation> {
    let mut annotations = Vec::new();
    for node in tree.find_all(stack) {
        for (key, value) in tree.metadata(node) {
            if !matches!(key.as_str(), "info" | "warning" | "error") {
                continue;
            }
            let message = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            annotations.push(StackAnnotation {
                construct_path: tree.path(node).to_string(),
                level: key.clone(),
                message,
            });
        }
    }
    annotations
}
