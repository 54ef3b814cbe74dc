use serde_json::{json, Map, Value};

use tfsynth::construct::Construct;
use tfsynth::elements::backend::LocalBackendProps;
use tfsynth::elements::handles::{
    LocalBackend, TerraformOutput, TerraformProvider, TerraformResource, TerraformVariable,
};
use tfsynth::elements::types::{OutputDef, ProviderDef, ResourceDef, VariableDef};
use tfsynth::stack::TerraformStack;
use tfsynth::synth::app::App;
use tfsynth::tokens::fn_token;

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn attributes(value: Value) -> Map<String, Value> {
    value.as_object().expect("object literal").clone()
}

fn null_provider(app: &mut App, stack: TerraformStack) {
    TerraformProvider::new(
        app,
        stack,
        "null",
        ProviderDef {
            provider_type: "null".to_string(),
            source: "hashicorp/null".to_string(),
            ..Default::default()
        },
    )
    .expect("provider attaches");
}

fn read_stack_json(outdir: &std::path::Path, stack_name: &str) -> Value {
    let path = outdir.join("stacks").join(stack_name).join("cdk.tf.json");
    let content = std::fs::read_to_string(&path).expect("stack json exists");
    assert!(
        !content.contains("${TfToken["),
        "no token handle may survive synthesis"
    );
    serde_json::from_str(&content).expect("stack json parses")
}

fn read_manifest(outdir: &std::path::Path) -> Value {
    let content =
        std::fs::read_to_string(outdir.join("manifest.json")).expect("manifest exists");
    serde_json::from_str(&content).expect("manifest parses")
}

// ─── End-to-end: single stack ────────────────────────────────────────────────

#[test]
fn test_single_stack_with_variable_and_function_call() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let stack = TerraformStack::new(&mut app, "hello-terra").unwrap();

    LocalBackend::new(
        &mut app,
        stack,
        LocalBackendProps {
            path: Some("terraform.tfstate".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    null_provider(&mut app, stack);

    let my_var = TerraformVariable::new(
        &mut app,
        stack,
        "my_var",
        VariableDef {
            variable_type: Some("string".to_string()),
            default: Some(json!("default-value")),
            ..Default::default()
        },
    )
    .unwrap();
    let var_ref = my_var.value(&mut app);

    let resource1 = TerraformResource::new(
        &mut app,
        stack,
        "resource1",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            attributes: attributes(json!({
                "triggers": { "foo": "bar", "variable": var_ref, "overridden": "false" }
            })),
            ..Default::default()
        },
    )
    .unwrap();
    resource1.add_override(&mut app, "triggers.overridden", json!("true"));
    resource1.add_override(&mut app, "lifecycle.create_before_destroy", json!(true));

    let resource1_id = resource1.string_attribute(&mut app, "id");
    TerraformResource::new(
        &mut app,
        stack,
        "resource2",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            attributes: attributes(json!({ "triggers": { "ref": resource1_id } })),
            ..Default::default()
        },
    )
    .unwrap();

    let joined = fn_token(
        app.tokens_mut(),
        "join",
        vec![json!("-"), json!(["hello", "world"])],
    );
    TerraformOutput::new(
        &mut app,
        stack,
        "joined-value",
        OutputDef {
            value: json!(joined),
            ..Default::default()
        },
    )
    .unwrap();
    let var_ref_again = my_var.value(&mut app);
    TerraformOutput::new(
        &mut app,
        stack,
        "var-value",
        OutputDef {
            value: json!(var_ref_again),
            ..Default::default()
        },
    )
    .unwrap();
    TerraformOutput::new(
        &mut app,
        stack,
        "static-value",
        OutputDef {
            value: json!("static"),
            ..Default::default()
        },
    )
    .unwrap();

    app.synth().unwrap();

    let doc = read_stack_json(dir.path(), "hello-terra");
    assert_eq!(doc["terraform"]["backend"]["local"]["path"], json!("terraform.tfstate"));
    assert_eq!(
        doc["resource"]["null_resource"]["resource1"]["triggers"]["variable"],
        json!("${var.my_var}")
    );
    assert_eq!(
        doc["resource"]["null_resource"]["resource1"]["triggers"]["foo"],
        json!("bar")
    );
    assert_eq!(
        doc["resource"]["null_resource"]["resource1"]["triggers"]["overridden"],
        json!("true")
    );
    assert_eq!(
        doc["resource"]["null_resource"]["resource1"]["lifecycle"]["create_before_destroy"],
        json!(true)
    );
    assert_eq!(
        doc["resource"]["null_resource"]["resource2"]["triggers"]["ref"],
        json!("${null_resource.resource1.id}")
    );
    assert_eq!(
        doc["output"]["joined-value"]["value"],
        json!("${join(\"-\", [\"hello\", \"world\"])}")
    );
    assert_eq!(doc["output"]["var-value"]["value"], json!("${var.my_var}"));
    assert_eq!(doc["variable"]["my_var"]["type"], json!("string"));
    assert_eq!(doc["variable"]["my_var"]["default"], json!("default-value"));
    assert_eq!(doc["provider"]["null"], json!([{}]));
    assert_eq!(
        doc["terraform"]["required_providers"]["null"]["source"],
        json!("hashicorp/null")
    );

    // Stack self-description
    assert_eq!(doc["//"]["metadata"]["stackName"], json!("hello-terra"));
    assert_eq!(doc["//"]["metadata"]["backend"], json!("local"));

    // Manifest
    let manifest = read_manifest(dir.path());
    let entry = &manifest["stacks"]["hello-terra"];
    assert_eq!(entry["name"], json!("hello-terra"));
    assert_eq!(entry["constructPath"], json!("hello-terra"));
    assert_eq!(
        entry["synthesizedStackPath"],
        json!("stacks/hello-terra/cdk.tf.json")
    );
    assert_eq!(entry["workingDirectory"], json!("stacks/hello-terra"));
    assert_eq!(entry["annotations"], json!([]));
    assert_eq!(entry["dependencies"], json!([]));
}

// ─── Backend defaulting ──────────────────────────────────────────────────────

#[test]
fn test_missing_backend_defaults_to_local() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let stack = TerraformStack::new(&mut app, "bare").unwrap();
    null_provider(&mut app, stack);

    app.synth().unwrap();

    let doc = read_stack_json(dir.path(), "bare");
    assert_eq!(doc["//"]["metadata"]["backend"], json!("local"));
    assert_eq!(doc["terraform"]["backend"]["local"], json!({}));
}

// ─── Logical ids ─────────────────────────────────────────────────────────────

#[test]
fn test_default_scope_and_resource_suffix_vanish_from_logical_ids() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let stack = TerraformStack::new(&mut app, "stack").unwrap();
    null_provider(&mut app, stack);

    let scope = Construct::new(&mut app, stack, "Default").unwrap();
    TerraformResource::new(
        &mut app,
        scope,
        "ThingResource",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            ..Default::default()
        },
    )
    .unwrap();

    app.synth().unwrap();

    let doc = read_stack_json(dir.path(), "stack");
    assert!(doc["resource"]["null_resource"]["Thing"].is_object());
}

#[test]
fn test_nested_resources_get_hashed_logical_ids() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let stack = TerraformStack::new(&mut app, "stack").unwrap();
    null_provider(&mut app, stack);

    let group = Construct::new(&mut app, stack, "group").unwrap();
    TerraformResource::new(
        &mut app,
        group,
        "web",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            ..Default::default()
        },
    )
    .unwrap();

    app.synth().unwrap();

    let doc = read_stack_json(dir.path(), "stack");
    let ids: Vec<&String> = doc["resource"]["null_resource"]
        .as_object()
        .unwrap()
        .keys()
        .collect();
    assert_eq!(ids.len(), 1);
    assert!(ids[0].starts_with("group_web_"));
    assert!(ids[0].len() <= 255);
}

// ─── Merge determinism ───────────────────────────────────────────────────────

#[test]
fn test_same_logical_id_merges_last_writer_wins() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let stack = TerraformStack::new(&mut app, "stack").unwrap();
    null_provider(&mut app, stack);

    // Both paths produce the logical id "thing": "Default" components are
    // dropped before id allocation.
    TerraformResource::new(
        &mut app,
        stack,
        "thing",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            attributes: attributes(json!({ "triggers": { "keep": "a", "round": "first" } })),
            ..Default::default()
        },
    )
    .unwrap();
    let scope = Construct::new(&mut app, stack, "Default").unwrap();
    TerraformResource::new(
        &mut app,
        scope,
        "thing",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            attributes: attributes(json!({ "triggers": { "round": "second" } })),
            ..Default::default()
        },
    )
    .unwrap();

    app.synth().unwrap();

    let doc = read_stack_json(dir.path(), "stack");
    let thing = &doc["resource"]["null_resource"]["thing"];
    assert_eq!(thing["triggers"]["round"], json!("second"));
    assert_eq!(thing["triggers"]["keep"], json!("a"));
}

// ─── Validation ──────────────────────────────────────────────────────────────

#[test]
fn test_stack_without_provider_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let stack = TerraformStack::new(&mut app, "lonely-stack").unwrap();
    TerraformResource::new(
        &mut app,
        stack,
        "web",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            ..Default::default()
        },
    )
    .unwrap();

    let err = app.synth().unwrap_err();
    assert_eq!(err.kind(), "ValidationFailed");
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("lonely-stack"));
}

#[test]
fn test_validation_collects_all_messages() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let stack = TerraformStack::new(&mut app, "stack").unwrap();

    // No provider, an empty resource type, and count+for_each at once.
    let broken = TerraformResource::new(
        &mut app,
        stack,
        "broken",
        ResourceDef {
            resource_type: String::new(),
            ..Default::default()
        },
    )
    .unwrap();
    broken.set_count(&mut app, json!(2));
    broken.set_for_each(&mut app, json!(["a", "b"]));

    let err = app.synth().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("no provider"));
    assert!(message.contains("empty terraform resource type"));
    assert!(message.contains("mutually exclusive"));
}

#[test]
fn test_output_without_value_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let stack = TerraformStack::new(&mut app, "stack").unwrap();
    null_provider(&mut app, stack);
    TerraformOutput::new(&mut app, stack, "empty", OutputDef::default()).unwrap();

    let err = app.synth().unwrap_err();
    assert_eq!(err.kind(), "ValidationFailed");
    assert!(err.to_string().contains("empty"));
}

// ─── Stack dependencies ──────────────────────────────────────────────────────

#[test]
fn test_dependency_cycle_is_rejected() {
    let mut app = App::new("out");
    let a = TerraformStack::new(&mut app, "a").unwrap();
    let b = TerraformStack::new(&mut app, "b").unwrap();

    a.add_dependency(&mut app, &b).unwrap();
    let err = b.add_dependency(&mut app, &a).unwrap_err();
    assert_eq!(err.kind(), "CircularDependency");
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_transitive_dependency_cycle_is_rejected() {
    let mut app = App::new("out");
    let a = TerraformStack::new(&mut app, "a").unwrap();
    let b = TerraformStack::new(&mut app, "b").unwrap();
    let c = TerraformStack::new(&mut app, "c").unwrap();

    a.add_dependency(&mut app, &b).unwrap();
    b.add_dependency(&mut app, &c).unwrap();
    let err = c.add_dependency(&mut app, &a).unwrap_err();
    assert_eq!(err.kind(), "CircularDependency");
}

#[test]
fn test_self_dependency_is_rejected() {
    let mut app = App::new("out");
    let a = TerraformStack::new(&mut app, "a").unwrap();
    let err = a.add_dependency(&mut app, &a).unwrap_err();
    assert_eq!(err.kind(), "CircularDependency");
}

// ─── Aspects & annotations ───────────────────────────────────────────────────

/// Tags every visited construct whose id matches, the way a naming-policy
/// visitor would.
struct FlagResource {
    target_id: String,
}

impl tfsynth::construct::tree::Aspect for FlagResource {
    fn visit(&self, tree: &mut tfsynth::construct::tree::Tree, node: tfsynth::construct::tree::NodeId) {
        if tree.local_id(node) == self.target_id {
            tree.add_metadata(node, "warning", json!("flagged by naming policy"));
        }
    }
}

#[test]
fn test_aspects_visit_the_subtree_and_feed_manifest_annotations() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let stack = TerraformStack::new(&mut app, "stack").unwrap();
    null_provider(&mut app, stack);
    TerraformResource::new(
        &mut app,
        stack,
        "legacy",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            ..Default::default()
        },
    )
    .unwrap();

    app.tree_mut().add_aspect(
        stack.node(),
        std::rc::Rc::new(FlagResource {
            target_id: "legacy".to_string(),
        }),
    );

    app.synth().unwrap();

    let manifest = read_manifest(dir.path());
    assert_eq!(
        manifest["stacks"]["stack"]["annotations"],
        json!([{
            "constructPath": "stack/legacy",
            "level": "warning",
            "message": "flagged by naming policy"
        }])
    );
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[test]
fn test_synthesizing_twice_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let stack = TerraformStack::new(&mut app, "stack").unwrap();
    null_provider(&mut app, stack);

    app.synth().unwrap();
    let err = app.synth().unwrap_err();
    assert_eq!(err.kind(), "ValidationFailed");
}
