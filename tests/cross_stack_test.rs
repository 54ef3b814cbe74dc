use serde_json::{json, Map, Value};

use tfsynth::elements::backend::{CloudBackendProps, CloudWorkspaces, LocalBackendProps};
use tfsynth::elements::handles::{
    CloudBackend, LocalBackend, TerraformOutput, TerraformProvider, TerraformResource,
};
use tfsynth::elements::types::{OutputDef, ProviderDef, ResourceDef};
use tfsynth::stack::TerraformStack;
use tfsynth::synth::app::App;

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
    assert!(!content.contains("${TfToken["), "no handle survives synthesis");
    serde_json::from_str(&content).expect("stack json parses")
}

/// Source stack with a local backend, a null provider, one resource, and a
/// user-declared output exporting its id.
fn build_source(app: &mut App) -> (TerraformStack, TerraformResource) {
    let stack = TerraformStack::new(app, "source-stack").unwrap();
    LocalBackend::new(
        app,
        stack,
        LocalBackendProps {
            path: Some("terraform.source.tfstate".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    null_provider(app, stack);

    let resource = TerraformResource::new(
        app,
        stack,
        "source-resource",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            ..Default::default()
        },
    )
    .unwrap();
    let id_ref = resource.string_attribute(app, "id");
    TerraformOutput::new(
        app,
        stack,
        "source-id",
        OutputDef {
            value: json!(id_ref),
            ..Default::default()
        },
    )
    .unwrap();
    (stack, resource)
}

#[test]
fn test_cross_stack_reference_inserts_output_and_remote_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let (_, source_resource) = build_source(&mut app);

    let consumer = TerraformStack::new(&mut app, "consumer-stack").unwrap();
    LocalBackend::new(&mut app, consumer, LocalBackendProps::default()).unwrap();
    null_provider(&mut app, consumer);

    let foreign_ref = source_resource.string_attribute(&mut app, "id");
    TerraformResource::new(
        &mut app,
        consumer,
        "consumer-resource",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            attributes: attributes(json!({ "triggers": { "source-id": foreign_ref } })),
            ..Default::default()
        },
    )
    .unwrap();

    app.synth().unwrap();

    // Source side: the user output keeps the plain interpolation, and the
    // rewriter added exactly one sensitive export for the referenced value.
    let source = read_stack_json(dir.path(), "source-stack");
    assert_eq!(
        source["output"]["source-id"]["value"],
        json!("${null_resource.source-resource.id}")
    );
    let outputs = source["output"].as_object().unwrap();
    let exports: Vec<(&String, &Value)> = outputs
        .iter()
        .filter(|(name, _)| name.starts_with("cross-stack-output"))
        .collect();
    assert_eq!(exports.len(), 1);
    let (export_name, export) = exports[0];
    assert_eq!(export["value"], json!("${null_resource.source-resource.id}"));
    assert_eq!(export["sensitive"], json!(true));

    // Consumer side: one remote-state data source reading the source
    // backend, and the reference text rewritten through it.
    let consumer_doc = read_stack_json(dir.path(), "consumer-stack");
    let remote_states = consumer_doc["data"]["terraform_remote_state"]
        .as_object()
        .unwrap();
    assert_eq!(remote_states.len(), 1);
    let (remote_state_id, remote_state) = remote_states.iter().next().unwrap();
    assert_eq!(remote_state["backend"], json!("local"));
    assert_eq!(
        remote_state["config"]["path"],
        json!("terraform.source.tfstate")
    );
    assert_eq!(
        consumer_doc["resource"]["null_resource"]["consumer-resource"]["triggers"]["source-id"],
        json!(format!(
            "${{data.terraform_remote_state.{}.outputs.{}}}",
            remote_state_id, export_name
        ))
    );

    // Manifest records the dependency and both stacks.
    let manifest: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        manifest["stacks"]["consumer-stack"]["dependencies"],
        json!(["source-stack"])
    );
    assert_eq!(manifest["stacks"]["source-stack"]["dependencies"], json!([]));
}

#[test]
fn test_repeated_references_share_one_output_and_one_remote_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let (_, source_resource) = build_source(&mut app);

    let consumer = TerraformStack::new(&mut app, "consumer-stack").unwrap();
    LocalBackend::new(&mut app, consumer, LocalBackendProps::default()).unwrap();
    null_provider(&mut app, consumer);

    for name in ["first", "second", "third"] {
        let foreign_ref = source_resource.string_attribute(&mut app, "id");
        TerraformResource::new(
            &mut app,
            consumer,
            name,
            ResourceDef {
                resource_type: "null_resource".to_string(),
                attributes: attributes(json!({ "triggers": { "ref": foreign_ref } })),
                ..Default::default()
            },
        )
        .unwrap();
    }

    app.synth().unwrap();

    let source = read_stack_json(dir.path(), "source-stack");
    let exports = source["output"]
        .as_object()
        .unwrap()
        .keys()
        .filter(|name| name.starts_with("cross-stack-output"))
        .count();
    assert_eq!(exports, 1, "one export per (fqn, attribute) pair");

    let consumer_doc = read_stack_json(dir.path(), "consumer-stack");
    assert_eq!(
        consumer_doc["data"]["terraform_remote_state"]
            .as_object()
            .unwrap()
            .len(),
        1,
        "one remote state per source stack"
    );
}

#[test]
fn test_distinct_attributes_get_distinct_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());
    let (_, source_resource) = build_source(&mut app);

    let consumer = TerraformStack::new(&mut app, "consumer-stack").unwrap();
    LocalBackend::new(&mut app, consumer, LocalBackendProps::default()).unwrap();
    null_provider(&mut app, consumer);

    let id_ref = source_resource.string_attribute(&mut app, "id");
    let triggers_ref = source_resource.string_attribute(&mut app, "triggers");
    TerraformResource::new(
        &mut app,
        consumer,
        "consumer-resource",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            attributes: attributes(json!({
                "triggers": { "id": id_ref, "upstream": triggers_ref }
            })),
            ..Default::default()
        },
    )
    .unwrap();

    app.synth().unwrap();

    let source = read_stack_json(dir.path(), "source-stack");
    let exports = source["output"]
        .as_object()
        .unwrap()
        .keys()
        .filter(|name| name.starts_with("cross-stack-output"))
        .count();
    assert_eq!(exports, 2);

    let consumer_doc = read_stack_json(dir.path(), "consumer-stack");
    assert_eq!(
        consumer_doc["data"]["terraform_remote_state"]
            .as_object()
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_cross_stack_orders_source_before_consumer() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());

    // Consumer constructed first; the dependency must still win.
    let consumer = TerraformStack::new(&mut app, "consumer-stack").unwrap();
    LocalBackend::new(&mut app, consumer, LocalBackendProps::default()).unwrap();
    null_provider(&mut app, consumer);

    let (_, source_resource) = build_source(&mut app);
    let foreign_ref = source_resource.string_attribute(&mut app, "id");
    TerraformResource::new(
        &mut app,
        consumer,
        "consumer-resource",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            attributes: attributes(json!({ "triggers": { "ref": foreign_ref } })),
            ..Default::default()
        },
    )
    .unwrap();

    app.synth().unwrap();

    let consumer_doc = read_stack_json(dir.path(), "consumer-stack");
    assert_eq!(consumer_doc["data"]["terraform_remote_state"]
        .as_object()
        .unwrap()
        .len(), 1);
}

#[test]
fn test_cloud_backend_with_tagged_workspaces_refuses_cross_stack() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());

    let source = TerraformStack::new(&mut app, "source-stack").unwrap();
    CloudBackend::new(
        &mut app,
        source,
        CloudBackendProps {
            organization: "acme".to_string(),
            workspaces: CloudWorkspaces::Tagged {
                tags: vec!["networking".to_string()],
            },
            hostname: None,
            token: None,
        },
    )
    .unwrap();
    null_provider(&mut app, source);
    let resource = TerraformResource::new(
        &mut app,
        source,
        "source-resource",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            ..Default::default()
        },
    )
    .unwrap();

    let consumer = TerraformStack::new(&mut app, "consumer-stack").unwrap();
    null_provider(&mut app, consumer);
    let foreign_ref = resource.string_attribute(&mut app, "id");
    TerraformResource::new(
        &mut app,
        consumer,
        "consumer-resource",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            attributes: attributes(json!({ "triggers": { "ref": foreign_ref } })),
            ..Default::default()
        },
    )
    .unwrap();

    let err = app.synth().unwrap_err();
    assert_eq!(err.kind(), "UnsupportedCrossStack");
    assert!(err.to_string().contains("source-stack"));
}

#[test]
fn test_cloud_backend_with_named_workspace_serves_cross_stack() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new(dir.path());

    let source = TerraformStack::new(&mut app, "source-stack").unwrap();
    CloudBackend::new(
        &mut app,
        source,
        CloudBackendProps {
            organization: "acme".to_string(),
            workspaces: CloudWorkspaces::Named {
                name: "networking".to_string(),
            },
            hostname: None,
            token: None,
        },
    )
    .unwrap();
    null_provider(&mut app, source);
    let resource = TerraformResource::new(
        &mut app,
        source,
        "source-resource",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            ..Default::default()
        },
    )
    .unwrap();

    let consumer = TerraformStack::new(&mut app, "consumer-stack").unwrap();
    LocalBackend::new(&mut app, consumer, LocalBackendProps::default()).unwrap();
    null_provider(&mut app, consumer);
    let foreign_ref = resource.string_attribute(&mut app, "id");
    TerraformResource::new(
        &mut app,
        consumer,
        "consumer-resource",
        ResourceDef {
            resource_type: "null_resource".to_string(),
            attributes: attributes(json!({ "triggers": { "ref": foreign_ref } })),
            ..Default::default()
        },
    )
    .unwrap();

    app.synth().unwrap();

    let consumer_doc = read_stack_json(dir.path(), "consumer-stack");
    let remote_states = consumer_doc["data"]["terraform_remote_state"]
        .as_object()
        .unwrap();
    let (_, remote_state) = remote_states.iter().next().unwrap();
    assert_eq!(remote_state["backend"], json!("remote"));
    assert_eq!(remote_state["config"]["organization"], json!("acme"));
    assert_eq!(
        remote_state["config"]["workspaces"],
        json!({ "name": "networking" })
    );
}
