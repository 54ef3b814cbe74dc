use serde_json::{json, Map, Value};

use crate::construct::tree::{ConstructKind, NodeId, Tree};
use crate::elements::types::{Condition, ElementKind, Lifecycle, ResourceDef};
use crate::elements::{element_fqn, friendly_unique_id};

/// Build the Terraform JSON fragment an element contributes to its stack.
///
/// Deterministic given the element's configuration: attribute keys are
/// normalized to snake_case, meta-arguments merged in, and raw overrides
/// spliced last.
pub fn element_fragment(tree: &Tree, node: NodeId) -> Value {
    let data = match tree.kind(node) {
        ConstructKind::Element(data) => data,
        _ => return json!({}),
    };
    let logical_id = friendly_unique_id(tree, node);

    match &data.kind {
        ElementKind::Resource(def) => {
            let mut body = resource_body(def);
            apply_overrides(&mut body, &data.raw_overrides);
            json!({ "resource": { def.resource_type.as_str(): { logical_id: body } } })
        }
        ElementKind::DataSource(def) => {
            let mut body = resource_body(def);
            apply_overrides(&mut body, &data.raw_overrides);
            json!({ "data": { def.resource_type.as_str(): { logical_id: body } } })
        }
        ElementKind::Provider(def) => {
            let mut body = snake_keys_deep_map(def.attributes.clone());
            if let Some(alias) = &def.alias {
                body.insert("alias".to_string(), json!(alias));
            }
            apply_overrides(&mut body, &data.raw_overrides);

            let mut required = Map::new();
            required.insert("source".to_string(), json!(def.source));
            if let Some(version) = &def.version {
                required.insert("version".to_string(), json!(version));
            }

            json!({
                "terraform": {
                    "required_providers": { def.provider_type.as_str(): required }
                },
                "provider": { def.provider_type.as_str(): [body] }
            })
        }
        ElementKind::Backend(config) => {
            let mut fragment = config.to_fragment();
            if !data.raw_overrides.is_empty() {
                if let Some(body) = backend_body_mut(&mut fragment, config.backend_type()) {
                    apply_overrides(body, &data.raw_overrides);
                }
            }
            fragment
        }
        ElementKind::Variable(def) => {
            let mut body = Map::new();
            if let Some(t) = &def.variable_type {
                body.insert("type".to_string(), json!(t));
            }
            if let Some(default) = &def.default {
                body.insert("default".to_string(), default.clone());
            }
            if let Some(description) = &def.description {
                body.insert("description".to_string(), json!(description));
            }
            if def.sensitive {
                body.insert("sensitive".to_string(), json!(true));
            }
            if let Some(nullable) = def.nullable {
                body.insert("nullable".to_string(), json!(nullable));
            }
            if !def.validations.is_empty() {
                body.insert(
                    "validation".to_string(),
                    Value::Array(def.validations.iter().map(condition_value).collect()),
                );
            }
            apply_overrides(&mut body, &data.raw_overrides);
            json!({ "variable": { logical_id: body } })
        }
        ElementKind::Output(def) => {
            let mut body = Map::new();
            body.insert("value".to_string(), def.value.clone());
            if let Some(description) = &def.description {
                body.insert("description".to_string(), json!(description));
            }
            if def.sensitive {
                body.insert("sensitive".to_string(), json!(true));
            }
            if !def.depends_on.is_empty() {
                body.insert("depends_on".to_string(), json!(def.depends_on));
            }
            apply_overrides(&mut body, &data.raw_overrides);
            json!({ "output": { logical_id: body } })
        }
        ElementKind::Local(def) => {
            json!({ "locals": { logical_id: def.expression.clone() } })
        }
        ElementKind::Module(def) => {
            let mut body = snake_keys_deep_map(def.variables.clone());
            body.insert("source".to_string(), json!(def.source));
            if let Some(version) = &def.version {
                body.insert("version".to_string(), json!(version));
            }
            if !def.providers.is_empty() {
                let map: Map<String, Value> = def
                    .providers
                    .iter()
                    .map(|(name, fqn)| (name.clone(), json!(fqn)))
                    .collect();
                body.insert("providers".to_string(), Value::Object(map));
            }
            if !def.depends_on.is_empty() {
                body.insert("depends_on".to_string(), json!(def.depends_on));
            }
            if let Some(for_each) = &def.for_each {
                body.insert("for_each".to_string(), for_each.clone());
            }
            apply_overrides(&mut body, &data.raw_overrides);
            json!({ "module": { logical_id: body } })
        }
    }
}

/// Element metadata contributed under the stack's `//` key; empty for most
/// elements (annotation-level entries travel via the manifest instead).
pub fn element_metadata(tree: &Tree, node: NodeId) -> Value {
    let entries: Map<String, Value> = tree
        .metadata(node)
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "info" | "warning" | "error"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if entries.is_empty() {
        return json!({});
    }
    json!({ "//": { element_fqn(tree, node): entries } })
}

fn resource_body(def: &ResourceDef) -> Map<String, Value> {
    let mut body = snake_keys_deep_map(def.attributes.clone());
    if !def.depends_on.is_empty() {
        body.insert("depends_on".to_string(), json!(def.depends_on));
    }
    if let Some(count) = &def.count {
        body.insert("count".to_string(), count.clone());
    }
    if let Some(for_each) = &def.for_each {
        body.insert("for_each".to_string(), for_each.clone());
    }
    if let Some(provider) = &def.provider {
        body.insert("provider".to_string(), json!(provider));
    }
    if let Some(lifecycle) = &def.lifecycle {
        body.insert("lifecycle".to_string(), lifecycle_value(lifecycle));
    }
    if !def.provisioners.is_empty() {
        let blocks: Vec<Value> = def
            .provisioners
            .iter()
            .map(|p| {
                let mut config = p.config.clone();
                if let Some(when) = &p.when {
                    config.insert("when".to_string(), json!(when));
                }
                json!({ p.provisioner_type.as_str(): config })
            })
            .collect();
        body.insert("provisioner".to_string(), Value::Array(blocks));
    }
    body
}

fn lifecycle_value(lifecycle: &Lifecycle) -> Value {
    let mut body = Map::new();
    if let Some(v) = lifecycle.create_before_destroy {
        body.insert("create_before_destroy".to_string(), json!(v));
    }
    if let Some(v) = lifecycle.prevent_destroy {
        body.insert("prevent_destroy".to_string(), json!(v));
    }
    if let Some(v) = &lifecycle.ignore_changes {
        body.insert("ignore_changes".to_string(), v.clone());
    }
    if !lifecycle.replace_triggered_by.is_empty() {
        body.insert(
            "replace_triggered_by".to_string(),
            json!(lifecycle.replace_triggered_by),
        );
    }
    if !lifecycle.precondition.is_empty() {
        body.insert(
            "precondition".to_string(),
            Value::Array(lifecycle.precondition.iter().map(condition_value).collect()),
        );
    }
    if !lifecycle.postcondition.is_empty() {
        body.insert(
            "postcondition".to_string(),
            Value::Array(lifecycle.postcondition.iter().map(condition_value).collect()),
        );
    }
    Value::Object(body)
}

fn condition_value(condition: &Condition) -> Value {
    json!({
        "condition": condition.condition,
        "error_message": condition.error_message,
    })
}

fn backend_body_mut<'a>(fragment: &'a mut Value, backend_type: &str) -> Option<&'a mut Map<String, Value>> {
    let terraform = fragment.get_mut("terraform")?;
    let body = if backend_type == "cloud" {
        terraform.get_mut("cloud")?
    } else {
        terraform.get_mut("backend")?.get_mut(backend_type)?
    };
    body.as_object_mut()
}

/// Splice dotted-path overrides into a synthesized body, creating missing
/// intermediate objects. A non-object on the way is replaced.
pub(crate) fn apply_overrides(body: &mut Map<String, Value>, overrides: &[(String, Value)]) {
    for (path, value) in overrides {
        let mut parts = path.split('.').peekable();
        let mut cursor = &mut *body;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                cursor.insert(part.to_string(), value.clone());
                break;
            }
            let slot = cursor
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            cursor = slot.as_object_mut().expect("just ensured object");
        }
    }
}

/// Lower-snake attribute keys recursively: `AbcDef` → `abc_def`. Keys that
/// already carry an interpolation (`${…}`) are left untouched.
pub(crate) fn snake_keys_deep(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(snake_keys_deep_map(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(snake_keys_deep).collect()),
        other => other,
    }
}

pub(crate) fn snake_keys_deep_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| (to_snake_case(&key), snake_keys_deep(value)))
        .collect()
}

pub(crate) fn to_snake_case(key: &str) -> String {
    if key.contains("${") {
        return key.to_string();
    }
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
