use serde_json::{Map, Value};

use crate::elements::backend::BackendConfig;

/// Payload of an element node: the kind-specific definition plus the shared
/// escape-hatch state every element carries.
pub struct ElementData {
    pub kind: ElementKind,
    /// Dotted-path overrides applied last on top of the synthesized
    /// attributes, in insertion order. Keys are taken verbatim.
    pub raw_overrides: Vec<(String, Value)>,
}

impl ElementData {
    pub fn new(kind: ElementKind) -> ElementData {
        ElementData {
            kind,
            raw_overrides: Vec::new(),
        }
    }
}

/// The element variants a stack can contain.
pub enum ElementKind {
    Resource(ResourceDef),
    DataSource(ResourceDef),
    Provider(ProviderDef),
    Backend(BackendConfig),
    Variable(VariableDef),
    Output(OutputDef),
    Local(LocalDef),
    Module(ModuleDef),
}

impl ElementKind {
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            ElementKind::Resource(_) => "resource",
            ElementKind::DataSource(_) => "data source",
            ElementKind::Provider(_) => "provider",
            ElementKind::Backend(_) => "backend",
            ElementKind::Variable(_) => "variable",
            ElementKind::Output(_) => "output",
            ElementKind::Local(_) => "local",
            ElementKind::Module(_) => "module",
        }
    }
}

/// A resource or data source definition. The synthesis core is generic over
/// `{resource_type, attributes}`; typed wrappers are generated elsewhere.
#[derive(Default)]
pub struct ResourceDef {
    pub resource_type: String,
    /// camelCase in memory, snake_case on emission.
    pub attributes: Map<String, Value>,
    pub depends_on: Vec<String>,
    pub count: Option<Value>,
    pub for_each: Option<Value>,
    /// Provider fqn-with-alias, e.g. `aws.east`.
    pub provider: Option<String>,
    pub lifecycle: Option<Lifecycle>,
    pub provisioners: Vec<Provisioner>,
}

/// The resource lifecycle meta-argument block.
#[derive(Default)]
pub struct Lifecycle {
    pub create_before_destroy: Option<bool>,
    pub prevent_destroy: Option<bool>,
    /// A list of attribute names, or the string `"all"`.
    pub ignore_changes: Option<Value>,
    pub replace_triggered_by: Vec<String>,
    pub precondition: Vec<Condition>,
    pub postcondition: Vec<Condition>,
}

pub struct Condition {
    pub condition: Value,
    pub error_message: String,
}

/// A provisioner block nested in a resource.
pub struct Provisioner {
    /// `local-exec`, `remote-exec`, or `file`.
    pub provisioner_type: String,
    pub config: Map<String, Value>,
    /// `destroy` for destroy-time provisioners; create-time when absent.
    pub when: Option<String>,
}

#[derive(Default)]
pub struct ProviderDef {
    /// The provider type, e.g. `aws`.
    pub provider_type: String,
    /// Registry source, e.g. `hashicorp/aws`. Must be non-empty.
    pub source: String,
    pub version: Option<String>,
    pub alias: Option<String>,
    pub attributes: Map<String, Value>,
}

#[derive(Default)]
pub struct VariableDef {
    pub variable_type: Option<String>,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub sensitive: bool,
    pub nullable: Option<bool>,
    pub validations: Vec<Condition>,
}

#[derive(Default)]
pub struct OutputDef {
    pub value: Value,
    pub description: Option<String>,
    pub sensitive: bool,
    pub depends_on: Vec<String>,
}

pub struct LocalDef {
    pub expression: Value,
}

#[derive(Default)]
pub struct ModuleDef {
    pub source: String,
    pub version: Option<String>,
    /// Module input variables; camelCase in memory, snake_case on emission.
    pub variables: Map<String, Value>,
    /// Provider passing, e.g. `aws` → `aws.east`.
    pub providers: Vec<(String, String)>,
    pub depends_on: Vec<String>,
    pub for_each: Option<Value>,
}
