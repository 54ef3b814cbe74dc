use serde_json::Value;

use crate::construct::tree::{ConstructKind, NodeId};
use crate::elements::backend::{
    AzureRmBackendProps, BackendConfig, CloudBackendProps, GcsBackendProps, LocalBackendProps,
    RemoteBackendProps, S3BackendProps,
};
use crate::elements::types::{
    ElementData, ElementKind, Lifecycle, LocalDef, ModuleDef, OutputDef, Provisioner, ProviderDef,
    ResourceDef, VariableDef,
};
use crate::elements::{element_fqn, friendly_unique_id};
use crate::errors::Result;
use crate::synth::app::App;
use crate::tokens::table::Token;

fn attach_element(
    app: &mut App,
    scope: NodeId,
    id: &str,
    kind: ElementKind,
) -> Result<NodeId> {
    app.tree_mut()
        .attach(scope, id, ConstructKind::Element(ElementData::new(kind)))
}

fn element_data_mut(app: &mut App, node: NodeId) -> &mut ElementData {
    match app.tree_mut().kind_mut(node) {
        ConstructKind::Element(data) => data,
        _ => unreachable!("handle points at an element"),
    }
}

fn resource_def_mut(app: &mut App, node: NodeId) -> &mut ResourceDef {
    match &mut element_data_mut(app, node).kind {
        ElementKind::Resource(def) | ElementKind::DataSource(def) => def,
        _ => unreachable!("handle points at a resource or data source"),
    }
}

macro_rules! node_handle {
    ($name:ident) => {
        impl $name {
            pub fn node(&self) -> NodeId {
                self.node
            }
        }

        impl From<$name> for NodeId {
            fn from(handle: $name) -> NodeId {
                handle.node
            }
        }
    };
}

// ── Resource ──────────────────────────────────────────────────────────────

/// A managed resource contributing `{ resource: { <type>: { <id>: … } } }`.
#[derive(Debug, Clone, Copy)]
pub struct TerraformResource {
    node: NodeId,
}

node_handle!(TerraformResource);

impl TerraformResource {
    pub fn new(
        app: &mut App,
        scope: impl Into<NodeId>,
        id: &str,
        def: ResourceDef,
    ) -> Result<TerraformResource> {
        let node = attach_element(app, scope.into(), id, ElementKind::Resource(def))?;
        Ok(TerraformResource { node })
    }

    pub fn fqn(&self, app: &App) -> String {
        element_fqn(app.tree(), self.node)
    }

    pub fn friendly_unique_id(&self, app: &App) -> String {
        friendly_unique_id(app.tree(), self.node)
    }

    /// A string token handle standing for `${<fqn>.<attribute>}`.
    pub fn string_attribute(&self, app: &mut App, attribute: &str) -> String {
        let token = Token::Ref {
            target: self.node,
            attribute: Some(attribute.to_string()),
        };
        app.tokens_mut().create(token)
    }

    /// A number token handle standing for the same reference.
    pub fn number_attribute(&self, app: &mut App, attribute: &str) -> f64 {
        let token = Token::Ref {
            target: self.node,
            attribute: Some(attribute.to_string()),
        };
        app.tokens_mut().create_number(token)
    }

    pub fn add_override(&self, app: &mut App, path: &str, value: Value) {
        element_data_mut(app, self.node)
            .raw_overrides
            .push((path.to_string(), value));
    }

    pub fn add_depends_on(&self, app: &mut App, fqn: &str) {
        resource_def_mut(app, self.node)
            .depends_on
            .push(fqn.to_string());
    }

    pub fn set_count(&self, app: &mut App, count: Value) {
        resource_def_mut(app, self.node).count = Some(count);
    }

    pub fn set_for_each(&self, app: &mut App, for_each: Value) {
        resource_def_mut(app, self.node).for_each = Some(for_each);
    }

    /// Pin the resource to an aliased provider by its fqn, e.g. `aws.east`.
    pub fn set_provider(&self, app: &mut App, provider_fqn: &str) {
        resource_def_mut(app, self.node).provider = Some(provider_fqn.to_string());
    }

    pub fn set_lifecycle(&self, app: &mut App, lifecycle: Lifecycle) {
        resource_def_mut(app, self.node).lifecycle = Some(lifecycle);
    }

    pub fn add_provisioner(&self, app: &mut App, provisioner: Provisioner) {
        resource_def_mut(app, self.node).provisioners.push(provisioner);
    }
}

// ── Data source ───────────────────────────────────────────────────────────

/// A data source contributing `{ data: { <type>: { <id>: … } } }`.
#[derive(Debug, Clone, Copy)]
pub struct TerraformDataSource {
    node: NodeId,
}

node_handle!(TerraformDataSource);

impl TerraformDataSource {
    pub fn new(
        app: &mut App,
        scope: impl Into<NodeId>,
        id: &str,
        def: ResourceDef,
    ) -> Result<TerraformDataSource> {
        let node = attach_element(app, scope.into(), id, ElementKind::DataSource(def))?;
        Ok(TerraformDataSource { node })
    }

    pub fn fqn(&self, app: &App) -> String {
        element_fqn(app.tree(), self.node)
    }

    pub fn string_attribute(&self, app: &mut App, attribute: &str) -> String {
        let token = Token::Ref {
            target: self.node,
            attribute: Some(attribute.to_string()),
        };
        app.tokens_mut().create(token)
    }

    pub fn number_attribute(&self, app: &mut App, attribute: &str) -> f64 {
        let token = Token::Ref {
            target: self.node,
            attribute: Some(attribute.to_string()),
        };
        app.tokens_mut().create_number(token)
    }

    pub fn add_override(&self, app: &mut App, path: &str, value: Value) {
        element_data_mut(app, self.node)
            .raw_overrides
            .push((path.to_string(), value));
    }

    pub fn add_depends_on(&self, app: &mut App, fqn: &str) {
        resource_def_mut(app, self.node)
            .depends_on
            .push(fqn.to_string());
    }

    pub fn set_count(&self, app: &mut App, count: Value) {
        resource_def_mut(app, self.node).count = Some(count);
    }

    pub fn set_for_each(&self, app: &mut App, for_each: Value) {
        resource_def_mut(app, self.node).for_each = Some(for_each);
    }

    pub fn set_provider(&self, app: &mut App, provider_fqn: &str) {
        resource_def_mut(app, self.node).provider = Some(provider_fqn.to_string());
    }

    pub fn set_lifecycle(&self, app: &mut App, lifecycle: Lifecycle) {
        resource_def_mut(app, self.node).lifecycle = Some(lifecycle);
    }
}

// ── Provider ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct TerraformProvider {
    node: NodeId,
}

node_handle!(TerraformProvider);

impl TerraformProvider {
    pub fn new(
        app: &mut App,
        scope: impl Into<NodeId>,
        id: &str,
        def: ProviderDef,
    ) -> Result<TerraformProvider> {
        let node = attach_element(app, scope.into(), id, ElementKind::Provider(def))?;
        Ok(TerraformProvider { node })
    }

    /// `<type>` or `<type>.<alias>`, usable as the `provider` meta-argument.
    pub fn fqn(&self, app: &App) -> String {
        element_fqn(app.tree(), self.node)
    }
}

// ── Variable ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct TerraformVariable {
    node: NodeId,
}

node_handle!(TerraformVariable);

impl TerraformVariable {
    pub fn new(
        app: &mut App,
        scope: impl Into<NodeId>,
        id: &str,
        def: VariableDef,
    ) -> Result<TerraformVariable> {
        let node = attach_element(app, scope.into(), id, ElementKind::Variable(def))?;
        Ok(TerraformVariable { node })
    }

    pub fn fqn(&self, app: &App) -> String {
        element_fqn(app.tree(), self.node)
    }

    /// A string token handle standing for `${var.<id>}`.
    pub fn value(&self, app: &mut App) -> String {
        let token = Token::Ref {
            target: self.node,
            attribute: None,
        };
        app.tokens_mut().create(token)
    }

    pub fn number_value(&self, app: &mut App) -> f64 {
        let token = Token::Ref {
            target: self.node,
            attribute: None,
        };
        app.tokens_mut().create_number(token)
    }
}

// ── Output ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct TerraformOutput {
    node: NodeId,
}

node_handle!(TerraformOutput);

impl TerraformOutput {
    pub fn new(
        app: &mut App,
        scope: impl Into<NodeId>,
        id: &str,
        def: OutputDef,
    ) -> Result<TerraformOutput> {
        let node = attach_element(app, scope.into(), id, ElementKind::Output(def))?;
        Ok(TerraformOutput { node })
    }

    pub fn friendly_unique_id(&self, app: &App) -> String {
        friendly_unique_id(app.tree(), self.node)
    }
}

// ── Local ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct TerraformLocal {
    node: NodeId,
}

node_handle!(TerraformLocal);

impl TerraformLocal {
    pub fn new(
        app: &mut App,
        scope: impl Into<NodeId>,
        id: &str,
        expression: Value,
    ) -> Result<TerraformLocal> {
        let node = attach_element(
            app,
            scope.into(),
            id,
            ElementKind::Local(LocalDef { expression }),
        )?;
        Ok(TerraformLocal { node })
    }

    /// A string token handle standing for `${local.<id>}`.
    pub fn value(&self, app: &mut App) -> String {
        let token = Token::Ref {
            target: self.node,
            attribute: None,
        };
        app.tokens_mut().create(token)
    }
}

// ── Module ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct TerraformModule {
    node: NodeId,
}

node_handle!(TerraformModule);

impl TerraformModule {
    pub fn new(
        app: &mut App,
        scope: impl Into<NodeId>,
        id: &str,
        def: ModuleDef,
    ) -> Result<TerraformModule> {
        let node = attach_element(app, scope.into(), id, ElementKind::Module(def))?;
        Ok(TerraformModule { node })
    }

    pub fn fqn(&self, app: &App) -> String {
        element_fqn(app.tree(), self.node)
    }

    /// A string token handle standing for `${module.<id>.<output>}`.
    pub fn output_attribute(&self, app: &mut App, output: &str) -> String {
        let token = Token::Ref {
            target: self.node,
            attribute: Some(output.to_string()),
        };
        app.tokens_mut().create(token)
    }
}

// ── Backends ──────────────────────────────────────────────────────────────

/// The backend construct id is fixed, so a second backend in the same stack
/// fails construction with a duplicate-id error.
const BACKEND_ID: &str = "backend";

macro_rules! backend_handle {
    ($(#[$doc:meta])* $name:ident, $props:ty, $variant:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name {
            node: NodeId,
        }

        node_handle!($name);

        impl $name {
            pub fn new(
                app: &mut App,
                scope: impl Into<NodeId>,
                props: $props,
            ) -> Result<$name> {
                let node = attach_element(
                    app,
                    scope.into(),
                    BACKEND_ID,
                    ElementKind::Backend(BackendConfig::$variant(props)),
                )?;
                Ok($name { node })
            }
        }
    };
}

backend_handle!(
    /// State on local disk; the default when a stack declares no backend.
    LocalBackend,
    LocalBackendProps,
    Local
);
backend_handle!(S3Backend, S3BackendProps, S3);
backend_handle!(GcsBackend, GcsBackendProps, Gcs);
backend_handle!(AzureRmBackend, AzureRmBackendProps, AzureRm);
backend_handle!(RemoteBackend, RemoteBackendProps, Remote);
backend_handle!(
    /// HCP Terraform; tagged workspace selection cannot serve cross-stack
    /// references.
    CloudBackend,
    CloudBackendProps,
    Cloud
);
