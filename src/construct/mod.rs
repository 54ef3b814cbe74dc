pub mod logical_id;
pub mod tree;

use std::rc::Rc;

use serde_json::Value;

use crate::construct::tree::{Aspect, ConstructKind, NodeId};
use crate::errors::Result;
use crate::synth::app::App;

/// A plain named grouping node with no Terraform footprint of its own.
///
/// Useful for namespacing: elements created under it get the group's id as a
/// path component, which feeds their logical ids.
#[derive(Debug, Clone, Copy)]
pub struct Construct {
    node: NodeId,
}

impl Construct {
    pub fn new(app: &mut App, scope: impl Into<NodeId>, id: &str) -> Result<Construct> {
        let node = app
            .tree_mut()
            .attach(scope.into(), id, ConstructKind::Group)?;
        Ok(Construct { node })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn add_metadata(&self, app: &mut App, key: &str, value: Value) {
        app.tree_mut().add_metadata(self.node, key, value);
    }

    pub fn add_aspect(&self, app: &mut App, aspect: Rc<dyn Aspect>) {
        app.tree_mut().add_aspect(self.node, aspect);
    }
}

impl From<Construct> for NodeId {
    fn from(construct: Construct) -> NodeId {
        construct.node
    }
}
