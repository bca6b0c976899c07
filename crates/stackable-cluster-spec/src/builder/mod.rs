//! Fluent construction of [`SpecNode`] trees.
//!
//! Every write goes through [`NodeBuilder::set`], which checks the value against the
//! schema immediately. The typed builders in the submodules are thin facades over a
//! [`NodeBuilder`] for the Kubernetes kinds that show up in most pod templates.
//! Building never validates, run a [`Validator`](crate::validation::Validator) on the result.
use snafu::OptionExt;

use crate::{
    node::{SetError, SpecNode, TypeMismatchSnafu},
    schema::{SchemaRegistry, UnknownFieldError},
    value::{FieldValue, ValueKind},
};

mod cluster;
mod container;
mod probe;
mod security;
mod volume;

pub use cluster::*;
pub use container::*;
pub use probe::*;
pub use security::*;
pub use volume::*;

/// A builder for a [`SpecNode`] of any kind known to the registry.
#[derive(Clone, Debug)]
pub struct NodeBuilder<'r> {
    registry: &'r SchemaRegistry,
    node: SpecNode,
}

impl<'r> NodeBuilder<'r> {
    pub fn new(registry: &'r SchemaRegistry, kind: &str) -> Result<Self, UnknownFieldError> {
        Ok(Self {
            registry,
            node: registry.new_node(kind)?,
        })
    }

    /// Continues building an existing node, e.g. one returned by the codec.
    pub fn from_node(registry: &'r SchemaRegistry, node: SpecNode) -> Self {
        Self { registry, node }
    }

    pub fn registry(&self) -> &'r SchemaRegistry {
        self.registry
    }

    pub fn kind(&self) -> &str {
        self.node.kind()
    }

    /// Sets `field` to `value`. Fails if the field is not declared for this kind or the
    /// value does not match the declared type.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<&mut Self, SetError> {
        self.node.insert(field, value)?;
        Ok(self)
    }

    /// Sets `field` to an explicit `null`, which is emitted on the wire.
    pub fn set_null(&mut self, field: &str) -> Result<&mut Self, SetError> {
        self.set(field, FieldValue::Null)
    }

    /// Clears `field`, it is omitted on the wire.
    pub fn unset(&mut self, field: &str) -> Result<&mut Self, SetError> {
        self.node.remove(field)?;
        Ok(self)
    }

    pub fn set_node(&mut self, field: &str, node: impl Into<SpecNode>) -> Result<&mut Self, SetError> {
        let node: SpecNode = node.into();
        self.set(field, node)
    }

    pub fn set_nodes<N: Into<SpecNode>>(
        &mut self,
        field: &str,
        nodes: impl IntoIterator<Item = N>,
    ) -> Result<&mut Self, SetError> {
        let nodes = nodes
            .into_iter()
            .map(|node| FieldValue::Node(Box::new(node.into())))
            .collect::<Vec<_>>();
        self.set(field, FieldValue::List(nodes))
    }

    /// Appends `item` to the list held by `field`, starting a new list if the field is
    /// unset or `null`.
    pub fn add_item(&mut self, field: &str, item: impl Into<FieldValue>) -> Result<&mut Self, SetError> {
        let value_kind = self.registry.lookup(self.kind(), field)?.value_kind.clone();
        let ValueKind::List(inner) = &value_kind else {
            return TypeMismatchSnafu {
                kind: self.kind(),
                field,
                expected: value_kind.clone(),
                found: "list item",
            }
            .fail();
        };

        let item = inner.coerce(item.into());
        if !inner.accepts(&item) {
            return TypeMismatchSnafu {
                kind: self.kind(),
                field,
                expected: inner.as_ref().clone(),
                found: item.describe(),
            }
            .fail();
        }

        let mut items = match self.node.remove(field)? {
            Some(FieldValue::List(items)) => items,
            _ => Vec::new(),
        };
        items.push(item);
        self.set(field, FieldValue::List(items))
    }

    /// Returns a builder for the node kind `field` refers to (looking through lists and
    /// maps), e.g. a `KeyToPath` builder for `ConfigMapVolumeSource.items`.
    pub fn for_field(&self, field: &str) -> Result<NodeBuilder<'r>, SetError> {
        let value_kind = &self.registry.lookup(self.kind(), field)?.value_kind;
        let kind = value_kind.referenced_kind().context(TypeMismatchSnafu {
            kind: self.kind(),
            field,
            expected: value_kind.clone(),
            found: "node",
        })?;

        Ok(NodeBuilder::new(self.registry, kind)?)
    }

    /// Edits the child node held by `field` in place, creating it first if the field is
    /// unset or `null`.
    pub fn edit_node(
        &mut self,
        field: &str,
        edit: impl FnOnce(&mut NodeBuilder<'r>) -> Result<(), SetError>,
    ) -> Result<&mut Self, SetError> {
        let mut child = match self.node.get_node(field) {
            Some(node) => NodeBuilder::from_node(self.registry, node.clone()),
            None => self.for_field(field)?,
        };
        edit(&mut child)?;
        self.set_node(field, child)
    }

    /// Returns the node built so far. No validation is performed.
    pub fn build(&self) -> SpecNode {
        self.node.clone()
    }

    pub fn into_node(self) -> SpecNode {
        self.node
    }
}

impl From<NodeBuilder<'_>> for SpecNode {
    fn from(builder: NodeBuilder<'_>) -> Self {
        builder.into_node()
    }
}

impl From<&NodeBuilder<'_>> for SpecNode {
    fn from(builder: &NodeBuilder<'_>) -> Self {
        builder.build()
    }
}

impl From<&mut NodeBuilder<'_>> for SpecNode {
    fn from(builder: &mut NodeBuilder<'_>) -> Self {
        builder.build()
    }
}

impl From<NodeBuilder<'_>> for FieldValue {
    fn from(builder: NodeBuilder<'_>) -> Self {
        builder.into_node().into()
    }
}

impl From<&NodeBuilder<'_>> for FieldValue {
    fn from(builder: &NodeBuilder<'_>) -> Self {
        builder.build().into()
    }
}

impl From<&mut NodeBuilder<'_>> for FieldValue {
    fn from(builder: &mut NodeBuilder<'_>) -> Self {
        builder.build().into()
    }
}
