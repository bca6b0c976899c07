//! The [`SchemaRegistry`] maps `(kind, field)` pairs to field metadata.
//!
//! A registry is loaded once from [`SchemaDefinitions`] and never mutated afterwards, so
//! a single instance can be shared by any number of concurrent builders, validators and
//! codecs. [`SchemaRegistry::embedded`] returns the process-wide registry built from the
//! definitions compiled into this crate.
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, LazyLock},
};

use convert_case::{Case, Casing};
use indexmap::IndexMap;
use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::{
    node::SpecNode,
    value::{ParseValueKindError, ValueKind},
};

mod definition;

pub use definition::{
    Error as DefinitionsError, FieldDefinition, KindDefinition, OneOfGroupDefinition,
    SchemaDefinitions,
};

const EMBEDDED_CORE_DEFINITIONS: &str = include_str!("../../schemas/core.yaml");
const EMBEDDED_CLUSTER_DEFINITIONS: &str = include_str!("../../schemas/clusters.yaml");

static EMBEDDED_REGISTRY: LazyLock<SchemaRegistry> = LazyLock::new(|| {
    SchemaRegistry::load(embedded_definitions().expect("embedded schema definitions must parse"))
        .expect("embedded schema definitions must be consistent")
});

/// Returns the definitions compiled into this crate: the Kubernetes core types used by
/// pod templates followed by the `DaskCluster`, `RayCluster` and `SparkCluster` specs.
pub fn embedded_definitions() -> Result<SchemaDefinitions, DefinitionsError> {
    let core = SchemaDefinitions::from_yaml_str(EMBEDDED_CORE_DEFINITIONS)?;
    let clusters = SchemaDefinitions::from_yaml_str(EMBEDDED_CLUSTER_DEFINITIONS)?;

    Ok(core.into_iter().chain(clusters).collect())
}

/// Errors raised while building a [`SchemaRegistry`]. These are fatal at start-up.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum SchemaError {
    #[snafu(display(
        "field {kind}.{field} is declared with conflicting wire names {existing:?} and {conflicting:?}"
    ))]
    ConflictingWireName {
        kind: String,
        field: String,
        existing: String,
        conflicting: String,
    },

    #[snafu(display(
        "field {kind}.{field} is declared with conflicting types {existing} and {conflicting}"
    ))]
    ConflictingValueKind {
        kind: String,
        field: String,
        existing: ValueKind,
        conflicting: ValueKind,
    },

    #[snafu(display("field {kind}.{field} is declared twice with different attributes"))]
    ConflictingField { kind: String, field: String },

    #[snafu(display("one-of group {kind}.{group} is declared twice with different attributes"))]
    ConflictingOneOfGroup { kind: String, group: String },

    #[snafu(display("fields {kind}.{first} and {kind}.{second} share the wire name {wire_name:?}"))]
    DuplicateWireName {
        kind: String,
        wire_name: String,
        first: String,
        second: String,
    },

    #[snafu(display("failed to parse the type of field {kind}.{field}"))]
    InvalidValueKind {
        source: ParseValueKindError,
        kind: String,
        field: String,
    },

    #[snafu(display("field {kind}.{field} references undeclared kind {referenced:?}"))]
    UnknownReferencedKind {
        kind: String,
        field: String,
        referenced: String,
    },

    #[snafu(display("kind {kind} inlines undeclared kind {inlined:?}"))]
    UnknownInlinedKind { kind: String, inlined: String },

    #[snafu(display("kind {kind} inlines itself through {chain:?}"))]
    InlineCycle { kind: String, chain: Vec<String> },

    #[snafu(display("field {kind}.{field} is a member of undeclared one-of group {group:?}"))]
    UnknownOneOfGroup {
        kind: String,
        field: String,
        group: String,
    },

    #[snafu(display("field {kind}.{field} cannot be both required and a member of a one-of group"))]
    RequiredOneOfMember { kind: String, field: String },

    #[snafu(display("one-of group {kind}.{group} has no members"))]
    EmptyOneOfGroup { kind: String, group: String },
}

/// Returned when a caller references a kind or field the registry does not know about.
///
/// This is what separates a legitimately absent optional field from a typo in a field
/// name.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum UnknownFieldError {
    #[snafu(display("kind {kind:?} is not declared in the schema registry"))]
    UnknownKind { kind: String },

    #[snafu(display("kind {kind:?} declares no field {field:?}"))]
    UnknownField { kind: String, field: String },

    #[snafu(display("kind {kind:?} declares no one-of group {group:?}"))]
    UnknownGroup { kind: String, group: String },
}

/// Metadata of one field of a kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    /// The logical (snake_case) name.
    pub name: String,

    /// The JSON key used on the wire.
    pub wire_name: String,

    pub value_kind: ValueKind,
    pub required: bool,

    /// Whether an explicit `null` is allowed.
    pub nullable: bool,

    pub one_of_group: Option<String>,
}

/// A set of mutually exclusive fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OneOfGroup {
    pub name: String,

    /// If `true` exactly one member must be set, otherwise at most one.
    pub required: bool,
}

/// All metadata of one kind, with fields in declaration order.
#[derive(Debug, PartialEq, Eq)]
pub struct KindSchema {
    kind: String,
    fields: IndexMap<String, Arc<FieldSpec>>,
    wire_names: HashMap<String, String>,
    one_of_groups: IndexMap<String, OneOfGroup>,
}

impl KindSchema {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Arc<FieldSpec>> {
        self.fields.values()
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldSpec>> {
        self.fields.get(name)
    }

    pub fn field_by_wire_name(&self, wire_name: &str) -> Option<&Arc<FieldSpec>> {
        self.wire_names
            .get(wire_name)
            .and_then(|name| self.fields.get(name))
    }

    /// One-of groups in declaration order.
    pub fn one_of_groups(&self) -> impl Iterator<Item = &OneOfGroup> {
        self.one_of_groups.values()
    }

    pub fn one_of_group(&self, group: &str) -> Option<&OneOfGroup> {
        self.one_of_groups.get(group)
    }

    /// Logical names of all members of `group`, in declaration order.
    pub fn one_of_members(&self, group: &str) -> Vec<&str> {
        self.fields
            .values()
            .filter(|field| field.one_of_group.as_deref() == Some(group))
            .map(|field| field.name.as_str())
            .collect()
    }
}

/// Process-wide table of schema metadata, immutable once loaded.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SchemaRegistry {
    kinds: BTreeMap<String, Arc<KindSchema>>,
}

/// A kind while definitions are still being merged.
#[derive(Default)]
struct PendingKind {
    inline: Vec<String>,
    one_of_groups: IndexMap<String, OneOfGroup>,
    fields: IndexMap<String, FieldSpec>,
}

impl SchemaRegistry {
    /// The registry built from [`embedded_definitions`].
    pub fn embedded() -> &'static Self {
        &EMBEDDED_REGISTRY
    }

    /// Builds a registry from `definitions`.
    ///
    /// The same kind may be declared by multiple definitions; the fields are merged. Identical
    /// re-declarations of a field are accepted, re-declarations which disagree on the wire
    /// name, the type or any other attribute are rejected.
    pub fn load(
        definitions: impl IntoIterator<Item = KindDefinition>,
    ) -> Result<Self, SchemaError> {
        let mut pending = IndexMap::<String, PendingKind>::new();

        for definition in definitions {
            let kind_name = definition.kind;
            let kind = pending.entry(kind_name.clone()).or_default();

            for inlined in definition.inline {
                if !kind.inline.contains(&inlined) {
                    kind.inline.push(inlined);
                }
            }

            for group in definition.one_of_groups {
                let group = OneOfGroup {
                    name: group.name,
                    required: group.required,
                };
                merge_group(&kind_name, &mut kind.one_of_groups, group)?;
            }

            for field in definition.fields {
                let field = field_spec(&kind_name, field)?;
                merge_field(&kind_name, &mut kind.fields, field)?;
            }
        }

        let mut kinds = BTreeMap::new();
        for kind_name in pending.keys() {
            let (one_of_groups, fields) = resolve_inline(&pending, kind_name, &mut Vec::new())?;
            let schema = finish_kind(&pending, kind_name, one_of_groups, fields)?;
            kinds.insert(kind_name.clone(), Arc::new(schema));
        }

        tracing::debug!(kinds = kinds.len(), "loaded schema registry");
        Ok(Self { kinds })
    }

    /// Builds a registry from the embedded definitions followed by `extra` definitions.
    ///
    /// This is how a client is taught about fields added by newer versions of the custom
    /// resources without being rebuilt.
    pub fn embedded_with(
        extra: impl IntoIterator<Item = KindDefinition>,
    ) -> Result<Self, EmbeddedWithError> {
        let embedded = embedded_definitions().context(embedded_with_error::EmbeddedSnafu)?;
        Self::load(embedded.into_iter().chain(extra)).context(embedded_with_error::LoadSnafu)
    }

    pub fn kind(&self, kind: &str) -> Result<&Arc<KindSchema>, UnknownFieldError> {
        self.kinds.get(kind).context(UnknownKindSnafu { kind })
    }

    /// Names of all declared kinds, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    /// Looks up a field by its logical name.
    pub fn lookup(&self, kind: &str, field: &str) -> Result<&FieldSpec, UnknownFieldError> {
        self.kind(kind)?
            .field(field)
            .map(|field| &**field)
            .context(UnknownFieldSnafu { kind, field })
    }

    /// Looks up a field by its wire name.
    pub fn lookup_wire(
        &self,
        kind: &str,
        wire_name: &str,
    ) -> Result<&FieldSpec, UnknownFieldError> {
        self.kind(kind)?
            .field_by_wire_name(wire_name)
            .map(|field| &**field)
            .context(UnknownFieldSnafu {
                kind,
                field: wire_name,
            })
    }

    pub fn one_of_group(&self, kind: &str, group: &str) -> Result<&OneOfGroup, UnknownFieldError> {
        self.kind(kind)?
            .one_of_group(group)
            .context(UnknownGroupSnafu { kind, group })
    }

    /// Logical names of all fields in `group`, in declaration order.
    pub fn one_of_members(&self, kind: &str, group: &str) -> Result<Vec<&str>, UnknownFieldError> {
        let schema = self.kind(kind)?;
        ensure!(
            schema.one_of_group(group).is_some(),
            UnknownGroupSnafu { kind, group }
        );
        Ok(schema.one_of_members(group))
    }

    /// Creates an empty node of `kind`, with every field unset.
    pub fn new_node(&self, kind: &str) -> Result<SpecNode, UnknownFieldError> {
        self.kind(kind).map(|schema| SpecNode::new(Arc::clone(schema)))
    }
}

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum EmbeddedWithError {
    #[snafu(display("failed to parse the embedded schema definitions"))]
    Embedded { source: DefinitionsError },

    #[snafu(display("failed to load schema definitions"))]
    Load { source: SchemaError },
}

fn field_spec(kind: &str, field: FieldDefinition) -> Result<FieldSpec, SchemaError> {
    let value_kind = field.type_.parse().context(InvalidValueKindSnafu {
        kind,
        field: &field.name,
    })?;
    let wire_name = field
        .wire_name
        .unwrap_or_else(|| field.name.to_case(Case::Camel));

    Ok(FieldSpec {
        nullable: field.nullable.unwrap_or(!field.required),
        name: field.name,
        wire_name,
        value_kind,
        required: field.required,
        one_of_group: field.one_of,
    })
}

fn merge_field(
    kind: &str,
    fields: &mut IndexMap<String, FieldSpec>,
    field: FieldSpec,
) -> Result<(), SchemaError> {
    match fields.get(&field.name) {
        Some(existing) => {
            ensure!(
                existing.wire_name == field.wire_name,
                ConflictingWireNameSnafu {
                    kind,
                    field: &field.name,
                    existing: &existing.wire_name,
                    conflicting: &field.wire_name,
                }
            );
            ensure!(
                existing.value_kind == field.value_kind,
                ConflictingValueKindSnafu {
                    kind,
                    field: &field.name,
                    existing: existing.value_kind.clone(),
                    conflicting: field.value_kind.clone(),
                }
            );
            ensure!(
                *existing == field,
                ConflictingFieldSnafu {
                    kind,
                    field: &field.name
                }
            );
        }
        None => {
            fields.insert(field.name.clone(), field);
        }
    }

    Ok(())
}

fn merge_group(
    kind: &str,
    groups: &mut IndexMap<String, OneOfGroup>,
    group: OneOfGroup,
) -> Result<(), SchemaError> {
    match groups.get(&group.name) {
        Some(existing) => ensure!(
            *existing == group,
            ConflictingOneOfGroupSnafu {
                kind,
                group: &group.name
            }
        ),
        None => {
            groups.insert(group.name.clone(), group);
        }
    }

    Ok(())
}

/// Collects the groups and fields of `kind`, with inlined kinds' entries first.
fn resolve_inline(
    pending: &IndexMap<String, PendingKind>,
    kind: &str,
    chain: &mut Vec<String>,
) -> Result<(IndexMap<String, OneOfGroup>, IndexMap<String, FieldSpec>), SchemaError> {
    ensure!(
        !chain.iter().any(|seen| seen == kind),
        InlineCycleSnafu {
            kind,
            chain: chain.clone()
        }
    );

    let Some(definition) = pending.get(kind) else {
        // Callers check existence before recursing, so this is the root lookup only.
        return Ok((IndexMap::new(), IndexMap::new()));
    };

    chain.push(kind.to_owned());

    let mut groups = IndexMap::new();
    let mut fields = IndexMap::new();

    for inlined in &definition.inline {
        ensure!(
            pending.contains_key(inlined),
            UnknownInlinedKindSnafu { kind, inlined }
        );

        let (inlined_groups, inlined_fields) = resolve_inline(pending, inlined, chain)?;
        for group in inlined_groups.into_values() {
            merge_group(kind, &mut groups, group)?;
        }
        for field in inlined_fields.into_values() {
            merge_field(kind, &mut fields, field)?;
        }
    }

    for group in definition.one_of_groups.values() {
        merge_group(kind, &mut groups, group.clone())?;
    }
    for field in definition.fields.values() {
        merge_field(kind, &mut fields, field.clone())?;
    }

    chain.pop();
    Ok((groups, fields))
}

/// Checks the cross-field invariants of a fully resolved kind.
fn finish_kind(
    pending: &IndexMap<String, PendingKind>,
    kind: &str,
    one_of_groups: IndexMap<String, OneOfGroup>,
    fields: IndexMap<String, FieldSpec>,
) -> Result<KindSchema, SchemaError> {
    let mut wire_names = HashMap::<String, String>::new();
    let mut populated_groups = HashSet::new();

    for field in fields.values() {
        if let Some(first) = wire_names.get(&field.wire_name) {
            return DuplicateWireNameSnafu {
                kind,
                wire_name: &field.wire_name,
                first,
                second: &field.name,
            }
            .fail();
        }
        wire_names.insert(field.wire_name.clone(), field.name.clone());

        if let Some(referenced) = field.value_kind.referenced_kind() {
            ensure!(
                pending.contains_key(referenced),
                UnknownReferencedKindSnafu {
                    kind,
                    field: &field.name,
                    referenced
                }
            );
        }

        if let Some(group) = &field.one_of_group {
            ensure!(
                one_of_groups.contains_key(group),
                UnknownOneOfGroupSnafu {
                    kind,
                    field: &field.name,
                    group
                }
            );
            ensure!(
                !field.required,
                RequiredOneOfMemberSnafu {
                    kind,
                    field: &field.name
                }
            );
            populated_groups.insert(group.as_str());
        }
    }

    if let Some(group) = one_of_groups
        .keys()
        .find(|group| !populated_groups.contains(group.as_str()))
    {
        return EmptyOneOfGroupSnafu { kind, group }.fail();
    }

    Ok(KindSchema {
        kind: kind.to_owned(),
        fields: fields
            .into_iter()
            .map(|(name, field)| (name, Arc::new(field)))
            .collect(),
        wire_names,
        one_of_groups,
    })
}
