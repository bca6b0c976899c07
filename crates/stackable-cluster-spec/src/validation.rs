//! Structural validation of [`SpecNode`] trees.
//!
//! The [`Validator`] checks what the schema declares (required fields, one-of groups,
//! declared types) and never stops at the first problem: every error in the tree is
//! collected. Semantic rules of the cluster kinds live in [`crate::cluster`] and report
//! through the same [`ValidationError`] type.
use std::fmt::Display;

use snafu::Snafu;

use crate::{
    node::SpecNode,
    path::FieldPath,
    schema::SchemaRegistry,
    value::{FieldValue, ValueKind},
};

/// A single validation error. Every variant carries the wire path of the offending value.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
pub enum ValidationError {
    #[snafu(display("{path}: required field {kind}.{field} is missing"))]
    MissingRequiredField {
        path: FieldPath,
        kind: String,
        field: String,
    },

    #[snafu(display("{path}: fields {members:?} of one-of group {kind}.{group} are mutually exclusive"))]
    ConflictingOneOf {
        path: FieldPath,
        kind: String,
        group: String,
        members: Vec<String>,
    },

    #[snafu(display("{path}: exactly one of {members:?} (one-of group {kind}.{group}) must be set"))]
    MissingOneOf {
        path: FieldPath,
        kind: String,
        group: String,
        members: Vec<String>,
    },

    #[snafu(display("{path}: field {kind}.{field} expects {expected}, got {found}"))]
    TypeMismatch {
        path: FieldPath,
        kind: String,
        field: String,
        expected: ValueKind,
        found: String,
    },

    #[snafu(display("{path}: field {kind}.{field} must not be null"))]
    NullNotAllowed {
        path: FieldPath,
        kind: String,
        field: String,
    },

    #[snafu(display("{path}: kind {kind:?} is not declared in the schema registry"))]
    UnknownKind { path: FieldPath, kind: String },

    #[snafu(display("{path}: Invalid value: {value}: {reason}"))]
    Invalid {
        path: FieldPath,
        value: String,
        reason: String,
    },

    #[snafu(display("{path}: Required value: {reason}"))]
    Required { path: FieldPath, reason: String },

    #[snafu(display("{path}: Duplicate value: {value}"))]
    Duplicate { path: FieldPath, value: String },
}

impl ValidationError {
    pub fn path(&self) -> &FieldPath {
        match self {
            Self::MissingRequiredField { path, .. }
            | Self::ConflictingOneOf { path, .. }
            | Self::MissingOneOf { path, .. }
            | Self::TypeMismatch { path, .. }
            | Self::NullNotAllowed { path, .. }
            | Self::UnknownKind { path, .. }
            | Self::Invalid { path, .. }
            | Self::Required { path, .. }
            | Self::Duplicate { path, .. } => path,
        }
    }
}

/// A collection of errors discovered during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<ValidationError> {
        self.0
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            let prefix = match i {
                0 => "",
                _ => ", ",
            };
            write!(f, "{prefix}{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }
}

/// Walks a [`SpecNode`] tree depth-first and collects every structural error.
///
/// Each node is checked against the schema it was created with, which must be declared
/// in the validator's registry. Errors are reported in schema declaration order. A one-of
/// group is checked where its first member is declared.
#[derive(Clone, Copy, Debug)]
pub struct Validator<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Validates `node` as a document root. An empty result means the tree is valid.
    pub fn validate(&self, node: &SpecNode) -> Vec<ValidationError> {
        self.validate_at(node, &FieldPath::new())
    }

    /// Validates `node` as if it was located at `path`, e.g. `spec` for the spec of a
    /// custom resource.
    pub fn validate_at(&self, node: &SpecNode, path: &FieldPath) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.walk(node, path, &mut errors);

        tracing::debug!(
            kind = node.kind(),
            error.count = errors.len(),
            "validated spec tree"
        );
        errors
    }

    pub fn ensure_valid(&self, node: &SpecNode) -> Result<(), ValidationErrors> {
        let errors = self.validate(node);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    fn walk(&self, node: &SpecNode, path: &FieldPath, errors: &mut Vec<ValidationError>) {
        let kind = node.kind();
        if self.registry.kind(kind).is_err() {
            errors.push(ValidationError::UnknownKind {
                path: path.clone(),
                kind: kind.to_owned(),
            });
            return;
        }

        // The node may come from a registry with more fields than ours, its own schema
        // covers every slot it holds.
        let schema = node.schema();

        for field in schema.fields() {
            if let Some(group_name) = &field.one_of_group {
                let members = schema.one_of_members(group_name);
                if members.first() == Some(&field.name.as_str()) {
                    let set_members = members
                        .iter()
                        .filter(|member| node.is_set(member))
                        .map(|member| (*member).to_owned())
                        .collect::<Vec<_>>();
                    let required = schema
                        .one_of_group(group_name)
                        .is_some_and(|group| group.required);

                    if set_members.len() > 1 {
                        errors.push(ValidationError::ConflictingOneOf {
                            path: path.clone(),
                            kind: kind.to_owned(),
                            group: group_name.clone(),
                            members: set_members,
                        });
                    } else if required && set_members.is_empty() {
                        errors.push(ValidationError::MissingOneOf {
                            path: path.clone(),
                            kind: kind.to_owned(),
                            group: group_name.clone(),
                            members: members.iter().map(|member| (*member).to_owned()).collect(),
                        });
                    }
                }
            }

            let field_path = path.child(&field.wire_name);
            match node.get(&field.name) {
                None if field.required => errors.push(ValidationError::MissingRequiredField {
                    path: field_path,
                    kind: kind.to_owned(),
                    field: field.name.clone(),
                }),
                None => {}
                Some(FieldValue::Null) => {
                    if !field.nullable {
                        errors.push(ValidationError::NullNotAllowed {
                            path: field_path,
                            kind: kind.to_owned(),
                            field: field.name.clone(),
                        });
                    }
                }
                Some(value) => self.check_value(
                    kind,
                    &field.name,
                    &field.value_kind,
                    value,
                    &field_path,
                    errors,
                ),
            }
        }
    }

    /// Checks `value` against `value_kind`, reporting mismatches at the deepest path
    /// possible, and recurses into nested nodes.
    fn check_value(
        &self,
        kind: &str,
        field: &str,
        value_kind: &ValueKind,
        value: &FieldValue,
        path: &FieldPath,
        errors: &mut Vec<ValidationError>,
    ) {
        match (value_kind, value) {
            (ValueKind::Node(expected), FieldValue::Node(child)) if child.kind() == expected => {
                self.walk(child, path, errors);
            }
            (ValueKind::List(inner), FieldValue::List(items)) => {
                for (index, item) in items.iter().enumerate() {
                    self.check_value(kind, field, inner, item, &path.index(index), errors);
                }
            }
            (ValueKind::Map(inner), FieldValue::Object(entries)) => {
                for (key, entry) in entries {
                    self.check_value(kind, field, inner, entry, &path.key(key), errors);
                }
            }
            (value_kind, value) if value_kind.accepts(value) => {}
            (value_kind, value) => errors.push(ValidationError::TypeMismatch {
                path: path.clone(),
                kind: kind.to_owned(),
                field: field.to_owned(),
                expected: value_kind.clone(),
                found: value.describe(),
            }),
        }
    }
}
