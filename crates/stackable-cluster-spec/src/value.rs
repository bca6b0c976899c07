//! Leaf values stored in a [`SpecNode`] and the schema types they are checked against.
//!
//! A [`FieldValue`] is what a field currently holds, a [`ValueKind`] is what the
//! [`SchemaRegistry`](crate::schema::SchemaRegistry) declares it may hold. Both are kept
//! small: everything schema-shaped is a [`SpecNode`], everything free-form
//! is a [`FieldValue::Object`].
use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use serde::{Serialize, Serializer, ser::SerializeMap};
use snafu::{Snafu, ensure};

use crate::node::SpecNode;

#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(display("failed to parse {input:?} as value kind"))]
pub struct ParseValueKindError {
    input: String,
}

/// The declared type of a field.
///
/// The textual form is used in schema definitions:
///
/// | Text            | Kind                        |
/// |-----------------|-----------------------------|
/// | `bool`          | [`ValueKind::Bool`]         |
/// | `int`           | [`ValueKind::Int`]          |
/// | `float`         | [`ValueKind::Float`]        |
/// | `string`        | [`ValueKind::Str`]          |
/// | `int-or-string` | [`ValueKind::IntOrString`]  |
/// | `any`           | [`ValueKind::Any`]          |
/// | `Volume`        | [`ValueKind::Node`]         |
/// | `[T]`           | [`ValueKind::List`]         |
/// | `{T}`           | [`ValueKind::Map`]          |
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,

    /// Mirrors the Kubernetes `IntOrString` type, also used for quantities.
    IntOrString,

    /// Free-form JSON. Accepts anything except schema nodes.
    Any,

    /// A nested schema object of the named kind.
    Node(String),

    /// A homogeneous list.
    List(Box<ValueKind>),

    /// A string-keyed map with homogeneous values (labels, resource requests, ...).
    Map(Box<ValueKind>),
}

impl FromStr for ValueKind {
    type Err = ParseValueKindError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();

        let kind = match trimmed {
            "bool" | "boolean" => Self::Bool,
            "int" | "integer" => Self::Int,
            "float" | "number" => Self::Float,
            "string" => Self::Str,
            "int-or-string" => Self::IntOrString,
            "any" => Self::Any,
            _ => {
                if let Some(inner) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                    Self::List(Box::new(inner.parse()?))
                } else if let Some(inner) =
                    trimmed.strip_prefix('{').and_then(|s| s.strip_suffix('}'))
                {
                    Self::Map(Box::new(inner.parse()?))
                } else {
                    ensure!(
                        trimmed.starts_with(|c: char| c.is_ascii_uppercase())
                            && trimmed.chars().all(|c| c.is_ascii_alphanumeric()),
                        ParseValueKindSnafu { input }
                    );
                    Self::Node(trimmed.to_owned())
                }
            }
        };

        Ok(kind)
    }
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Str => f.write_str("string"),
            Self::IntOrString => f.write_str("int-or-string"),
            Self::Any => f.write_str("any"),
            Self::Node(kind) => f.write_str(kind),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::Map(inner) => write!(f, "{{{inner}}}"),
        }
    }
}

impl ValueKind {
    /// Returns `true` if `value` conforms to this kind.
    ///
    /// [`FieldValue::Null`] is never accepted here (except inside [`ValueKind::Any`]),
    /// nullability is a property of the field and not of its type.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Self::Bool, FieldValue::Bool(_))
            | (Self::Int, FieldValue::Int(_))
            | (Self::Float, FieldValue::Float(_))
            | (Self::Str, FieldValue::Str(_))
            | (Self::IntOrString, FieldValue::Int(_) | FieldValue::Str(_)) => true,
            (Self::Any, value) => value.is_free_form(),
            (Self::Node(kind), FieldValue::Node(node)) => node.kind() == kind,
            (Self::List(inner), FieldValue::List(items)) => {
                items.iter().all(|item| inner.accepts(item))
            }
            (Self::Map(inner), FieldValue::Object(entries)) => {
                entries.values().all(|entry| inner.accepts(entry))
            }
            _ => false,
        }
    }

    /// Widens integers to floats where a float is declared. Everything else is returned
    /// unchanged.
    pub fn coerce(&self, value: FieldValue) -> FieldValue {
        match (self, value) {
            (Self::Float, FieldValue::Int(int)) => FieldValue::Float(int as f64),
            (Self::List(inner), FieldValue::List(items)) => {
                FieldValue::List(items.into_iter().map(|item| inner.coerce(item)).collect())
            }
            (Self::Map(inner), FieldValue::Object(entries)) => FieldValue::Object(
                entries
                    .into_iter()
                    .map(|(key, entry)| (key, inner.coerce(entry)))
                    .collect(),
            ),
            (_, value) => value,
        }
    }

    /// The node kind this type refers to, looking through lists and maps.
    pub fn referenced_kind(&self) -> Option<&str> {
        match self {
            Self::Node(kind) => Some(kind),
            Self::List(inner) | Self::Map(inner) => inner.referenced_kind(),
            _ => None,
        }
    }
}

/// The value held by a field.
///
/// An unset field has no `FieldValue` at all, which is different from holding
/// [`FieldValue::Null`].
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<FieldValue>),

    /// Free-form object, ordered by key.
    Object(BTreeMap<String, FieldValue>),

    /// A nested schema object.
    Node(Box<SpecNode>),
}

impl FieldValue {
    /// Short description of the variant, used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(_) => "bool".to_owned(),
            Self::Int(_) => "int".to_owned(),
            Self::Float(_) => "float".to_owned(),
            Self::Str(_) => "string".to_owned(),
            Self::List(_) => "list".to_owned(),
            Self::Object(_) => "object".to_owned(),
            Self::Node(node) => format!("node {}", node.kind()),
        }
    }

    /// Returns `true` if this value (recursively) contains no schema nodes.
    pub fn is_free_form(&self) -> bool {
        match self {
            Self::Node(_) => false,
            Self::List(items) => items.iter().all(Self::is_free_form),
            Self::Object(entries) => entries.values().all(Self::is_free_form),
            _ => true,
        }
    }

    /// Converts arbitrary JSON into a free-form value.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(*value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(int) => Self::Int(int),
                None => Self::Float(number.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(value) => Self::Str(value.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(entries) => Self::Object(
                entries
                    .iter()
                    .map(|(key, entry)| (key.clone(), Self::from_json(entry)))
                    .collect(),
            ),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            Self::Object(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&SpecNode> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut SpecNode> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::Str(value) => serializer.serialize_str(value),
            Self::List(items) => serializer.collect_seq(items),
            Self::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, entry) in entries {
                    map.serialize_entry(key, entry)?;
                }
                map.end()
            }
            Self::Node(node) => node.serialize(serializer),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<SpecNode> for FieldValue {
    fn from(value: SpecNode) -> Self {
        Self::Node(Box::new(value))
    }
}

impl<T: Into<Self>> From<Vec<T>> for FieldValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<BTreeMap<String, T>> for FieldValue {
    fn from(value: BTreeMap<String, T>) -> Self {
        Self::Object(
            value
                .into_iter()
                .map(|(key, entry)| (key, entry.into()))
                .collect(),
        )
    }
}
