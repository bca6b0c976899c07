//! Canonical JSON encoding of [`SpecNode`] trees.
//!
//! Encoding emits keys in schema declaration order under their wire names, skips unset
//! fields and re-emits unknown fields verbatim after the known ones. Decoding checks the
//! JSON type of every known key against the schema. Unknown keys are kept on the node,
//! or rejected in strict mode.
use std::{collections::BTreeMap, sync::Arc};

use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::{
    node::SpecNode,
    path::FieldPath,
    schema::{KindSchema, SchemaRegistry, UnknownFieldError},
    value::{FieldValue, ValueKind},
};

type Result<T, E = DecodeError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum EncodeError {
    #[snafu(display("failed to serialize {kind} node"))]
    Serialize {
        source: serde_json::Error,
        kind: String,
    },
}

#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("{path}: malformed JSON at line {line} column {column}"))]
    MalformedJson {
        source: serde_json::Error,
        path: FieldPath,
        line: usize,
        column: usize,
    },

    #[snafu(display("failed to resolve the schema of {path}"))]
    UnknownKind {
        source: UnknownFieldError,
        path: FieldPath,
    },

    #[snafu(display("{path}: expected {expected}, found {found}"))]
    UnexpectedType {
        path: FieldPath,
        expected: ValueKind,
        found: &'static str,
    },

    #[snafu(display("{path}: null is not allowed here"))]
    UnexpectedNull { path: FieldPath },

    #[snafu(display("{path}: kind {kind} declares no field with wire name {wire_name:?}"))]
    UnknownField {
        path: FieldPath,
        kind: String,
        wire_name: String,
    },
}

impl DecodeError {
    /// The location of the error. Documents that cannot be parsed at all report the root.
    pub fn path(&self) -> &FieldPath {
        match self {
            Self::MalformedJson { path, .. }
            | Self::UnknownKind { path, .. }
            | Self::UnexpectedType { path, .. }
            | Self::UnexpectedNull { path }
            | Self::UnknownField { path, .. } => path,
        }
    }
}

/// Converts between [`SpecNode`] trees and their JSON wire form.
#[derive(Clone, Copy, Debug)]
pub struct Codec<'r> {
    registry: &'r SchemaRegistry,
    strict: bool,
}

impl<'r> Codec<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            strict: false,
        }
    }

    /// In strict mode unknown keys fail decoding instead of being preserved.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn registry(&self) -> &'r SchemaRegistry {
        self.registry
    }

    pub fn encode(&self, node: &SpecNode) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec(node).context(SerializeSnafu { kind: node.kind() })
    }

    pub fn encode_pretty(&self, node: &SpecNode) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec_pretty(node).context(SerializeSnafu { kind: node.kind() })
    }

    pub fn encode_value(&self, node: &SpecNode) -> Result<serde_json::Value, EncodeError> {
        serde_json::to_value(node).context(SerializeSnafu { kind: node.kind() })
    }

    /// Request body for the API collaborator.
    pub fn to_request_body(&self, node: &SpecNode) -> Result<Vec<u8>, EncodeError> {
        self.encode(node)
    }

    pub fn decode(&self, bytes: &[u8], kind: &str) -> Result<SpecNode> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|source| DecodeError::MalformedJson {
                path: FieldPath::new(),
                line: source.line(),
                column: source.column(),
                source,
            })?;
        self.decode_value(&value, kind)
    }

    /// Decodes a response body returned by the API collaborator.
    pub fn from_response_body(&self, bytes: &[u8], kind: &str) -> Result<SpecNode> {
        self.decode(bytes, kind)
    }

    pub fn decode_value(&self, value: &serde_json::Value, kind: &str) -> Result<SpecNode> {
        self.decode_value_at(value, kind, &FieldPath::new())
    }

    /// Decodes `value` as a node of `kind` located at `path`. The path only affects
    /// error reporting.
    pub fn decode_value_at(
        &self,
        value: &serde_json::Value,
        kind: &str,
        path: &FieldPath,
    ) -> Result<SpecNode> {
        let schema = self.registry.kind(kind).context(UnknownKindSnafu { path: path.clone() })?;
        self.decode_node(schema, value, path)
    }

    fn decode_node(
        &self,
        schema: &Arc<KindSchema>,
        value: &serde_json::Value,
        path: &FieldPath,
    ) -> Result<SpecNode> {
        let object = value.as_object().context(UnexpectedTypeSnafu {
            path: path.clone(),
            expected: ValueKind::Node(schema.kind().to_owned()),
            found: json_type(value),
        })?;

        let mut node = SpecNode::new(Arc::clone(schema));
        for (key, entry) in object {
            let field_path = path.child(key);

            let Some(field) = schema.field_by_wire_name(key) else {
                ensure!(!self.strict, UnknownFieldSnafu {
                    path: field_path,
                    kind: schema.kind(),
                    wire_name: key,
                });

                tracing::debug!(
                    kind = schema.kind(),
                    path = %field_path,
                    "preserving unknown field"
                );
                node.set_unknown_value(key.clone(), entry.clone());
                continue;
            };

            let value = if entry.is_null() {
                ensure!(field.nullable, UnexpectedNullSnafu { path: field_path });
                FieldValue::Null
            } else {
                self.decode_field(&field.value_kind, entry, &field_path)?
            };
            node.set_slot_value(&field.name, value);
        }

        Ok(node)
    }

    fn decode_field(
        &self,
        value_kind: &ValueKind,
        value: &serde_json::Value,
        path: &FieldPath,
    ) -> Result<FieldValue> {
        let decoded = match value_kind {
            ValueKind::Bool => value.as_bool().map(FieldValue::Bool),
            ValueKind::Int => value.as_i64().map(FieldValue::Int),
            ValueKind::Float => value.as_f64().map(FieldValue::Float),
            ValueKind::Str => value.as_str().map(FieldValue::from),
            ValueKind::IntOrString => value
                .as_i64()
                .map(FieldValue::Int)
                .or_else(|| value.as_str().map(FieldValue::from)),
            ValueKind::Any => Some(FieldValue::from_json(value)),
            ValueKind::Node(kind) => {
                let schema = self.registry.kind(kind).context(UnknownKindSnafu { path: path.clone() })?;
                return self.decode_node(schema, value, path).map(FieldValue::from);
            }
            ValueKind::List(inner) => match value.as_array() {
                Some(items) => {
                    let items = items
                        .iter()
                        .enumerate()
                        .map(|(index, item)| self.decode_element(inner, item, &path.index(index)))
                        .collect::<Result<Vec<_>>>()?;
                    Some(FieldValue::List(items))
                }
                None => None,
            },
            ValueKind::Map(inner) => match value.as_object() {
                Some(entries) => {
                    let entries = entries
                        .iter()
                        .map(|(key, entry)| {
                            self.decode_element(inner, entry, &path.key(key))
                                .map(|entry| (key.clone(), entry))
                        })
                        .collect::<Result<BTreeMap<_, _>>>()?;
                    Some(FieldValue::Object(entries))
                }
                None => None,
            },
        };

        decoded.context(UnexpectedTypeSnafu {
            path: path.clone(),
            expected: value_kind.clone(),
            found: json_type(value),
        })
    }

    /// Decodes a list element or map value. Those are never nullable unless free-form.
    fn decode_element(
        &self,
        value_kind: &ValueKind,
        value: &serde_json::Value,
        path: &FieldPath,
    ) -> Result<FieldValue> {
        ensure!(
            !value.is_null() || *value_kind == ValueKind::Any,
            UnexpectedNullSnafu { path: path.clone() }
        );
        self.decode_field(value_kind, value, path)
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    fn codec() -> Codec<'static> {
        Codec::new(SchemaRegistry::embedded())
    }

    #[test]
    fn decode_and_encode_nested_tree() {
        let input = indoc! {r#"
            {
              "name": "app",
              "image": "example/app:1.0",
              "env": [{"name": "A", "value": "1"}],
              "livenessProbe": {"httpGet": {"port": "http", "path": "/health"}, "periodSeconds": 10},
              "resources": {"requests": {"cpu": "500m", "memory": 1073741824}}
            }
        "#};

        let node = codec()
            .decode(input.as_bytes(), "Container")
            .expect("valid container");

        assert_eq!(node.get_str("name"), Some("app"));
        let probe = node.get_node("liveness_probe").expect("probe is set");
        assert_eq!(probe.get_int("period_seconds"), Some(10));
        assert_eq!(
            probe
                .get_node("http_get")
                .and_then(|action| action.get("port")),
            Some(&FieldValue::from("http"))
        );

        // Keys come out in declaration order, map entries sorted by key.
        assert_eq!(
            String::from_utf8(codec().encode(&node).expect("encodable")).expect("UTF-8"),
            concat!(
                r#"{"env":[{"name":"A","value":"1"}],"image":"example/app:1.0","#,
                r#""livenessProbe":{"httpGet":{"path":"/health","port":"http"},"periodSeconds":10},"#,
                r#""name":"app","resources":{"requests":{"cpu":"500m","memory":1073741824}}}"#
            )
        );
    }

    #[rstest]
    #[case::not_json(b"{", "MalformedJson")]
    #[case::not_an_object(b"[]", "UnexpectedType")]
    #[case::wrong_leaf_type(br#"{"path": 42}"#, "UnexpectedType")]
    #[case::null_on_required(br#"{"path": null}"#, "UnexpectedNull")]
    fn decode_failures(#[case] input: &[u8], #[case] variant: &str) {
        let error = codec()
            .decode(input, "HostPathVolumeSource")
            .expect_err("invalid document");

        let actual = match error {
            DecodeError::MalformedJson { .. } => "MalformedJson",
            DecodeError::UnknownKind { .. } => "UnknownKind",
            DecodeError::UnexpectedType { .. } => "UnexpectedType",
            DecodeError::UnexpectedNull { .. } => "UnexpectedNull",
            DecodeError::UnknownField { .. } => "UnknownField",
        };
        assert_eq!(actual, variant);
    }

    #[test]
    fn decode_errors_carry_paths() {
        let input = br#"{"volumes": [{"name": "a", "secret": {"items": [{"key": "k", "path": "p", "mode": "0644"}]}}]}"#;

        let error = codec()
            .decode(input, "WorkloadConfig")
            .expect_err("mode must be an integer");

        assert_eq!(
            error.path().to_string(),
            "volumes[0].secret.items[0].mode"
        );
    }

    #[test]
    fn malformed_json_reports_position_at_root() {
        let input = b"{\n  \"path\": \"/x\",\n  oops\n}";

        let error = codec()
            .decode(input, "HostPathVolumeSource")
            .expect_err("not JSON");

        let DecodeError::MalformedJson { line, column, .. } = &error else {
            unreachable!("expected MalformedJson, got {error:?}");
        };
        assert_eq!((*line, *column), (3, 3));
        assert!(error.path().is_root());
        assert_eq!(
            error.to_string(),
            "<root>: malformed JSON at line 3 column 3"
        );
    }

    #[test]
    fn null_list_elements_are_rejected() {
        let input = br#"{"command": ["sh", null]}"#;

        let error = codec()
            .decode(input, "ExecAction")
            .expect_err("null element");

        assert!(matches!(error, DecodeError::UnexpectedNull { .. }));
        assert_eq!(
            error.path().to_string(),
            "command[1]"
        );
    }

    #[test]
    fn unknown_fields_are_preserved_in_order() {
        let input = br#"{"zeta":1,"path":"/x","alpha":{"nested":true}}"#;

        let node = codec()
            .decode(input, "HostPathVolumeSource")
            .expect("valid document");

        assert_eq!(
            node.unknown_fields().keys().collect::<Vec<_>>(),
            ["zeta", "alpha"]
        );
        assert_eq!(
            codec().encode(&node).expect("encodable"),
            br#"{"path":"/x","zeta":1,"alpha":{"nested":true}}"#
        );
    }

    #[test]
    fn strict_mode_rejects_unknown_fields() {
        let input = br#"{"path":"/x","futureField":42}"#;

        let error = codec()
            .strict(true)
            .decode(input, "HostPathVolumeSource")
            .expect_err("unknown field");

        assert!(matches!(
            error,
            DecodeError::UnknownField { ref wire_name, .. } if wire_name == "futureField"
        ));
    }

    #[test]
    fn float_fields_accept_integers() {
        let registry = SchemaRegistry::load(
            crate::schema::SchemaDefinitions::from_yaml_str(indoc! {"
                - kind: Weighted
                  fields:
                    - { name: weight, type: float }
            "})
            .expect("valid definitions"),
        )
        .expect("valid registry");

        let node = Codec::new(&registry)
            .decode(br#"{"weight": 2}"#, "Weighted")
            .expect("valid document");

        assert_eq!(node.get("weight"), Some(&FieldValue::Float(2.0)));
    }

    #[test]
    fn unknown_kind() {
        assert!(matches!(
            codec().decode(b"{}", "Pod"),
            Err(DecodeError::UnknownKind { .. })
        ));
    }

    #[test]
    fn response_body_round_trip() {
        let input = br#"{"fsGroup":2000,"runAsNonRoot":true,"supplementalGroups":[1,2]}"#;

        let node = codec()
            .from_response_body(input, "PodSecurityContext")
            .expect("valid document");

        assert_eq!(
            codec().to_request_body(&node).expect("encodable"),
            input.to_vec()
        );
    }
}
