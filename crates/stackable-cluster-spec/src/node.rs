//! The generic in-memory representation of one schema object.
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Serialize, Serializer, ser::SerializeMap};
use snafu::{OptionExt, Snafu, ensure};

use crate::{
    schema::{FieldSpec, KindSchema, UnknownFieldError, UnknownFieldSnafu},
    value::{FieldValue, ValueKind},
};

#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SetError {
    #[snafu(transparent)]
    Unknown { source: UnknownFieldError },

    #[snafu(display("field {kind}.{field} expects {expected}, got {found}"))]
    TypeMismatch {
        kind: String,
        field: String,
        expected: ValueKind,
        found: String,
    },

    #[snafu(display("{kind} declares a field with wire name {wire_name:?}, set it through its slot"))]
    DeclaredWireName { kind: String, wire_name: String },
}

/// One field of a [`SpecNode`]: the schema metadata plus the current value.
///
/// An absent value ([`None`]) is distinct from an explicit [`FieldValue::Null`]; only the
/// latter is emitted on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSlot {
    spec: Arc<FieldSpec>,
    value: Option<FieldValue>,
}

impl FieldSlot {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn wire_name(&self) -> &str {
        &self.spec.wire_name
    }

    pub fn value_kind(&self) -> &ValueKind {
        &self.spec.value_kind
    }

    pub fn required(&self) -> bool {
        self.spec.required
    }

    pub fn nullable(&self) -> bool {
        self.spec.nullable
    }

    pub fn one_of_group(&self) -> Option<&str> {
        self.spec.one_of_group.as_deref()
    }

    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    pub fn value(&self) -> Option<&FieldValue> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

/// One nested schema object, e.g. a `PodSecurityContext`.
///
/// A node owns a slot for every field its kind declares, in declaration order, plus the
/// keys the schema did not know about when the node was decoded. Nodes own their children
/// exclusively, so a tree can never contain cycles.
#[derive(Clone, Debug)]
pub struct SpecNode {
    schema: Arc<KindSchema>,
    slots: IndexMap<String, FieldSlot>,
    unknown_fields: serde_json::Map<String, serde_json::Value>,
}

impl PartialEq for SpecNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
            && self.slots == other.slots
            && self.unknown_fields == other.unknown_fields
    }
}

impl SpecNode {
    pub(crate) fn new(schema: Arc<KindSchema>) -> Self {
        let slots = schema
            .fields()
            .map(|spec| {
                (spec.name.clone(), FieldSlot {
                    spec: Arc::clone(spec),
                    value: None,
                })
            })
            .collect();

        Self {
            schema,
            slots,
            unknown_fields: serde_json::Map::new(),
        }
    }

    pub fn kind(&self) -> &str {
        self.schema.kind()
    }

    pub fn schema(&self) -> &KindSchema {
        &self.schema
    }

    /// All slots, in declaration order.
    pub fn slots(&self) -> impl Iterator<Item = &FieldSlot> {
        self.slots.values()
    }

    pub fn slot(&self, field: &str) -> Result<&FieldSlot, UnknownFieldError> {
        self.slots.get(field).context(UnknownFieldSnafu {
            kind: self.kind(),
            field,
        })
    }

    /// The value of `field`, [`None`] if it is unset or not declared.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.slots.get(field).and_then(FieldSlot::value)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    pub fn get_int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_int)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(FieldValue::as_bool)
    }

    pub fn get_float(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_float)
    }

    pub fn get_node(&self, field: &str) -> Option<&SpecNode> {
        self.get(field).and_then(FieldValue::as_node)
    }

    pub fn get_node_mut(&mut self, field: &str) -> Option<&mut SpecNode> {
        self.slots
            .get_mut(field)
            .and_then(|slot| slot.value.as_mut())
            .and_then(FieldValue::as_node_mut)
    }

    pub fn get_list(&self, field: &str) -> Option<&[FieldValue]> {
        self.get(field).and_then(FieldValue::as_list)
    }

    /// Returns `true` if `field` holds a value, including an explicit `null`.
    pub fn is_set(&self, field: &str) -> bool {
        self.slots.get(field).is_some_and(FieldSlot::is_set)
    }

    /// Sets `field` to `value`, returning the previous value.
    ///
    /// The value is checked against the declared type before it is stored. Integers are
    /// widened for float fields, `null` is only accepted by nullable fields.
    pub fn insert(
        &mut self,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<Option<FieldValue>, SetError> {
        let kind = self.schema.kind().to_owned();
        let slot = self
            .slots
            .get_mut(field)
            .context(UnknownFieldSnafu { kind: &kind, field })?;

        let value = slot.spec.value_kind.coerce(value.into());
        let accepted = match &value {
            FieldValue::Null => slot.spec.nullable,
            value => slot.spec.value_kind.accepts(value),
        };
        ensure!(accepted, TypeMismatchSnafu {
            kind,
            field,
            expected: slot.spec.value_kind.clone(),
            found: value.describe(),
        });

        Ok(slot.value.replace(value))
    }

    /// Clears `field`, returning the previous value.
    pub fn remove(&mut self, field: &str) -> Result<Option<FieldValue>, UnknownFieldError> {
        let kind = self.kind().to_owned();
        let slot = self
            .slots
            .get_mut(field)
            .context(UnknownFieldSnafu { kind, field })?;

        Ok(slot.value.take())
    }

    /// Keys which were present on the wire but are not declared for this kind, in their
    /// original order.
    pub fn unknown_fields(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.unknown_fields
    }

    /// Stores a key this kind does not declare, returning the previous value of `key`.
    ///
    /// Keys matching a declared wire name are rejected, the slot is the only place such a
    /// value can live.
    pub fn insert_unknown(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, SetError> {
        let key = key.into();
        ensure!(
            self.schema.field_by_wire_name(&key).is_none(),
            DeclaredWireNameSnafu {
                kind: self.kind(),
                wire_name: key,
            }
        );

        Ok(self.unknown_fields.insert(key, value))
    }

    pub fn remove_unknown(&mut self, key: &str) -> Option<serde_json::Value> {
        self.unknown_fields.shift_remove(key)
    }

    /// Stores a value without checking it. Used by the decoder, which has already checked
    /// the JSON type against the schema.
    pub(crate) fn set_slot_value(&mut self, field: &str, value: FieldValue) {
        if let Some(slot) = self.slots.get_mut(field) {
            slot.value = Some(value);
        }
    }

    /// Stores an unknown key without checking it. The decoder only passes keys it could not
    /// resolve to a declared field.
    pub(crate) fn set_unknown_value(&mut self, key: String, value: serde_json::Value) {
        self.unknown_fields.insert(key, value);
    }
}

impl Serialize for SpecNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let set_slots = self.slots.values().filter(|slot| slot.is_set());
        let len = set_slots.clone().count() + self.unknown_fields.len();

        let mut map = serializer.serialize_map(Some(len))?;
        for slot in set_slots {
            if let Some(value) = slot.value() {
                map.serialize_entry(slot.wire_name(), value)?;
            }
        }
        for (key, value) in &self.unknown_fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
