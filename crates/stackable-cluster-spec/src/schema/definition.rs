//! The serialized form of schema definitions.
//!
//! Definitions are YAML documents containing a list of kinds:
//!
//! ```yaml
//! - kind: Volume
//!   oneOfGroups:
//!     - name: source
//!       required: true
//!   fields:
//!     - name: name
//!       type: string
//!       required: true
//!     - name: host_path
//!       type: HostPathVolumeSource
//!       oneOf: source
//!     - name: downward_api
//!       type: DownwardAPIVolumeSource
//!       wireName: downwardAPI
//!       oneOf: source
//! ```
//!
//! Field names are logical (snake_case) names. The wire name defaults to the camelCase
//! form of the logical name. Kinds can `inline` the fields of other kinds, mirroring
//! embedded structs of the upstream API types.
use std::{fs, path::Path};

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read schema definitions from {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    #[snafu(display("failed to parse schema definitions"))]
    ParseYaml { source: serde_yaml::Error },
}

/// A list of kind definitions, usually coming from one YAML document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SchemaDefinitions(Vec<KindDefinition>);

impl SchemaDefinitions {
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        serde_yaml::from_str(input).context(ParseYamlSnafu)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::from_yaml_str(&contents)
    }

    pub fn kinds(&self) -> &[KindDefinition] {
        &self.0
    }
}

impl IntoIterator for SchemaDefinitions {
    type IntoIter = std::vec::IntoIter<KindDefinition>;
    type Item = KindDefinition;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<KindDefinition> for SchemaDefinitions {
    fn from_iter<T: IntoIterator<Item = KindDefinition>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KindDefinition {
    pub kind: String,

    /// Kinds whose fields (and one-of groups) are copied in front of [`Self::fields`].
    #[serde(default)]
    pub inline: Vec<String>,

    #[serde(default)]
    pub one_of_groups: Vec<OneOfGroupDefinition>,

    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldDefinition {
    pub name: String,

    /// The textual [`ValueKind`](crate::value::ValueKind).
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default)]
    pub wire_name: Option<String>,

    #[serde(default)]
    pub required: bool,

    /// Defaults to `true` for optional and `false` for required fields.
    #[serde(default)]
    pub nullable: Option<bool>,

    #[serde(default)]
    pub one_of: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OneOfGroupDefinition {
    pub name: String,

    /// If set, exactly one member must be present instead of at most one.
    #[serde(default)]
    pub required: bool,
}
