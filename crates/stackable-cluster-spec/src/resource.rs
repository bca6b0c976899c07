//! The custom resource envelope around a cluster spec.
use std::sync::LazyLock;

use const_format::concatcp;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use regex::Regex;
use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::{
    cluster::{self, ClusterKind},
    codec::{Codec, DecodeError, EncodeError},
    node::SpecNode,
    path::FieldPath,
    schema::{SchemaRegistry, UnknownFieldError},
    validation::ValidationError,
};

pub const GROUP: &str = "distributed-compute.dominodatalab.com";
pub const VERSION: &str = "v1alpha1";
pub const API_VERSION: &str = concatcp!(GROUP, "/", VERSION);

const RFC_1123_SUBDOMAIN_MAX_LENGTH: usize = 253;
const RFC_1123_LABEL_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";
const RFC_1123_SUBDOMAIN_FMT: &str = concatcp!(RFC_1123_LABEL_FMT, "(\\.", RFC_1123_LABEL_FMT, ")*");

static RFC_1123_SUBDOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{RFC_1123_SUBDOMAIN_FMT}$"))
        .expect("failed to compile RFC 1123 subdomain regex")
});

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "invalid resource name {name:?}: a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, '-' or '.', and must start and end with an alphanumeric character"
    ))]
    InvalidName { name: String },

    #[snafu(display("spec of a {cluster_kind} must be a {expected} node, got {found}"))]
    WrongSpecKind {
        cluster_kind: ClusterKind,
        expected: &'static str,
        found: String,
    },

    #[snafu(display("failed to parse JSON document"))]
    MalformedJson { source: serde_json::Error },

    #[snafu(display("resource must be a JSON object"))]
    NotAnObject,

    #[snafu(display("unexpected apiVersion {api_version:?}, expected {API_VERSION:?}"))]
    UnexpectedApiVersion { api_version: String },

    #[snafu(display("unexpected kind {kind:?}"))]
    UnexpectedKind { kind: String },

    #[snafu(display("failed to parse metadata"))]
    InvalidMetadata { source: serde_json::Error },

    #[snafu(display("failed to create an empty spec"))]
    EmptySpec { source: UnknownFieldError },

    #[snafu(display("failed to decode spec"))]
    DecodeSpec { source: DecodeError },

    #[snafu(display("failed to encode spec"))]
    EncodeSpec { source: EncodeError },

    #[snafu(display("failed to serialize metadata"))]
    SerializeMetadata { source: serde_json::Error },

    #[snafu(display("failed to serialize resource"))]
    SerializeResource { source: serde_json::Error },

    #[snafu(display("failed to apply defaults"))]
    ApplyDefaults { source: cluster::Error },
}

/// A `DaskCluster`, `RayCluster` or `SparkCluster` custom resource.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterResource {
    kind: ClusterKind,
    metadata: ObjectMeta,
    spec: SpecNode,
    status: Option<serde_json::Value>,
}

impl ClusterResource {
    /// Creates a new resource called `name`. Fails if the name is not a valid object name
    /// or `spec` is not the spec kind of `kind`.
    pub fn new(kind: ClusterKind, name: &str, namespace: Option<&str>, spec: SpecNode) -> Result<Self> {
        ensure!(
            name.len() <= RFC_1123_SUBDOMAIN_MAX_LENGTH && RFC_1123_SUBDOMAIN_REGEX.is_match(name),
            InvalidNameSnafu { name }
        );
        ensure!(spec.kind() == kind.spec_kind(), WrongSpecKindSnafu {
            cluster_kind: kind,
            expected: kind.spec_kind(),
            found: spec.kind(),
        });

        Ok(Self {
            kind,
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: namespace.map(ToOwned::to_owned),
                ..ObjectMeta::default()
            },
            spec,
            status: None,
        })
    }

    pub fn kind(&self) -> ClusterKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    pub fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    pub fn spec(&self) -> &SpecNode {
        &self.spec
    }

    pub fn spec_mut(&mut self) -> &mut SpecNode {
        &mut self.spec
    }

    /// The status as returned by the API, it is never interpreted.
    pub fn status(&self) -> Option<&serde_json::Value> {
        self.status.as_ref()
    }

    pub fn apply_defaults(&mut self, registry: &SchemaRegistry) -> Result<()> {
        self.kind
            .apply_defaults(&mut self.spec, registry)
            .context(ApplyDefaultsSnafu)
    }

    /// Structural and semantic validation of the spec.
    pub fn validate(&self, registry: &SchemaRegistry) -> Vec<ValidationError> {
        self.kind.validate_all(registry, &self.spec)
    }

    pub fn to_json(&self, codec: &Codec<'_>) -> Result<serde_json::Value> {
        let mut object = serde_json::Map::new();
        object.insert("apiVersion".to_owned(), API_VERSION.into());
        object.insert("kind".to_owned(), self.kind.to_string().into());
        object.insert(
            "metadata".to_owned(),
            serde_json::to_value(&self.metadata).context(SerializeMetadataSnafu)?,
        );
        object.insert(
            "spec".to_owned(),
            codec.encode_value(&self.spec).context(EncodeSpecSnafu)?,
        );
        if let Some(status) = &self.status {
            object.insert("status".to_owned(), status.clone());
        }

        Ok(serde_json::Value::Object(object))
    }

    /// Request body for creating or replacing the resource.
    pub fn to_request_body(&self, codec: &Codec<'_>) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.to_json(codec)?).context(SerializeResourceSnafu)
    }

    pub fn from_json(bytes: &[u8], codec: &Codec<'_>) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes).context(MalformedJsonSnafu)?;
        Self::from_value(&value, codec)
    }

    /// Decodes a resource, rejecting any `apiVersion` other than [`API_VERSION`] and kinds
    /// other than the cluster kinds.
    pub fn from_value(value: &serde_json::Value, codec: &Codec<'_>) -> Result<Self> {
        let object = value.as_object().context(NotAnObjectSnafu)?;

        let api_version = object
            .get("apiVersion")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        ensure!(api_version == API_VERSION, UnexpectedApiVersionSnafu { api_version });

        let kind = object
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let kind = kind
            .parse::<ClusterKind>()
            .ok()
            .context(UnexpectedKindSnafu { kind })?;

        let metadata = match object.get("metadata") {
            Some(metadata) => {
                serde_json::from_value(metadata.clone()).context(InvalidMetadataSnafu)?
            }
            None => ObjectMeta::default(),
        };

        let spec = match object.get("spec") {
            Some(spec) => codec
                .decode_value_at(spec, kind.spec_kind(), &FieldPath::root("spec"))
                .context(DecodeSpecSnafu)?,
            None => codec
                .registry()
                .new_node(kind.spec_kind())
                .context(EmptySpecSnafu)?,
        };

        Ok(Self {
            kind,
            metadata,
            spec,
            status: object.get("status").cloned(),
        })
    }

    /// Decodes a response body returned by the API.
    pub fn from_response_body(bytes: &[u8], codec: &Codec<'_>) -> Result<Self> {
        Self::from_json(bytes, codec)
    }
}
