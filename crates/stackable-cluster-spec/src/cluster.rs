//! Defaulting and semantic validation of the cluster custom resources.
//!
//! The [`Validator`] only knows what the schema declares. The rules in here are the
//! ones the admission webhooks of the distributed-compute operator enforce on top of
//! that: port ranges, replica counts, autoscaling bounds and so on.
use std::collections::{BTreeMap, BTreeSet};

use convert_case::{Case, Casing};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tracing::info;

use crate::{
    node::{FieldSlot, SetError, SpecNode, TypeMismatchSnafu},
    path::FieldPath,
    schema::SchemaRegistry,
    validation::{ValidationError, ValidationErrors, Validator},
    value::FieldValue,
};

const MIN_VALID_PORT: i64 = 1024;
const MAX_VALID_PORT: i64 = 65535;

const MIN_OBJECT_STORE_MEMORY_BYTES: i64 = 78_643_200;

/// Values accepted by the Istio `PeerAuthentication` mutual TLS mode.
pub const ISTIO_MUTUAL_TLS_MODES: &[&str] = &["UNSET", "DISABLE", "PERMISSIVE", "STRICT"];

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("expected a {expected} node, got {found}"))]
    WrongSpecKind {
        expected: &'static str,
        found: String,
    },

    #[snafu(display("failed to set default value of {path}"))]
    SetDefault { source: SetError, path: FieldPath },
}

/// The custom resource kinds of the `distributed-compute.dominodatalab.com` group.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
)]
pub enum ClusterKind {
    DaskCluster,
    RayCluster,
    SparkCluster,
}

/// A single default value, applied when the field at `path` is absent.
struct FieldDefault {
    path: &'static [&'static str],
    value: FieldValue,
    description: &'static str,
}

impl FieldDefault {
    fn new(path: &'static [&'static str], value: impl Into<FieldValue>, description: &'static str) -> Self {
        Self {
            path,
            value: value.into(),
            description,
        }
    }
}

impl ClusterKind {
    /// The schema kind of the `spec` of this resource.
    pub fn spec_kind(&self) -> &'static str {
        match self {
            Self::DaskCluster => "DaskClusterSpec",
            Self::RayCluster => "RayClusterSpec",
            Self::SparkCluster => "SparkClusterSpec",
        }
    }

    /// The plural resource name, as used in API paths.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::DaskCluster => "daskclusters",
            Self::RayCluster => "rayclusters",
            Self::SparkCluster => "sparkclusters",
        }
    }

    fn defaults(self) -> Vec<FieldDefault> {
        match self {
            Self::DaskCluster => vec![
                FieldDefault::new(&["scheduler_port"], 8786, "scheduler port"),
                FieldDefault::new(&["dashboard_port"], 8787, "dashboard port"),
                FieldDefault::new(&["worker_port"], 3000, "worker port"),
                FieldDefault::new(&["nanny_port"], 4000, "nanny port"),
                FieldDefault::new(&["worker", "replicas"], 1, "worker replicas"),
                FieldDefault::new(&["image", "repository"], "daskdev/dask", "image repository"),
                FieldDefault::new(&["image", "tag"], "2021.6.2", "image tag"),
            ],
            Self::RayCluster => {
                let pod_labels = BTreeMap::from([("ray-client".to_owned(), "true")]);
                vec![
                    FieldDefault::new(&["port"], 6379, "port"),
                    FieldDefault::new(&["redis_shard_ports"], vec![6380, 6381], "redis shard ports"),
                    FieldDefault::new(&["client_server_port"], 10001, "client server port"),
                    FieldDefault::new(&["object_manager_port"], 2384, "object manager port"),
                    FieldDefault::new(&["gcs_server_port"], 2386, "gcs server port"),
                    FieldDefault::new(&["node_manager_port"], 2385, "node manager port"),
                    FieldDefault::new(&["dashboard_port"], 8265, "dashboard port"),
                    FieldDefault::new(&["enable_dashboard"], true, "enable dashboard flag"),
                    FieldDefault::new(&["network_policy", "enabled"], true, "enable network policy flag"),
                    FieldDefault::new(
                        &["network_policy", "client_labels"],
                        pod_labels.clone(),
                        "network policy client server labels",
                    ),
                    FieldDefault::new(
                        &["network_policy", "dashboard_labels"],
                        pod_labels,
                        "network policy dashboard pod labels",
                    ),
                    FieldDefault::new(&["worker", "replicas"], 1, "worker replicas"),
                    FieldDefault::new(&["image", "repository"], "rayproject/ray", "image repository"),
                    FieldDefault::new(&["image", "tag"], "1.6.0-cpu", "image tag"),
                ]
            }
            Self::SparkCluster => vec![
                FieldDefault::new(&["cluster_port"], 7077, "cluster port"),
                FieldDefault::new(&["master_web_port"], 8080, "master web port"),
                FieldDefault::new(&["worker_web_port"], 8081, "worker web port"),
                FieldDefault::new(&["network_policy", "enabled"], true, "enable network policy flag"),
                FieldDefault::new(&["worker", "replicas"], 1, "worker replicas"),
            ],
        }
    }

    /// The fields holding network ports, in declaration order. Nested fields are given
    /// as `(parent, field)`.
    fn port_fields(self) -> &'static [(Option<&'static str>, &'static str)] {
        match self {
            Self::DaskCluster => &[
                (None, "scheduler_port"),
                (None, "dashboard_port"),
                (None, "worker_port"),
                (None, "nanny_port"),
            ],
            Self::RayCluster => &[
                (None, "port"),
                (None, "redis_shard_ports"),
                (None, "client_server_port"),
                (None, "object_manager_port"),
                (None, "node_manager_port"),
                (None, "gcs_server_port"),
                (None, "worker_ports"),
                (None, "dashboard_port"),
            ],
            Self::SparkCluster => &[
                (None, "cluster_port"),
                (None, "master_web_port"),
                (None, "worker_web_port"),
                (Some("driver"), "port"),
                (Some("driver"), "ui_port"),
                (Some("driver"), "block_manager_port"),
            ],
        }
    }

    /// Fills in the defaults of this kind. A default is only applied when its field is
    /// absent, `null` or a blank string, explicit values are never overwritten. Missing
    /// intermediate nodes (e.g. `worker` for `worker.replicas`) are created.
    pub fn apply_defaults(&self, spec: &mut SpecNode, registry: &SchemaRegistry) -> Result<()> {
        ensure!(spec.kind() == self.spec_kind(), WrongSpecKindSnafu {
            expected: self.spec_kind(),
            found: spec.kind(),
        });

        for default in self.defaults() {
            let path = default.path.iter().copied().collect::<FieldPath>();
            let applied = apply_default(registry, spec, default.path, &default.value)
                .context(SetDefaultSnafu { path: path.clone() })?;

            if applied {
                info!(
                    cluster.kind = %self,
                    %path,
                    value = ?default.value,
                    "setting default {}",
                    default.description
                );
            }
        }

        Ok(())
    }

    /// Checks the semantic rules of this kind. Paths are rooted at `spec`.
    pub fn validate(&self, spec: &SpecNode) -> Vec<ValidationError> {
        let path = FieldPath::root("spec");
        if spec.kind() != self.spec_kind() {
            return vec![ValidationError::Invalid {
                path,
                value: spec.kind().to_owned(),
                reason: format!("must be a {} node", self.spec_kind()),
            }];
        }

        let mut errors = Vec::new();
        validate_istio_mutual_tls_mode(spec, &path, &mut errors);
        validate_image(spec, &path, &mut errors);
        validate_autoscaling(spec, &path, &mut errors);
        validate_kerberos_keytab(spec, &path, &mut errors);
        validate_worker_replicas(spec, &path, &mut errors);

        if *self == Self::RayCluster {
            validate_worker_resource_requests(spec, &path, &mut errors);
            validate_object_store_memory_bytes(spec, &path, &mut errors);
        }

        validate_ports(self.ports(spec, &path), &mut errors);
        errors
    }

    /// Runs the structural [`Validator`] followed by the rules of [`Self::validate`].
    pub fn validate_all(&self, registry: &SchemaRegistry, spec: &SpecNode) -> Vec<ValidationError> {
        let mut errors = Validator::new(registry).validate_at(spec, &FieldPath::root("spec"));
        errors.extend(self.validate(spec));
        errors
    }

    pub fn ensure_valid(&self, registry: &SchemaRegistry, spec: &SpecNode) -> Result<(), ValidationErrors> {
        let errors = self.validate_all(registry, spec);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }

    fn ports(self, spec: &SpecNode, path: &FieldPath) -> Vec<(FieldPath, i64)> {
        let mut ports = Vec::new();

        for (parent, field) in self.port_fields() {
            let (node, path) = match parent {
                Some(parent) => match spec.get_node(parent) {
                    Some(node) => (node, child_path(path, Some(spec), parent)),
                    None => continue,
                },
                None => (spec, path.clone()),
            };

            let field_path = child_path(&path, Some(node), field);
            match node.get(field) {
                Some(FieldValue::Int(port)) => ports.push((field_path, *port)),
                Some(FieldValue::List(items)) => ports.extend(
                    items
                        .iter()
                        .enumerate()
                        .filter_map(|(index, item)| Some((field_path.index(index), item.as_int()?))),
                ),
                _ => {}
            }
        }

        ports
    }
}

fn apply_default(
    registry: &SchemaRegistry,
    node: &mut SpecNode,
    path: &[&str],
    value: &FieldValue,
) -> Result<bool, SetError> {
    let Some((field, rest)) = path.split_first() else {
        return Ok(false);
    };

    if rest.is_empty() {
        if is_blank(node.get(field)) {
            node.insert(field, value.clone())?;
            return Ok(true);
        }
        return Ok(false);
    }

    if matches!(node.get(field), None | Some(FieldValue::Null)) {
        let value_kind = node.slot(field)?.value_kind();
        let kind = value_kind.referenced_kind().context(TypeMismatchSnafu {
            kind: node.kind(),
            field: *field,
            expected: value_kind.clone(),
            found: "node",
        })?;
        let child = registry.new_node(kind)?;
        node.insert(field, child)?;
    }

    match node.get_node_mut(field) {
        Some(child) => apply_default(registry, child, rest, value),
        None => Ok(false),
    }
}

fn is_blank(value: Option<&FieldValue>) -> bool {
    match value {
        None | Some(FieldValue::Null) => true,
        Some(FieldValue::Str(value)) => value.is_empty(),
        Some(_) => false,
    }
}

/// The path of `field` below `path`, using the wire name declared by `node` (or the
/// derived camelCase name if the node is absent).
fn child_path(path: &FieldPath, node: Option<&SpecNode>, field: &str) -> FieldPath {
    match node.and_then(|node| node.slot(field).ok()) {
        Some(slot) => path.child(FieldSlot::wire_name(slot)),
        None => path.child(field.to_case(Case::Camel)),
    }
}

fn validate_istio_mutual_tls_mode(spec: &SpecNode, path: &FieldPath, errors: &mut Vec<ValidationError>) {
    let Some(mode) = spec.get_str("istio_mutual_tls_mode") else {
        return;
    };

    if !mode.is_empty() && !ISTIO_MUTUAL_TLS_MODES.contains(&mode) {
        errors.push(ValidationError::Invalid {
            path: child_path(path, Some(spec), "istio_mutual_tls_mode"),
            value: format!("{mode:?}"),
            reason: format!(
                "mode must be one of the following: [{}]",
                ISTIO_MUTUAL_TLS_MODES.join(" ")
            ),
        });
    }
}

fn validate_image(spec: &SpecNode, path: &FieldPath, errors: &mut Vec<ValidationError>) {
    let Some(image) = spec.get_node("image") else {
        return;
    };

    let path = child_path(path, Some(spec), "image");
    for field in ["repository", "tag"] {
        if image.get_str(field).is_none_or(|value| value.trim().is_empty()) {
            errors.push(ValidationError::Required {
                path: child_path(&path, Some(image), field),
                reason: "cannot be blank".to_owned(),
            });
        }
    }
}

fn validate_autoscaling(spec: &SpecNode, path: &FieldPath, errors: &mut Vec<ValidationError>) {
    let Some(autoscaling) = spec.get_node("autoscaling") else {
        return;
    };

    let path = child_path(path, Some(spec), "autoscaling");
    let invalid = |field: &str, value: i64, reason: &str| ValidationError::Invalid {
        path: child_path(&path, Some(autoscaling), field),
        value: value.to_string(),
        reason: reason.to_owned(),
    };

    let min_replicas = autoscaling.get_int("min_replicas");
    let max_replicas = autoscaling.get_int("max_replicas");

    if let Some(min_replicas) = min_replicas {
        if min_replicas < 1 {
            errors.push(invalid("min_replicas", min_replicas, "must be greater than or equal to 1"));
        }
        if let Some(max_replicas) = max_replicas.filter(|max| min_replicas > *max) {
            errors.push(invalid(
                "max_replicas",
                max_replicas,
                "cannot be less than spec.autoscaling.minReplicas",
            ));
        }
    }

    if let Some(max_replicas) = max_replicas.filter(|max| *max < 1) {
        errors.push(invalid("max_replicas", max_replicas, "must be greater than or equal to 1"));
    }

    for field in ["average_cpu_utilization", "average_memory_utilization"] {
        if let Some(utilization) = autoscaling.get_int(field).filter(|value| *value <= 0) {
            errors.push(invalid(field, utilization, "must be greater than 0"));
        }
    }

    if let Some(window) = autoscaling
        .get_int("scale_down_stabilization_window_seconds")
        .filter(|value| *value < 0)
    {
        errors.push(invalid(
            "scale_down_stabilization_window_seconds",
            window,
            "must be greater than or equal to 0",
        ));
    }
}

fn validate_kerberos_keytab(spec: &SpecNode, path: &FieldPath, errors: &mut Vec<ValidationError>) {
    let Some(keytab) = spec.get_node("kerberos_keytab") else {
        return;
    };

    let path = child_path(path, Some(spec), "kerberos_keytab");
    for (field, reason) in [
        ("contents", "must contain file contents"),
        ("mount_path", "must be a valid file path"),
    ] {
        if keytab.get_str(field).is_none_or(str::is_empty) {
            errors.push(ValidationError::Required {
                path: child_path(&path, Some(keytab), field),
                reason: reason.to_owned(),
            });
        }
    }
}

fn validate_worker_replicas(spec: &SpecNode, path: &FieldPath, errors: &mut Vec<ValidationError>) {
    let Some(worker) = spec.get_node("worker") else {
        return;
    };

    if let Some(replicas) = worker.get_int("replicas").filter(|replicas| *replicas < 0) {
        errors.push(ValidationError::Invalid {
            path: child_path(&child_path(path, Some(spec), "worker"), Some(worker), "replicas"),
            value: replicas.to_string(),
            reason: "should be greater than or equal to 0".to_owned(),
        });
    }
}

fn validate_worker_resource_requests(spec: &SpecNode, path: &FieldPath, errors: &mut Vec<ValidationError>) {
    let worker = spec.get_node("worker");
    let resources = worker.and_then(|worker| worker.get_node("resources"));
    let requests = resources.and_then(|resources| resources.get("requests"));

    let path = child_path(path, Some(spec), "worker");
    let path = child_path(&path, worker, "resources");
    let path = child_path(&path, resources, "requests");

    for resource in ["cpu", "memory"] {
        let present = requests
            .and_then(FieldValue::as_object)
            .is_some_and(|requests| requests.contains_key(resource));

        if !present {
            errors.push(ValidationError::Required {
                path: path.child(resource),
                reason: "is mandatory".to_owned(),
            });
        }
    }
}

fn validate_object_store_memory_bytes(spec: &SpecNode, path: &FieldPath, errors: &mut Vec<ValidationError>) {
    if let Some(bytes) = spec
        .get_int("object_store_memory_bytes")
        .filter(|bytes| *bytes < MIN_OBJECT_STORE_MEMORY_BYTES)
    {
        errors.push(ValidationError::Invalid {
            path: child_path(path, Some(spec), "object_store_memory_bytes"),
            value: bytes.to_string(),
            reason: format!("should be greater than or equal to {MIN_OBJECT_STORE_MEMORY_BYTES}"),
        });
    }
}

fn validate_ports(ports: Vec<(FieldPath, i64)>, errors: &mut Vec<ValidationError>) {
    let mut seen = BTreeSet::new();

    for (path, port) in ports {
        if !seen.insert(port) {
            errors.push(ValidationError::Duplicate {
                path: path.clone(),
                value: port.to_string(),
            });
        }

        if port < MIN_VALID_PORT {
            errors.push(ValidationError::Invalid {
                path,
                value: port.to_string(),
                reason: format!("must be greater than or equal to {MIN_VALID_PORT}"),
            });
        } else if port > MAX_VALID_PORT {
            errors.push(ValidationError::Invalid {
                path,
                value: port.to_string(),
                reason: format!("must be less than or equal to {MAX_VALID_PORT}"),
            });
        }
    }
}
