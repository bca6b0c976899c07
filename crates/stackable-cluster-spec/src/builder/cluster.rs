use std::collections::BTreeMap;

use crate::{
    builder::NodeBuilder,
    cluster::ClusterKind,
    node::{SetError, SpecNode},
    schema::SchemaRegistry,
    value::FieldValue,
};

/// A builder for the `spec` of a [`ClusterKind`].
///
/// Covers the configuration shared by all cluster kinds. Kind specific fields (e.g.
/// `object_store_memory_bytes` of a Ray cluster) are set with [`Self::set`].
#[derive(Clone, Debug)]
pub struct ClusterSpecBuilder<'r> {
    cluster_kind: ClusterKind,
    inner: NodeBuilder<'r>,
}

impl ClusterSpecBuilder<'static> {
    pub fn new(cluster_kind: ClusterKind) -> Result<Self, SetError> {
        Self::new_in(SchemaRegistry::embedded(), cluster_kind)
    }
}

impl<'r> ClusterSpecBuilder<'r> {
    pub fn new_in(registry: &'r SchemaRegistry, cluster_kind: ClusterKind) -> Result<Self, SetError> {
        Ok(Self {
            cluster_kind,
            inner: NodeBuilder::new(registry, cluster_kind.spec_kind())?,
        })
    }

    pub fn cluster_kind(&self) -> ClusterKind {
        self.cluster_kind
    }

    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<&mut Self, SetError> {
        self.inner.set(field, value)?;
        Ok(self)
    }

    pub fn image(&mut self, repository: impl Into<String>, tag: impl Into<String>) -> Result<&mut Self, SetError> {
        let (repository, tag) = (repository.into(), tag.into());
        self.inner.edit_node("image", |image| {
            image.set("repository", repository)?.set("tag", tag)?;
            Ok(())
        })?;
        Ok(self)
    }

    pub fn image_pull_policy(&mut self, pull_policy: impl Into<String>) -> Result<&mut Self, SetError> {
        let pull_policy = pull_policy.into();
        self.inner
            .edit_node("image", |image| image.set("pull_policy", pull_policy).map(|_| ()))?;
        Ok(self)
    }

    pub fn istio_mutual_tls_mode(&mut self, mode: impl Into<String>) -> Result<&mut Self, SetError> {
        self.set("istio_mutual_tls_mode", mode.into())
    }

    pub fn global_labels(&mut self, labels: BTreeMap<String, String>) -> Result<&mut Self, SetError> {
        self.set("global_labels", labels)
    }

    /// Sets the port held by `field`, e.g. `scheduler_port` or `dashboard_port`.
    pub fn port(&mut self, field: &str, port: u16) -> Result<&mut Self, SetError> {
        self.set(field, port)
    }

    pub fn autoscaling(&mut self, min_replicas: Option<i32>, max_replicas: i32) -> Result<&mut Self, SetError> {
        self.inner.edit_node("autoscaling", |autoscaling| {
            match min_replicas {
                Some(min_replicas) => autoscaling.set("min_replicas", min_replicas)?,
                None => autoscaling.unset("min_replicas")?,
            };
            autoscaling.set("max_replicas", max_replicas)?;
            Ok(())
        })?;
        Ok(self)
    }

    pub fn network_policy(&mut self, enabled: bool) -> Result<&mut Self, SetError> {
        self.inner
            .edit_node("network_policy", |policy| policy.set("enabled", enabled).map(|_| ()))?;
        Ok(self)
    }

    pub fn kerberos_keytab(
        &mut self,
        contents: impl Into<String>,
        mount_path: impl Into<String>,
    ) -> Result<&mut Self, SetError> {
        let (contents, mount_path) = (contents.into(), mount_path.into());
        self.inner.edit_node("kerberos_keytab", |keytab| {
            keytab.set("contents", contents)?.set("mount_path", mount_path)?;
            Ok(())
        })?;
        Ok(self)
    }

    pub fn pod_security_context(&mut self, context: impl Into<SpecNode>) -> Result<&mut Self, SetError> {
        self.inner.set_node("pod_security_context", context)?;
        Ok(self)
    }

    pub fn add_env_var(&mut self, env_var: impl Into<SpecNode>) -> Result<&mut Self, SetError> {
        let env_var: SpecNode = env_var.into();
        self.inner.add_item("env_vars", env_var)?;
        Ok(self)
    }

    pub fn add_image_pull_secret(&mut self, name: impl Into<String>) -> Result<&mut Self, SetError> {
        let mut reference = self.inner.for_field("image_pull_secrets")?;
        reference.set("name", name.into())?;
        self.inner.add_item("image_pull_secrets", reference)?;
        Ok(self)
    }

    pub fn worker_replicas(&mut self, replicas: i32) -> Result<&mut Self, SetError> {
        self.inner
            .edit_node("worker", |worker| worker.set("replicas", replicas).map(|_| ()))?;
        Ok(self)
    }

    /// Sets the resource requests and limits of the workers. Values are Kubernetes
    /// quantities like `250m` or `1Gi`.
    pub fn worker_resources(
        &mut self,
        requests: BTreeMap<String, String>,
        limits: BTreeMap<String, String>,
    ) -> Result<&mut Self, SetError> {
        self.inner.edit_node("worker", |worker| {
            worker.edit_node("resources", |resources| {
                resources.set("requests", requests)?.set("limits", limits)?;
                Ok(())
            })?;
            Ok(())
        })?;
        Ok(self)
    }

    pub fn add_worker_volume(&mut self, volume: impl Into<SpecNode>) -> Result<&mut Self, SetError> {
        let volume: SpecNode = volume.into();
        self.inner
            .edit_node("worker", |worker| worker.add_item("volumes", volume).map(|_| ()))?;
        Ok(self)
    }

    pub fn add_worker_volume_mount(&mut self, volume_mount: impl Into<SpecNode>) -> Result<&mut Self, SetError> {
        let volume_mount: SpecNode = volume_mount.into();
        self.inner.edit_node("worker", |worker| {
            worker.add_item("volume_mounts", volume_mount).map(|_| ())
        })?;
        Ok(self)
    }

    /// Edits a role node (`scheduler`, `head`, `master`, `worker`, `driver`) in place.
    pub fn edit_role(
        &mut self,
        role: &str,
        edit: impl FnOnce(&mut NodeBuilder<'r>) -> Result<(), SetError>,
    ) -> Result<&mut Self, SetError> {
        self.inner.edit_node(role, edit)?;
        Ok(self)
    }

    pub fn build(&self) -> SpecNode {
        self.inner.build()
    }
}

impl From<ClusterSpecBuilder<'_>> for SpecNode {
    fn from(builder: ClusterSpecBuilder<'_>) -> Self {
        builder.inner.into_node()
    }
}

impl From<&mut ClusterSpecBuilder<'_>> for SpecNode {
    fn from(builder: &mut ClusterSpecBuilder<'_>) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::{EnvVarBuilder, VolumeBuilder, VolumeMountBuilder},
        codec::Codec,
    };

    #[test]
    fn test_ray_cluster_spec_builder() {
        let mut volume = VolumeBuilder::new("scratch").expect("valid name");
        volume.with_empty_dir(None::<String>, Some("1Gi")).expect("valid values");

        let mut builder = ClusterSpecBuilder::new(ClusterKind::RayCluster).expect("declared kind");
        builder
            .image("rayproject/ray", "1.6.0-cpu")
            .and_then(|b| b.port("dashboard_port", 8265))
            .and_then(|b| b.worker_replicas(3))
            .and_then(|b| {
                b.worker_resources(
                    BTreeMap::from([
                        ("cpu".to_owned(), "1".to_owned()),
                        ("memory".to_owned(), "2Gi".to_owned()),
                    ]),
                    BTreeMap::new(),
                )
            })
            .and_then(|b| b.add_worker_volume(&mut volume))
            .and_then(|b| {
                b.add_worker_volume_mount(VolumeMountBuilder::new("scratch", "/tmp/scratch")?)
            })
            .and_then(|b| b.set("object_store_memory_bytes", 100_000_000))
            .expect("valid values");

        let spec = builder.build();
        assert_eq!(ClusterKind::RayCluster.validate_all(SchemaRegistry::embedded(), &spec), vec![]);

        let encoded = Codec::new(SchemaRegistry::embedded())
            .encode_value(&spec)
            .expect("encodable");
        assert_eq!(
            encoded,
            serde_json::json!({
                "image": {"repository": "rayproject/ray", "tag": "1.6.0-cpu"},
                "dashboardPort": 8265,
                "objectStoreMemoryBytes": 100_000_000,
                "worker": {
                    "resources": {"limits": {}, "requests": {"cpu": "1", "memory": "2Gi"}},
                    "volumes": [{"emptyDir": {"sizeLimit": "1Gi"}, "name": "scratch"}],
                    "volumeMounts": [{"mountPath": "/tmp/scratch", "name": "scratch"}],
                    "replicas": 3
                }
            })
        );
    }

    #[test]
    fn test_shared_configuration() {
        let mut env_var = EnvVarBuilder::new("LOG_LEVEL").expect("valid name");
        env_var.value("debug").expect("valid value");

        let mut builder = ClusterSpecBuilder::new(ClusterKind::DaskCluster).expect("declared kind");
        builder
            .istio_mutual_tls_mode("STRICT")
            .and_then(|b| b.autoscaling(Some(1), 5))
            .and_then(|b| b.network_policy(true))
            .and_then(|b| b.add_env_var(env_var))
            .and_then(|b| b.add_image_pull_secret("registry-credentials"))
            .and_then(|b| {
                b.edit_role("scheduler", |scheduler| {
                    let labels = BTreeMap::from([("role".to_owned(), "scheduler")]);
                    scheduler.set("labels", labels).map(|_| ())
                })
            })
            .expect("valid values");

        let spec = builder.build();
        assert_eq!(builder.cluster_kind(), ClusterKind::DaskCluster);
        assert_eq!(spec.kind(), "DaskClusterSpec");
        assert_eq!(
            spec.get_node("autoscaling").and_then(|a| a.get_int("max_replicas")),
            Some(5)
        );
        assert_eq!(spec.get_list("image_pull_secrets").map(<[FieldValue]>::len), Some(1));
        assert_eq!(ClusterKind::DaskCluster.validate_all(SchemaRegistry::embedded(), &spec), vec![]);
    }

    #[test]
    fn test_set_rejects_mismatched_values() {
        let mut builder = ClusterSpecBuilder::new(ClusterKind::SparkCluster).expect("declared kind");

        assert!(matches!(
            builder.set("cluster_port", "7077"),
            Err(SetError::TypeMismatch { .. })
        ));
        assert!(matches!(
            builder.set("scheduler_port", 8786),
            Err(SetError::Unknown { .. })
        ));
    }
}
