use std::{collections::BTreeMap, fmt};

use crate::{
    builder::NodeBuilder,
    node::{SetError, SpecNode},
    schema::SchemaRegistry,
    value::FieldValue,
};

/// A builder to build `Container` nodes.
#[derive(Clone, Debug)]
pub struct ContainerBuilder<'r> {
    inner: NodeBuilder<'r>,
}

impl ContainerBuilder<'static> {
    pub fn new(name: &str) -> Result<Self, SetError> {
        Self::new_in(SchemaRegistry::embedded(), name)
    }
}

impl<'r> ContainerBuilder<'r> {
    pub fn new_in(registry: &'r SchemaRegistry, name: &str) -> Result<Self, SetError> {
        let mut inner = NodeBuilder::new(registry, "Container")?;
        inner.set("name", name)?;
        Ok(Self { inner })
    }

    pub fn image(&mut self, image: impl Into<String>) -> Result<&mut Self, SetError> {
        self.inner.set("image", image.into())?;
        Ok(self)
    }

    pub fn image_pull_policy(&mut self, image_pull_policy: impl Into<String>) -> Result<&mut Self, SetError> {
        self.inner.set("image_pull_policy", image_pull_policy.into())?;
        Ok(self)
    }

    pub fn add_env_var(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<&mut Self, SetError> {
        let mut env_var = EnvVarBuilder::new_in(self.inner.registry(), name)?;
        env_var.value(value)?;
        self.add_env_vars([env_var.build()])
    }

    /// Used for pushing down attributes like the Pod's namespace into the containers.
    pub fn add_env_var_from_field_path(
        &mut self,
        name: impl Into<String>,
        field_path: FieldPathEnvVar,
    ) -> Result<&mut Self, SetError> {
        let mut env_var = EnvVarBuilder::new_in(self.inner.registry(), name)?;
        env_var.value_from_field_path(field_path)?;
        self.add_env_vars([env_var.build()])
    }

    pub fn add_env_vars(&mut self, env_vars: impl IntoIterator<Item = SpecNode>) -> Result<&mut Self, SetError> {
        for env_var in env_vars {
            self.inner.add_item("env", env_var)?;
        }
        Ok(self)
    }

    pub fn command(&mut self, command: Vec<String>) -> Result<&mut Self, SetError> {
        self.inner.set("command", command)?;
        Ok(self)
    }

    pub fn args(&mut self, args: Vec<String>) -> Result<&mut Self, SetError> {
        self.inner.set("args", args)?;
        Ok(self)
    }

    pub fn add_container_port(&mut self, name: impl Into<String>, port: i32) -> Result<&mut Self, SetError> {
        let mut container_port = self.inner.for_field("ports")?;
        container_port
            .set("container_port", port)?
            .set("name", name.into().to_lowercase())?;
        self.inner.add_item("ports", container_port)?;
        Ok(self)
    }

    /// Sets resource requests and limits. Quantities are strings like `500m` or `4Gi`.
    pub fn resources(
        &mut self,
        requests: BTreeMap<String, String>,
        limits: BTreeMap<String, String>,
    ) -> Result<&mut Self, SetError> {
        let mut resources = self.inner.for_field("resources")?;
        if !requests.is_empty() {
            resources.set("requests", requests)?;
        }
        if !limits.is_empty() {
            resources.set("limits", limits)?;
        }
        self.inner.set_node("resources", resources)?;
        Ok(self)
    }

    pub fn add_volume_mount(&mut self, name: impl Into<String>, path: impl Into<String>) -> Result<&mut Self, SetError> {
        let mut volume_mount = self.inner.for_field("volume_mounts")?;
        volume_mount
            .set("mount_path", path.into())?
            .set("name", name.into())?;
        self.inner.add_item("volume_mounts", volume_mount)?;
        Ok(self)
    }

    pub fn add_volume_mounts(&mut self, volume_mounts: impl IntoIterator<Item = SpecNode>) -> Result<&mut Self, SetError> {
        for volume_mount in volume_mounts {
            self.inner.add_item("volume_mounts", volume_mount)?;
        }
        Ok(self)
    }

    pub fn readiness_probe(&mut self, probe: impl Into<SpecNode>) -> Result<&mut Self, SetError> {
        self.inner.set_node("readiness_probe", probe)?;
        Ok(self)
    }

    pub fn liveness_probe(&mut self, probe: impl Into<SpecNode>) -> Result<&mut Self, SetError> {
        self.inner.set_node("liveness_probe", probe)?;
        Ok(self)
    }

    pub fn startup_probe(&mut self, probe: impl Into<SpecNode>) -> Result<&mut Self, SetError> {
        self.inner.set_node("startup_probe", probe)?;
        Ok(self)
    }

    pub fn security_context(&mut self, context: impl Into<SpecNode>) -> Result<&mut Self, SetError> {
        self.inner.set_node("security_context", context)?;
        Ok(self)
    }

    pub fn build(&self) -> SpecNode {
        self.inner.build()
    }
}

/// A builder to build `EnvVar` nodes.
///
/// An environment variable holds either a literal value or a reference, setting one
/// replaces the other.
#[derive(Clone, Debug)]
pub struct EnvVarBuilder<'r> {
    inner: NodeBuilder<'r>,
}

impl EnvVarBuilder<'static> {
    pub fn new(name: impl Into<String>) -> Result<Self, SetError> {
        Self::new_in(SchemaRegistry::embedded(), name)
    }
}

impl<'r> EnvVarBuilder<'r> {
    pub fn new_in(registry: &'r SchemaRegistry, name: impl Into<String>) -> Result<Self, SetError> {
        let mut inner = NodeBuilder::new(registry, "EnvVar")?;
        inner.set("name", name.into())?;
        Ok(Self { inner })
    }

    pub fn value(&mut self, value: impl Into<String>) -> Result<&mut Self, SetError> {
        self.inner.unset("value_from")?.set("value", value.into())?;
        Ok(self)
    }

    pub fn value_from_field_path(&mut self, field_path: FieldPathEnvVar) -> Result<&mut Self, SetError> {
        self.value_from("field_ref", [("field_path", field_path.to_string())])
    }

    pub fn value_from_secret(
        &mut self,
        secret_name: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<&mut Self, SetError> {
        self.value_from("secret_key_ref", [
            ("name", secret_name.into()),
            ("key", secret_key.into()),
        ])
    }

    pub fn value_from_config_map(
        &mut self,
        config_map_name: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<&mut Self, SetError> {
        self.value_from("config_map_key_ref", [
            ("name", config_map_name.into()),
            ("key", key.into()),
        ])
    }

    pub fn value_from_resource_field(
        &mut self,
        container_name: impl Into<String>,
        resource: impl Into<String>,
    ) -> Result<&mut Self, SetError> {
        self.value_from("resource_field_ref", [
            ("container_name", container_name.into()),
            ("resource", resource.into()),
        ])
    }

    /// Sets `valueFrom` to a source with the single selector `selector_field`.
    fn value_from<const N: usize>(
        &mut self,
        selector_field: &str,
        selector_values: [(&str, String); N],
    ) -> Result<&mut Self, SetError> {
        let mut source = self.inner.for_field("value_from")?;
        let mut selector = source.for_field(selector_field)?;
        for (field, value) in selector_values {
            selector.set(field, value)?;
        }
        source.set_node(selector_field, selector)?;

        self.inner.unset("value")?.set_node("value_from", source)?;
        Ok(self)
    }

    pub fn build(&self) -> SpecNode {
        self.inner.build()
    }
}

impl From<ContainerBuilder<'_>> for SpecNode {
    fn from(builder: ContainerBuilder<'_>) -> Self {
        builder.inner.into_node()
    }
}

impl From<&mut ContainerBuilder<'_>> for SpecNode {
    fn from(builder: &mut ContainerBuilder<'_>) -> Self {
        builder.build()
    }
}

impl From<EnvVarBuilder<'_>> for SpecNode {
    fn from(builder: EnvVarBuilder<'_>) -> Self {
        builder.inner.into_node()
    }
}

impl From<&mut EnvVarBuilder<'_>> for SpecNode {
    fn from(builder: &mut EnvVarBuilder<'_>) -> Self {
        builder.build()
    }
}

impl From<EnvVarBuilder<'_>> for FieldValue {
    fn from(builder: EnvVarBuilder<'_>) -> Self {
        SpecNode::from(builder).into()
    }
}

/// Downward API capabilities available via `fieldRef`
/// See: <https://kubernetes.io/docs/tasks/inject-data-application/downward-api-volume-expose-pod-information/#capabilities-of-the-downward-api>
#[derive(Debug)]
pub enum FieldPathEnvVar {
    Name,
    Namespace,
    UID,
    Labels(String),
    Annotations(String),
}

impl fmt::Display for FieldPathEnvVar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Name => write!(f, "metadata.name"),
            Self::Namespace => write!(f, "metadata.namespace"),
            Self::UID => write!(f, "metadata.uid"),
            Self::Labels(name) => write!(f, "metadata.labels['{name}']"),
            Self::Annotations(name) => write!(f, "metadata.annotations['{name}']"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::{ProbeBuilder, SecurityContextBuilder},
        codec::Codec,
        validation::Validator,
    };

    #[test]
    fn test_container_builder() {
        let probe = ProbeBuilder::new()
            .expect("declared kind")
            .with_tcp_socket_action(8080)
            .expect("valid port")
            .build();

        let mut builder = ContainerBuilder::new("testcontainer").expect("valid name");
        let container = builder
            .image("stackable/zookeeper:2.4.14")
            .and_then(|b| b.command(vec!["zookeeper-server-start.sh".to_owned()]))
            .and_then(|b| b.args(["stackable/conf/zk.properties".to_owned()].into()))
            .and_then(|b| b.add_container_port("Foo_Port_Name", 10000))
            .and_then(|b| b.add_container_port("bar_port_name", 20000))
            .and_then(|b| b.add_env_var("foo", "bar"))
            .and_then(|b| b.add_env_var_from_field_path("POD_NAME", FieldPathEnvVar::Name))
            .and_then(|b| b.add_volume_mount("configmap", "/mount"))
            .and_then(|b| {
                b.resources(
                    BTreeMap::from([("cpu".to_owned(), "500m".to_owned())]),
                    BTreeMap::from([("memory".to_owned(), "6Gi".to_owned())]),
                )
            })
            .and_then(|b| b.readiness_probe(probe.clone()))
            .and_then(|b| b.liveness_probe(probe))
            .and_then(|b| b.security_context(SecurityContextBuilder::run_as_root().expect("valid values")))
            .expect("valid values")
            .build();

        assert_eq!(container.get_str("name"), Some("testcontainer"));
        assert_eq!(container.get_str("image"), Some("stackable/zookeeper:2.4.14"));
        assert_eq!(container.get_list("ports").map(<[FieldValue]>::len), Some(2));
        assert_eq!(
            container
                .get_list("ports")
                .and_then(|ports| ports.first())
                .and_then(FieldValue::as_node)
                .and_then(|port| port.get_str("name")),
            Some("foo_port_name")
        );
        assert_eq!(container.get_list("env").map(<[FieldValue]>::len), Some(2));
        assert_eq!(Validator::new(SchemaRegistry::embedded()).validate(&container), vec![]);
    }

    #[test]
    fn test_env_var_builder_sources() {
        let mut builder = EnvVarBuilder::new("PASSWORD").expect("valid name");
        builder.value("plain").expect("valid value");
        builder
            .value_from_secret("credentials", "password")
            .expect("valid values");

        let encoded = Codec::new(SchemaRegistry::embedded())
            .encode_value(&builder.build())
            .expect("encodable");

        assert_eq!(
            encoded,
            serde_json::json!({
                "name": "PASSWORD",
                "valueFrom": {"secretKeyRef": {"key": "password", "name": "credentials"}}
            })
        );
    }

    #[test]
    fn test_field_path_env_var_display() {
        assert_eq!(FieldPathEnvVar::Name.to_string(), "metadata.name");
        assert_eq!(
            FieldPathEnvVar::Labels("app".to_owned()).to_string(),
            "metadata.labels['app']"
        );
    }
}
