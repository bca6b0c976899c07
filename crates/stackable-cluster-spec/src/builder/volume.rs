use crate::{
    builder::NodeBuilder,
    node::{SetError, SpecNode},
    schema::SchemaRegistry,
    value::FieldValue,
};

const VOLUME_SOURCE_GROUP: &str = "source";

/// A builder to build `Volume` nodes.
///
/// May only contain one volume source at a time. E.g. a call like `with_secret` after
/// `with_empty_dir` will overwrite the `empty_dir`.
#[derive(Clone, Debug)]
pub struct VolumeBuilder<'r> {
    inner: NodeBuilder<'r>,
}

impl VolumeBuilder<'static> {
    pub fn new(name: impl Into<String>) -> Result<Self, SetError> {
        Self::new_in(SchemaRegistry::embedded(), name)
    }
}

impl<'r> VolumeBuilder<'r> {
    pub fn new_in(registry: &'r SchemaRegistry, name: impl Into<String>) -> Result<Self, SetError> {
        let mut inner = NodeBuilder::new(registry, "Volume")?;
        inner.set("name", name.into())?;
        Ok(Self { inner })
    }

    /// Sets the volume source held by `field` (e.g. `csi` or `projected`), replacing any
    /// previously set source.
    pub fn source(&mut self, field: &str, source: impl Into<SpecNode>) -> Result<&mut Self, SetError> {
        let registry = self.inner.registry();
        for member in registry.one_of_members(self.inner.kind(), VOLUME_SOURCE_GROUP)? {
            if member != field {
                self.inner.unset(member)?;
            }
        }

        self.inner.set_node(field, source)?;
        Ok(self)
    }

    pub fn with_config_map(&mut self, name: impl Into<String>) -> Result<&mut Self, SetError> {
        let mut config_map = self.inner.for_field("config_map")?;
        config_map.set("name", name.into())?;
        self.source("config_map", config_map)
    }

    pub fn with_empty_dir(
        &mut self,
        medium: Option<impl Into<String>>,
        size_limit: Option<impl Into<FieldValue>>,
    ) -> Result<&mut Self, SetError> {
        let mut empty_dir = self.inner.for_field("empty_dir")?;
        if let Some(medium) = medium {
            empty_dir.set("medium", medium.into())?;
        }
        if let Some(size_limit) = size_limit {
            empty_dir.set("size_limit", size_limit)?;
        }
        self.source("empty_dir", empty_dir)
    }

    pub fn with_host_path(
        &mut self,
        path: impl Into<String>,
        type_: Option<impl Into<String>>,
    ) -> Result<&mut Self, SetError> {
        let mut host_path = self.inner.for_field("host_path")?;
        host_path.set("path", path.into())?;
        if let Some(type_) = type_ {
            host_path.set("type_", type_.into())?;
        }
        self.source("host_path", host_path)
    }

    pub fn with_persistent_volume_claim(
        &mut self,
        claim_name: impl Into<String>,
        read_only: bool,
    ) -> Result<&mut Self, SetError> {
        let mut claim = self.inner.for_field("persistent_volume_claim")?;
        claim
            .set("claim_name", claim_name.into())?
            .set("read_only", read_only)?;
        self.source("persistent_volume_claim", claim)
    }

    pub fn with_secret(
        &mut self,
        secret_name: impl Into<String>,
        optional: bool,
    ) -> Result<&mut Self, SetError> {
        let mut secret = self.inner.for_field("secret")?;
        secret
            .set("optional", optional)?
            .set("secret_name", secret_name.into())?;
        self.source("secret", secret)
    }

    pub fn build(&self) -> SpecNode {
        self.inner.build()
    }
}

/// A builder to build `VolumeMount` nodes.
#[derive(Clone, Debug)]
pub struct VolumeMountBuilder<'r> {
    inner: NodeBuilder<'r>,
}

impl VolumeMountBuilder<'static> {
    pub fn new(name: impl Into<String>, mount_path: impl Into<String>) -> Result<Self, SetError> {
        Self::new_in(SchemaRegistry::embedded(), name, mount_path)
    }
}

impl<'r> VolumeMountBuilder<'r> {
    pub fn new_in(
        registry: &'r SchemaRegistry,
        name: impl Into<String>,
        mount_path: impl Into<String>,
    ) -> Result<Self, SetError> {
        let mut inner = NodeBuilder::new(registry, "VolumeMount")?;
        inner
            .set("name", name.into())?
            .set("mount_path", mount_path.into())?;
        Ok(Self { inner })
    }

    pub fn read_only(&mut self, read_only: bool) -> Result<&mut Self, SetError> {
        self.inner.set("read_only", read_only)?;
        Ok(self)
    }

    pub fn mount_propagation(&mut self, mount_propagation: impl Into<String>) -> Result<&mut Self, SetError> {
        self.inner.set("mount_propagation", mount_propagation.into())?;
        Ok(self)
    }

    pub fn sub_path(&mut self, sub_path: impl Into<String>) -> Result<&mut Self, SetError> {
        self.inner.set("sub_path", sub_path.into())?;
        Ok(self)
    }

    pub fn sub_path_expr(&mut self, sub_path_expr: impl Into<String>) -> Result<&mut Self, SetError> {
        self.inner.set("sub_path_expr", sub_path_expr.into())?;
        Ok(self)
    }

    pub fn build(&self) -> SpecNode {
        self.inner.build()
    }
}

impl From<VolumeBuilder<'_>> for SpecNode {
    fn from(builder: VolumeBuilder<'_>) -> Self {
        builder.inner.into_node()
    }
}

impl From<&mut VolumeBuilder<'_>> for SpecNode {
    fn from(builder: &mut VolumeBuilder<'_>) -> Self {
        builder.build()
    }
}

impl From<VolumeMountBuilder<'_>> for SpecNode {
    fn from(builder: VolumeMountBuilder<'_>) -> Self {
        builder.inner.into_node()
    }
}

impl From<&mut VolumeMountBuilder<'_>> for SpecNode {
    fn from(builder: &mut VolumeMountBuilder<'_>) -> Self {
        builder.build()
    }
}
