use crate::{
    builder::NodeBuilder,
    node::{SetError, SpecNode},
    schema::SchemaRegistry,
};

/// A builder for `SecurityContext` nodes (not to be confused with `PodSecurityContext`).
#[derive(Clone, Debug)]
pub struct SecurityContextBuilder<'r> {
    inner: NodeBuilder<'r>,
}

impl SecurityContextBuilder<'static> {
    pub fn new() -> Result<Self, SetError> {
        Self::new_in(SchemaRegistry::embedded())
    }

    /// Convenience function for a wide use-case.
    pub fn run_as_root() -> Result<SpecNode, SetError> {
        Ok(Self::new()?.run_as_user(0)?.build())
    }
}

impl<'r> SecurityContextBuilder<'r> {
    pub fn new_in(registry: &'r SchemaRegistry) -> Result<Self, SetError> {
        Ok(Self {
            inner: NodeBuilder::new(registry, "SecurityContext")?,
        })
    }

    pub fn allow_privilege_escalation(&mut self, value: bool) -> Result<&mut Self, SetError> {
        self.inner.set("allow_privilege_escalation", value)?;
        Ok(self)
    }

    pub fn add_capabilities(
        &mut self,
        add: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<&mut Self, SetError> {
        let add = add.into_iter().map(Into::into).collect::<Vec<String>>();
        self.inner
            .edit_node("capabilities", |capabilities| {
                capabilities.set("add", add).map(|_| ())
            })?;
        Ok(self)
    }

    pub fn drop_capabilities(
        &mut self,
        drop: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<&mut Self, SetError> {
        let drop = drop.into_iter().map(Into::into).collect::<Vec<String>>();
        self.inner
            .edit_node("capabilities", |capabilities| {
                capabilities.set("drop", drop).map(|_| ())
            })?;
        Ok(self)
    }

    pub fn privileged(&mut self, value: bool) -> Result<&mut Self, SetError> {
        self.inner.set("privileged", value)?;
        Ok(self)
    }

    pub fn proc_mount(&mut self, value: impl Into<String>) -> Result<&mut Self, SetError> {
        self.inner.set("proc_mount", value.into())?;
        Ok(self)
    }

    pub fn read_only_root_filesystem(&mut self, value: bool) -> Result<&mut Self, SetError> {
        self.inner.set("read_only_root_filesystem", value)?;
        Ok(self)
    }

    pub fn run_as_group(&mut self, value: i64) -> Result<&mut Self, SetError> {
        self.inner.set("run_as_group", value)?;
        Ok(self)
    }

    pub fn run_as_non_root(&mut self, value: bool) -> Result<&mut Self, SetError> {
        self.inner.set("run_as_non_root", value)?;
        Ok(self)
    }

    pub fn run_as_user(&mut self, value: i64) -> Result<&mut Self, SetError> {
        self.inner.set("run_as_user", value)?;
        Ok(self)
    }

    pub fn se_linux_level(&mut self, level: impl Into<String>) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "se_linux_options", "level", level.into())?;
        Ok(self)
    }

    pub fn se_linux_role(&mut self, role: impl Into<String>) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "se_linux_options", "role", role.into())?;
        Ok(self)
    }

    pub fn se_linux_type(&mut self, type_: impl Into<String>) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "se_linux_options", "type_", type_.into())?;
        Ok(self)
    }

    pub fn se_linux_user(&mut self, user: impl Into<String>) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "se_linux_options", "user", user.into())?;
        Ok(self)
    }

    pub fn seccomp_profile_localhost(&mut self, profile: impl Into<String>) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "seccomp_profile", "localhost_profile", profile.into())?;
        Ok(self)
    }

    pub fn seccomp_profile_type(&mut self, type_: impl Into<String>) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "seccomp_profile", "type_", type_.into())?;
        Ok(self)
    }

    pub fn win_credential_spec(&mut self, spec: impl Into<String>) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "windows_options", "gmsa_credential_spec", spec.into())?;
        Ok(self)
    }

    pub fn win_credential_spec_name(&mut self, name: impl Into<String>) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "windows_options", "gmsa_credential_spec_name", name.into())?;
        Ok(self)
    }

    pub fn win_run_as_user_name(&mut self, name: impl Into<String>) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "windows_options", "run_as_user_name", name.into())?;
        Ok(self)
    }

    pub fn build(&self) -> SpecNode {
        self.inner.build()
    }
}

/// A builder for `PodSecurityContext` nodes.
#[derive(Clone, Debug)]
pub struct PodSecurityContextBuilder<'r> {
    inner: NodeBuilder<'r>,
}

impl PodSecurityContextBuilder<'static> {
    pub fn new() -> Result<Self, SetError> {
        Self::new_in(SchemaRegistry::embedded())
    }
}

impl<'r> PodSecurityContextBuilder<'r> {
    pub fn new_in(registry: &'r SchemaRegistry) -> Result<Self, SetError> {
        Ok(Self {
            inner: NodeBuilder::new(registry, "PodSecurityContext")?,
        })
    }

    pub fn build(&self) -> SpecNode {
        self.inner.build()
    }

    pub fn fs_group(&mut self, group: i64) -> Result<&mut Self, SetError> {
        self.inner.set("fs_group", group)?;
        Ok(self)
    }

    pub fn fs_group_change_policy(&mut self, policy: &str) -> Result<&mut Self, SetError> {
        self.inner.set("fs_group_change_policy", policy)?;
        Ok(self)
    }

    pub fn run_as_group(&mut self, group: i64) -> Result<&mut Self, SetError> {
        self.inner.set("run_as_group", group)?;
        Ok(self)
    }

    pub fn run_as_non_root(&mut self) -> Result<&mut Self, SetError> {
        self.inner.set("run_as_non_root", true)?;
        Ok(self)
    }

    pub fn run_as_user(&mut self, user: i64) -> Result<&mut Self, SetError> {
        self.inner.set("run_as_user", user)?;
        Ok(self)
    }

    pub fn supplemental_groups(&mut self, groups: &[i64]) -> Result<&mut Self, SetError> {
        self.inner.set("supplemental_groups", groups.to_vec())?;
        Ok(self)
    }

    pub fn se_linux_level(&mut self, level: &str) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "se_linux_options", "level", level)?;
        Ok(self)
    }

    pub fn se_linux_role(&mut self, role: &str) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "se_linux_options", "role", role)?;
        Ok(self)
    }

    pub fn se_linux_type(&mut self, type_: &str) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "se_linux_options", "type_", type_)?;
        Ok(self)
    }

    pub fn se_linux_user(&mut self, user: &str) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "se_linux_options", "user", user)?;
        Ok(self)
    }

    pub fn seccomp_profile_localhost(&mut self, profile: &str) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "seccomp_profile", "localhost_profile", profile)?;
        Ok(self)
    }

    pub fn seccomp_profile_type(&mut self, type_: &str) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "seccomp_profile", "type_", type_)?;
        Ok(self)
    }

    /// Appends kernel parameters as `(name, value)` pairs.
    pub fn sysctls(&mut self, kparam: &[(&str, &str)]) -> Result<&mut Self, SetError> {
        for (name, value) in kparam {
            let mut sysctl = self.inner.for_field("sysctls")?;
            sysctl.set("name", *name)?.set("value", *value)?;
            self.inner.add_item("sysctls", sysctl)?;
        }
        Ok(self)
    }

    pub fn win_credential_spec(&mut self, spec: &str) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "windows_options", "gmsa_credential_spec", spec)?;
        Ok(self)
    }

    pub fn win_credential_spec_name(&mut self, name: &str) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "windows_options", "gmsa_credential_spec_name", name)?;
        Ok(self)
    }

    pub fn win_run_as_user_name(&mut self, name: &str) -> Result<&mut Self, SetError> {
        set_nested(&mut self.inner, "windows_options", "run_as_user_name", name)?;
        Ok(self)
    }
}

fn set_nested(
    builder: &mut NodeBuilder<'_>,
    node_field: &str,
    field: &str,
    value: impl Into<String>,
) -> Result<(), SetError> {
    builder.edit_node(node_field, |node| node.set(field, value.into()).map(|_| ()))?;
    Ok(())
}

impl From<SecurityContextBuilder<'_>> for SpecNode {
    fn from(builder: SecurityContextBuilder<'_>) -> Self {
        builder.inner.into_node()
    }
}

impl From<&mut SecurityContextBuilder<'_>> for SpecNode {
    fn from(builder: &mut SecurityContextBuilder<'_>) -> Self {
        builder.build()
    }
}

impl From<PodSecurityContextBuilder<'_>> for SpecNode {
    fn from(builder: PodSecurityContextBuilder<'_>) -> Self {
        builder.inner.into_node()
    }
}

impl From<&mut PodSecurityContextBuilder<'_>> for SpecNode {
    fn from(builder: &mut PodSecurityContextBuilder<'_>) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::Codec, value::FieldValue};

    #[test]
    fn test_security_context_builder() {
        let mut builder = SecurityContextBuilder::new().expect("declared kind");
        let context = builder
            .allow_privilege_escalation(true)
            .and_then(|b| b.add_capabilities(["NET_ADMIN"]))
            .and_then(|b| b.drop_capabilities(["ALL"]))
            .and_then(|b| b.privileged(true))
            .and_then(|b| b.proc_mount("proc_mount"))
            .and_then(|b| b.read_only_root_filesystem(false))
            .and_then(|b| b.run_as_group(1000))
            .and_then(|b| b.run_as_non_root(true))
            .and_then(|b| b.run_as_user(1001))
            .and_then(|b| b.se_linux_level("level"))
            .and_then(|b| b.se_linux_role("role"))
            .and_then(|b| b.se_linux_type("type"))
            .and_then(|b| b.se_linux_user("user"))
            .and_then(|b| b.seccomp_profile_localhost("localhost"))
            .and_then(|b| b.seccomp_profile_type("type"))
            .and_then(|b| b.win_credential_spec("spec"))
            .and_then(|b| b.win_credential_spec_name("name"))
            .and_then(|b| b.win_run_as_user_name("user"))
            .expect("valid values")
            .build();

        let encoded = Codec::new(SchemaRegistry::embedded())
            .encode_value(&context)
            .expect("encodable");

        assert_eq!(
            encoded,
            serde_json::json!({
                "allowPrivilegeEscalation": true,
                "capabilities": {"add": ["NET_ADMIN"], "drop": ["ALL"]},
                "privileged": true,
                "procMount": "proc_mount",
                "readOnlyRootFilesystem": false,
                "runAsGroup": 1000,
                "runAsNonRoot": true,
                "runAsUser": 1001,
                "seLinuxOptions": {"level": "level", "role": "role", "type": "type", "user": "user"},
                "seccompProfile": {"localhostProfile": "localhost", "type": "type"},
                "windowsOptions": {
                    "gmsaCredentialSpec": "spec",
                    "gmsaCredentialSpecName": "name",
                    "runAsUserName": "user"
                }
            })
        );
    }

    #[test]
    fn test_run_as_root() {
        let context = SecurityContextBuilder::run_as_root().expect("valid values");

        assert_eq!(context.get_int("run_as_user"), Some(0));
    }

    #[test]
    fn test_pod_security_context_builder() {
        let mut builder = PodSecurityContextBuilder::new().expect("declared kind");
        let context = builder
            .fs_group(48)
            .and_then(|b| b.fs_group_change_policy("policy"))
            .and_then(|b| b.run_as_user(1001))
            .and_then(|b| b.run_as_group(1001))
            .and_then(|b| b.run_as_non_root())
            .and_then(|b| b.supplemental_groups(&[1002, 1003]))
            .and_then(|b| b.se_linux_level("level"))
            .and_then(|b| b.se_linux_role("role"))
            .and_then(|b| b.seccomp_profile_localhost("localhost"))
            .and_then(|b| b.seccomp_profile_type("type"))
            .and_then(|b| b.sysctls(&[("param1", "value1"), ("param2", "value2")]))
            .and_then(|b| b.win_credential_spec("spec"))
            .and_then(|b| b.win_run_as_user_name("user"))
            .expect("valid values")
            .build();

        assert_eq!(context.get_int("fs_group"), Some(48));
        assert_eq!(
            context.get("supplemental_groups"),
            Some(&FieldValue::from(vec![1002_i64, 1003]))
        );
        assert_eq!(context.get_list("sysctls").map(<[FieldValue]>::len), Some(2));
        assert_eq!(
            context
                .get_node("se_linux_options")
                .and_then(|options| options.get_str("role")),
            Some("role")
        );
        assert_eq!(
            context
                .get_node("windows_options")
                .and_then(|options| options.get_str("run_as_user_name")),
            Some("user")
        );
    }
}
