use std::time::Duration;

use crate::{
    builder::NodeBuilder,
    node::{SetError, SpecNode},
    schema::SchemaRegistry,
};

const HANDLER_GROUP: &str = "handler";

/// The Kubernetes default of `periodSeconds`.
const DEFAULT_PERIOD: Duration = Duration::from_secs(10);

/// A builder for `Probe` nodes.
///
/// A probe runs exactly one action, setting an action replaces the previous one.
#[derive(Clone, Debug)]
pub struct ProbeBuilder<'r> {
    inner: NodeBuilder<'r>,
    period: Duration,
}

impl ProbeBuilder<'static> {
    pub fn new() -> Result<Self, SetError> {
        Self::new_in(SchemaRegistry::embedded())
    }
}

impl<'r> ProbeBuilder<'r> {
    pub fn new_in(registry: &'r SchemaRegistry) -> Result<Self, SetError> {
        Ok(Self {
            inner: NodeBuilder::new(registry, "Probe")?,
            period: DEFAULT_PERIOD,
        })
    }

    /// This probe action executes the specified command
    pub fn with_exec_action(
        &mut self,
        command: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<&mut Self, SetError> {
        let command = command.into_iter().map(Into::into).collect::<Vec<String>>();
        let mut exec = self.inner.for_field("exec")?;
        exec.set("command", command)?;
        self.with_action("exec", exec)
    }

    /// This probe action does an HTTP GET request to the specified port. Optionally, you can
    /// configure the path, otherwise the Kubernetes default is used.
    pub fn with_http_get_action(
        &mut self,
        port: u16,
        path: Option<impl Into<String>>,
    ) -> Result<&mut Self, SetError> {
        let mut http_get = self.inner.for_field("http_get")?;
        http_get.set("port", port)?;
        if let Some(path) = path {
            http_get.set("path", path.into())?;
        }
        self.with_action("http_get", http_get)
    }

    pub fn with_tcp_socket_action(&mut self, port: u16) -> Result<&mut Self, SetError> {
        let mut tcp_socket = self.inner.for_field("tcp_socket")?;
        tcp_socket.set("port", port)?;
        self.with_action("tcp_socket", tcp_socket)
    }

    /// Action-specific functions (e.g. [`Self::with_exec_action`] or
    /// [`Self::with_http_get_action`]) are recommended instead.
    pub fn with_action(&mut self, field: &str, action: impl Into<SpecNode>) -> Result<&mut Self, SetError> {
        let registry = self.inner.registry();
        for member in registry.one_of_members(self.inner.kind(), HANDLER_GROUP)? {
            if member != field {
                self.inner.unset(member)?;
            }
        }

        self.inner.set_node(field, action)?;
        Ok(self)
    }

    /// The period/interval in which the probe should be executed.
    pub fn with_period(&mut self, period: Duration) -> Result<&mut Self, SetError> {
        self.period = period;
        self.inner.set("period_seconds", seconds(period))?;
        Ok(self)
    }

    pub fn with_timeout(&mut self, timeout: Duration) -> Result<&mut Self, SetError> {
        self.inner.set("timeout_seconds", seconds(timeout))?;
        Ok(self)
    }

    pub fn with_initial_delay(&mut self, initial_delay: Duration) -> Result<&mut Self, SetError> {
        self.inner.set("initial_delay_seconds", seconds(initial_delay))?;
        Ok(self)
    }

    /// How often the probe must succeed before being considered successful.
    pub fn with_success_threshold(&mut self, success_threshold: i32) -> Result<&mut Self, SetError> {
        self.inner.set("success_threshold", success_threshold)?;
        Ok(self)
    }

    /// How often the probe must fail before being considered failed.
    pub fn with_failure_threshold(&mut self, failure_threshold: i32) -> Result<&mut Self, SetError> {
        self.inner.set("failure_threshold", failure_threshold)?;
        Ok(self)
    }

    /// The duration the probe needs to fail before being considered failed.
    ///
    /// This calculates the needed failure threshold based on the period (set it first) and
    /// passes that to [`Self::with_failure_threshold`].
    pub fn with_failure_threshold_duration(&mut self, failure_threshold_duration: Duration) -> Result<&mut Self, SetError> {
        let failure_threshold = threshold(failure_threshold_duration, self.period);
        self.with_failure_threshold(failure_threshold)
    }

    /// The duration the probe needs to succeed before being considered successful.
    pub fn with_success_threshold_duration(&mut self, success_threshold_duration: Duration) -> Result<&mut Self, SetError> {
        let success_threshold = threshold(success_threshold_duration, self.period);
        self.with_success_threshold(success_threshold)
    }

    pub fn build(&self) -> SpecNode {
        self.inner.build()
    }
}

impl From<ProbeBuilder<'_>> for SpecNode {
    fn from(builder: ProbeBuilder<'_>) -> Self {
        builder.inner.into_node()
    }
}

impl From<&mut ProbeBuilder<'_>> for SpecNode {
    fn from(builder: &mut ProbeBuilder<'_>) -> Self {
        builder.build()
    }
}

fn seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

// Such big numbers do not have any real world effect, saturating is fine.
fn threshold(duration: Duration, period: Duration) -> i32 {
    if period.is_zero() {
        return 1;
    }
    duration.div_duration_f32(period).ceil() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    #[test]
    fn test_probe_builder() {
        let probe = ProbeBuilder::new()
            .expect("declared kind")
            .with_exec_action(["sleep", "1"])
            .and_then(|b| b.with_period(Duration::from_secs(5)))
            .and_then(|b| b.with_failure_threshold_duration(Duration::from_secs(33)))
            .and_then(|b| b.with_timeout(Duration::from_secs(1)))
            .expect("valid values")
            .build();

        let encoded = Codec::new(SchemaRegistry::embedded())
            .encode_value(&probe)
            .expect("encodable");

        assert_eq!(
            encoded,
            serde_json::json!({
                "exec": {"command": ["sleep", "1"]},
                "failureThreshold": 7,
                "periodSeconds": 5,
                "timeoutSeconds": 1
            })
        );
    }

    #[test]
    fn test_actions_replace_each_other() {
        let mut builder = ProbeBuilder::new().expect("declared kind");
        builder
            .with_http_get_action(8080, Some("/health"))
            .and_then(|b| b.with_tcp_socket_action(9090))
            .expect("valid values");

        let probe = builder.build();
        assert!(!probe.is_set("http_get"));
        assert_eq!(
            probe
                .get_node("tcp_socket")
                .and_then(|action| action.get_int("port")),
            Some(9090)
        );
    }

    #[test]
    fn test_threshold_from_default_period() {
        let mut builder = ProbeBuilder::new().expect("declared kind");
        builder
            .with_success_threshold_duration(Duration::from_secs(25))
            .expect("valid value");

        assert_eq!(builder.build().get_int("success_threshold"), Some(3));
    }
}
