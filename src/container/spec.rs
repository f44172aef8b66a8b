//! Declarative container specifications.
//!
//! A [`ContainerSpec`] is everything a runtime needs to create, start and
//! wait for a container: image reference, command, exposed ports,
//! environment, readiness condition, network aliases and host port
//! bindings. Runtimes never receive anything else from the fixtures.

use crate::container::{ContainerError, Result, WaitFor};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Transport protocol of a container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortProtocol {
    /// TCP
    Tcp,
    /// UDP
    Udp,
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortProtocol::Tcp => write!(f, "tcp"),
            PortProtocol::Udp => write!(f, "udp"),
        }
    }
}

/// A container-internal port such as `5432/tcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerPort {
    number: u16,
    protocol: PortProtocol,
}

impl ContainerPort {
    /// A TCP port.
    pub const fn tcp(number: u16) -> Self {
        Self {
            number,
            protocol: PortProtocol::Tcp,
        }
    }

    /// A UDP port.
    pub const fn udp(number: u16) -> Self {
        Self {
            number,
            protocol: PortProtocol::Udp,
        }
    }

    /// The port number inside the container.
    pub fn number(&self) -> u16 {
        self.number
    }

    /// The port protocol.
    pub fn protocol(&self) -> PortProtocol {
        self.protocol
    }
}

impl fmt::Display for ContainerPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.protocol)
    }
}

impl FromStr for ContainerPort {
    type Err = ContainerError;

    /// Parses `5432`, `5432/tcp` or `53/udp`.
    fn from_str(s: &str) -> Result<Self> {
        let (number, protocol) = match s.split_once('/') {
            Some((number, "tcp")) => (number, PortProtocol::Tcp),
            Some((number, "udp")) => (number, PortProtocol::Udp),
            Some((_, other)) => {
                return Err(ContainerError::ConfigError(format!(
                    "Unsupported port protocol '{}' in '{}'",
                    other, s
                )));
            }
            None => (s, PortProtocol::Tcp),
        };

        let number = number
            .trim()
            .parse::<u16>()
            .map_err(|_| ContainerError::ConfigError(format!("Invalid container port '{}'", s)))?;

        Ok(Self { number, protocol })
    }
}

/// Container specification builder.
///
/// Only the image is required; every other field has an empty default.
#[derive(Default)]
pub struct ContainerSpecBuilder {
    name: Option<String>,
    image: Option<String>,
    cmd: Option<Vec<String>>,
    exposed_ports: Vec<ContainerPort>,
    env: BTreeMap<String, String>,
    labels: HashMap<String, String>,
    wait_for: Option<WaitFor>,
    network_aliases: BTreeMap<String, Vec<String>>,
    port_bindings: BTreeMap<String, String>,
    auto_remove: bool,
}

impl ContainerSpecBuilder {
    /// Create a new container specification builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the container name. A unique name is generated by the runtime
    /// when unset.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the image reference (`repository[:tag]`).
    pub fn image<S: Into<String>>(mut self, image: S) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the command to run in the container.
    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(cmd.into_iter().map(|s| s.into()).collect());
        self
    }

    /// Expose a container-internal port.
    pub fn expose(mut self, port: ContainerPort) -> Self {
        if !self.exposed_ports.contains(&port) {
            self.exposed_ports.push(port);
        }
        self
    }

    /// Add an environment variable. A later value for the same key wins.
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add multiple environment variables.
    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in envs {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Add a label to the container.
    pub fn label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set the readiness condition checked after start.
    pub fn wait_for(mut self, condition: WaitFor) -> Self {
        self.wait_for = Some(condition);
        self
    }

    /// Attach the container to `network` under `alias`.
    pub fn network_alias<N: Into<String>, A: Into<String>>(mut self, network: N, alias: A) -> Self {
        let aliases = self.network_aliases.entry(network.into()).or_default();
        let alias = alias.into();
        if !aliases.contains(&alias) {
            aliases.push(alias);
        }
        self
    }

    /// Bind `container_port` to a fixed port on all host interfaces.
    ///
    /// The port is also exposed. Ports without a binding are published on an
    /// ephemeral host port.
    pub fn port_binding<S: Into<String>>(mut self, container_port: ContainerPort, host_port: S) -> Self {
        self = self.expose(container_port);
        self.port_bindings
            .insert(container_port.to_string(), host_port.into());
        self
    }

    /// Remove the container automatically once it stops.
    pub fn auto_remove(mut self, enable: bool) -> Self {
        self.auto_remove = enable;
        self
    }

    /// Build the container specification.
    ///
    /// # Errors
    ///
    /// Returns error if the image is missing or empty.
    pub fn build(self) -> Result<ContainerSpec> {
        let image = self
            .image
            .filter(|image| !image.trim().is_empty())
            .ok_or_else(|| ContainerError::ConfigError("Image is required".to_string()))?;

        Ok(ContainerSpec {
            name: self.name,
            image,
            cmd: self.cmd,
            exposed_ports: self.exposed_ports,
            env: self.env,
            labels: self.labels,
            wait_for: self.wait_for.unwrap_or_default(),
            network_aliases: self.network_aliases,
            port_bindings: self.port_bindings,
            auto_remove: self.auto_remove,
        })
    }
}

/// Declarative container specification.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    name: Option<String>,
    image: String,
    cmd: Option<Vec<String>>,
    exposed_ports: Vec<ContainerPort>,
    env: BTreeMap<String, String>,
    labels: HashMap<String, String>,
    wait_for: WaitFor,
    network_aliases: BTreeMap<String, Vec<String>>,
    port_bindings: BTreeMap<String, String>,
    auto_remove: bool,
}

impl ContainerSpec {
    /// Create a new specification builder.
    pub fn builder() -> ContainerSpecBuilder {
        ContainerSpecBuilder::new()
    }

    /// Requested container name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Image reference.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Command override.
    pub fn cmd(&self) -> Option<&[String]> {
        self.cmd.as_deref()
    }

    /// Exposed container ports.
    pub fn exposed_ports(&self) -> &[ContainerPort] {
        &self.exposed_ports
    }

    /// Environment variables, ordered by key.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Environment rendered as `KEY=value` entries.
    pub fn env_list(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }

    /// Container labels.
    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    /// Readiness condition.
    pub fn wait_for(&self) -> &WaitFor {
        &self.wait_for
    }

    /// Network memberships with their aliases.
    pub fn network_aliases(&self) -> &BTreeMap<String, Vec<String>> {
        &self.network_aliases
    }

    /// Fixed host port requested for `port`, if any.
    pub fn host_port_for(&self, port: ContainerPort) -> Option<&str> {
        self.port_bindings.get(&port.to_string()).map(String::as_str)
    }

    /// Whether the container is removed automatically on stop.
    pub fn auto_remove(&self) -> bool {
        self.auto_remove
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_spec() {
        let spec = ContainerSpec::builder()
            .image("postgres:17.5")
            .cmd(vec!["postgres", "-c", "fsync=off"])
            .expose(ContainerPort::tcp(5432))
            .build()
            .unwrap();

        assert_eq!(spec.image(), "postgres:17.5");
        assert_eq!(spec.cmd().unwrap().len(), 3);
        assert_eq!(spec.exposed_ports(), &[ContainerPort::tcp(5432)]);
        assert!(spec.host_port_for(ContainerPort::tcp(5432)).is_none());
    }

    #[test]
    fn test_environment_variables_last_write_wins() {
        let spec = ContainerSpec::builder()
            .image("nats:2-alpine")
            .env("FOO", "bar")
            .envs([("BAZ", "qux"), ("FOO", "override")])
            .build()
            .unwrap();

        assert_eq!(spec.env_list(), vec!["BAZ=qux", "FOO=override"]);
    }

    #[test]
    fn test_port_binding_exposes_port() {
        let spec = ContainerSpec::builder()
            .image("nats:2-alpine")
            .port_binding(ContainerPort::tcp(4222), "14222")
            .build()
            .unwrap();

        assert_eq!(spec.exposed_ports(), &[ContainerPort::tcp(4222)]);
        assert_eq!(spec.host_port_for(ContainerPort::tcp(4222)), Some("14222"));
    }

    #[test]
    fn test_network_aliases_deduplicated() {
        let spec = ContainerSpec::builder()
            .image("postgres:17.5")
            .network_alias("fixtures", "postgres")
            .network_alias("fixtures", "postgres")
            .network_alias("fixtures", "db")
            .build()
            .unwrap();

        assert_eq!(spec.network_aliases()["fixtures"], vec!["postgres", "db"]);
    }

    #[test]
    fn test_missing_image_error() {
        let result = ContainerSpec::builder().cmd(vec!["echo"]).build();
        assert!(matches!(result, Err(ContainerError::ConfigError(_))));

        let result = ContainerSpec::builder().image("  ").build();
        assert!(matches!(result, Err(ContainerError::ConfigError(_))));
    }

    #[test]
    fn test_container_port_parsing() {
        assert_eq!("5432".parse::<ContainerPort>().unwrap(), ContainerPort::tcp(5432));
        assert_eq!("4222/tcp".parse::<ContainerPort>().unwrap(), ContainerPort::tcp(4222));
        assert_eq!("53/udp".parse::<ContainerPort>().unwrap(), ContainerPort::udp(53));
        assert!("53/sctp".parse::<ContainerPort>().is_err());
        assert!("70000".parse::<ContainerPort>().is_err());
        assert_eq!(ContainerPort::tcp(5432).to_string(), "5432/tcp");
    }
}
