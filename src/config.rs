//! Fixture configuration.
//!
//! A [`FixtureConfig`] is composed by folding an ordered list of
//! [`ConfigOverride`]s onto the base configuration of a service adapter.
//! [`FixtureOptions`] is the chained-setter form of that list.
//!
//! ```rust
//! use std::time::Duration;
//! use testbarrel::{FixtureConfig, FixtureOptions};
//!
//! let base = FixtureConfig::new("postgres", "17.5");
//! let config = FixtureOptions::new()
//!     .timeout(Duration::from_secs(60))
//!     .env_var("POSTGRES_INITDB_ARGS", "--nosync")
//!     .compose_onto(base);
//!
//! assert_eq!(config.image_reference(), "postgres:17.5");
//! assert_eq!(config.timeout(), Duration::from_secs(60));
//! ```

use crate::network::NetworkHandle;
use crate::service::ContainerService;
use std::collections::HashMap;
use std::time::Duration;

/// Startup bound applied when no timeout override is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable per-fixture configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureConfig {
    image: String,
    version: String,
    host_port: Option<String>,
    timeout: Duration,
    env_vars: HashMap<String, String>,
    network: Option<NetworkHandle>,
}

impl FixtureConfig {
    /// Base configuration: the given image and tag, default timeout, no
    /// extra environment, ephemeral host port, fresh network.
    pub fn new(image: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            version: version.into(),
            host_port: None,
            timeout: DEFAULT_TIMEOUT,
            env_vars: HashMap::new(),
            network: None,
        }
    }

    /// Apply `overrides` to `base` in order.
    pub fn compose(base: FixtureConfig, overrides: impl IntoIterator<Item = ConfigOverride>) -> Self {
        overrides
            .into_iter()
            .fold(base, |config, override_| override_.apply(config))
    }

    /// Image repository.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Image tag.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Full image reference, `image:version`, or the bare image when no
    /// version is set.
    pub fn image_reference(&self) -> String {
        if self.version.is_empty() {
            self.image.clone()
        } else {
            format!("{}:{}", self.image, self.version)
        }
    }

    /// Requested fixed host port; `None` means ephemeral.
    pub fn host_port(&self) -> Option<&str> {
        self.host_port.as_deref()
    }

    /// Bound on startup and teardown.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Extra environment merged over the adapter's defaults.
    pub fn env_vars(&self) -> &HashMap<String, String> {
        &self.env_vars
    }

    /// Network to join instead of creating one.
    pub fn network(&self) -> Option<&NetworkHandle> {
        self.network.as_ref()
    }
}

/// One recognized configuration override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverride {
    /// Replace image and tag
    CustomImage {
        /// Image repository
        image: String,
        /// Image tag
        version: String,
    },
    /// Join an existing network
    Network(NetworkHandle),
    /// Bind the service port to this host port; empty means ephemeral
    Port(String),
    /// Replace the startup bound
    Timeout(Duration),
    /// Merge one environment variable
    EnvVar {
        /// Variable name
        key: String,
        /// Variable value
        value: String,
    },
    /// Merge several environment variables
    EnvVars(HashMap<String, String>),
}

impl ConfigOverride {
    /// Apply this override to `config`.
    ///
    /// Scalar fields are replaced; environment overrides merge key by key.
    pub fn apply(self, mut config: FixtureConfig) -> FixtureConfig {
        match self {
            ConfigOverride::CustomImage { image, version } => {
                config.image = image;
                config.version = version;
            }
            ConfigOverride::Network(handle) => config.network = Some(handle),
            ConfigOverride::Port(port) => {
                let port = port.trim().to_string();
                config.host_port = if port.is_empty() { None } else { Some(port) };
            }
            ConfigOverride::Timeout(timeout) => config.timeout = timeout,
            ConfigOverride::EnvVar { key, value } => {
                config.env_vars.insert(key, value);
            }
            ConfigOverride::EnvVars(vars) => config.env_vars.extend(vars),
        }
        config
    }
}

/// Ordered list of overrides with chained setters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureOptions {
    overrides: Vec<ConfigOverride>,
}

impl FixtureOptions {
    /// No overrides: adapter defaults only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw override.
    pub fn with(mut self, override_: ConfigOverride) -> Self {
        self.overrides.push(override_);
        self
    }

    /// Use `image:version` instead of the adapter's default image.
    pub fn custom_image(self, image: impl Into<String>, version: impl Into<String>) -> Self {
        self.with(ConfigOverride::CustomImage {
            image: image.into(),
            version: version.into(),
        })
    }

    /// Join `network` instead of creating one. The caller keeps ownership.
    pub fn network(self, network: NetworkHandle) -> Self {
        self.with(ConfigOverride::Network(network))
    }

    /// Publish the service port on this fixed host port.
    pub fn port(self, host_port: impl Into<String>) -> Self {
        self.with(ConfigOverride::Port(host_port.into()))
    }

    /// Replace the default 30s startup bound.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.with(ConfigOverride::Timeout(timeout))
    }

    /// Merge one environment variable over the adapter's defaults.
    pub fn env_var(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(ConfigOverride::EnvVar {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Merge several environment variables over the adapter's defaults.
    pub fn env_vars<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.with(ConfigOverride::EnvVars(vars))
    }

    /// The overrides in application order.
    pub fn overrides(&self) -> &[ConfigOverride] {
        &self.overrides
    }

    /// Compose onto an explicit base configuration.
    pub fn compose_onto(self, base: FixtureConfig) -> FixtureConfig {
        FixtureConfig::compose(base, self.overrides)
    }

    /// Compose onto the base configuration of adapter `S`.
    pub fn compose_for<S: ContainerService>(self) -> FixtureConfig {
        self.compose_onto(S::base_config())
    }
}

impl FromIterator<ConfigOverride> for FixtureOptions {
    fn from_iter<T: IntoIterator<Item = ConfigOverride>>(iter: T) -> Self {
        Self {
            overrides: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FixtureOptions {
    type Item = ConfigOverride;
    type IntoIter = std::vec::IntoIter<ConfigOverride>;

    fn into_iter(self) -> Self::IntoIter {
        self.overrides.into_iter()
    }
}
