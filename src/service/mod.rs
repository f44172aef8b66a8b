//! Service adapters.
//!
//! A [`ContainerService`] knows how to run one kind of backing service
//! (image, port, environment, readiness) and exposes the resulting endpoint.
//! The start and stop plumbing every adapter shares lives in [`ServiceState`].

pub mod nats;
pub mod postgres;

pub use nats::NatsService;
pub use postgres::PostgresService;

use crate::config::FixtureConfig;
use crate::container::{
    Container, ContainerError, ContainerPort, ContainerRuntime, ContainerSpec, ContainerSpecBuilder,
    SERVICE_LABEL, parse_port,
};
use crate::context::RunContext;
use crate::error::{FixtureError, Result};
use crate::network::NetworkHandle;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// A containerized backing service with a uniform lifecycle.
#[async_trait]
pub trait ContainerService: Send + Sync {
    /// Construct the adapter without starting anything.
    fn new(runtime: Arc<dyn ContainerRuntime>, config: FixtureConfig, network: NetworkHandle) -> Self
    where
        Self: Sized;

    /// Adapter defaults the configuration composer starts from.
    fn base_config() -> FixtureConfig
    where
        Self: Sized;

    /// Create the container and wait until it is ready.
    ///
    /// Not idempotent; call once per adapter.
    async fn start(&mut self, ctx: &RunContext) -> Result<()>;

    /// Terminate the container, if one was ever created.
    async fn close(&mut self, ctx: &RunContext) -> Result<()>;

    /// Host under which the service is reachable; empty before start.
    fn host(&self) -> &str;

    /// Host port of the service; 0 before start.
    fn port(&self) -> u16;

    /// DNS alias of the service on its network.
    fn host_alias(&self) -> &str;

    /// Name of the network the service joined.
    fn network_name(&self) -> &str;

    /// Service user, empty for services without credentials.
    fn user(&self) -> &str {
        ""
    }

    /// Service password, empty for services without credentials.
    fn password(&self) -> &str {
        ""
    }

    /// Database name, empty for services without databases.
    fn db_name(&self) -> &str {
        ""
    }

    /// Underlying container, once one was created.
    fn container(&self) -> Option<&Container>;

    /// Client connection URL; `None` until the service has started.
    fn connection_url(&self) -> Option<Url>;

    /// Everything a client needs to reach the service.
    fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host().to_string(),
            port: self.port(),
            host_alias: self.host_alias().to_string(),
            network_name: self.network_name().to_string(),
            user: self.user().to_string(),
            password: self.password().to_string(),
            database: self.db_name().to_string(),
        }
    }
}

/// Connection surface of a started service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host reachable from the test process
    pub host: String,
    /// Host port mapped to the service port
    pub port: u16,
    /// Alias reachable from other containers on the same network
    pub host_alias: String,
    /// Network name
    pub network_name: String,
    /// Service user
    pub user: String,
    /// Service password
    pub password: String,
    /// Database name
    pub database: String,
}

impl Endpoint {
    /// `host:port` as seen from the test process.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// State and plumbing shared by all adapters.
pub struct ServiceState {
    runtime: Arc<dyn ContainerRuntime>,
    config: FixtureConfig,
    network: NetworkHandle,
    container: Option<Container>,
    terminated: bool,
    host: String,
    port: u16,
}

impl ServiceState {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: FixtureConfig, network: NetworkHandle) -> Self {
        Self {
            runtime,
            config,
            network,
            container: None,
            terminated: false,
            host: String::new(),
            port: 0,
        }
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    pub fn network(&self) -> &NetworkHandle {
        &self.network
    }

    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether `host` and `port` have been resolved.
    pub fn is_started(&self) -> bool {
        self.port != 0
    }

    /// Adapter defaults overlaid with the caller's environment.
    pub fn merged_env(&self, defaults: &[(&str, &str)]) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = defaults
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env.extend(
            self.config
                .env_vars()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        env
    }

    /// Spec builder pre-filled with everything common to adapters: image,
    /// exposed port, host binding, environment, labels and network alias.
    pub fn spec_builder(
        &self,
        alias: &str,
        port: ContainerPort,
        default_env: &[(&str, &str)],
    ) -> ContainerSpecBuilder {
        let builder = ContainerSpec::builder()
            .image(self.config.image_reference())
            .expose(port)
            .envs(self.merged_env(default_env))
            .label(SERVICE_LABEL, alias)
            .network_alias(self.network.name(), alias);

        match self.config.host_port() {
            Some(host_port) => builder.port_binding(port, host_port),
            None => builder,
        }
    }

    /// Run `spec`, wait for readiness and resolve the endpoint.
    ///
    /// The container handle is kept as soon as the container is created, so
    /// [`shutdown`] after a failed or interrupted start still removes it.
    ///
    /// # Errors
    ///
    /// Every failure is a [`FixtureError::Start`] naming `alias`.
    ///
    /// [`shutdown`]: ServiceState::shutdown
    pub async fn launch(
        &mut self,
        ctx: &RunContext,
        spec: ContainerSpec,
        port: ContainerPort,
        alias: &str,
    ) -> Result<()> {
        ctx.check().map_err(|e| FixtureError::start(alias, e))?;

        debug!("Starting {} container from {}", alias, spec.image());

        // Creation is not raced against `ctx`: a create dropped after the
        // engine accepted it would leave a container nobody knows about.
        let container = Container::create(Arc::clone(&self.runtime), &spec)
            .await
            .map_err(|e| FixtureError::start(alias, e))?;
        self.container = Some(container.clone());

        ctx.run(container.start())
            .await
            .map_err(|e| FixtureError::start(alias, e))?
            .map_err(|e| FixtureError::start(alias, e))?;

        spec.wait_for()
            .wait_until_ready(ctx, &container)
            .await
            .map_err(|e| FixtureError::start(alias, e))?;

        let (host, mapped) = Self::resolve_endpoint(ctx, &container, port)
            .await
            .map_err(|e| FixtureError::start(alias, e))?;

        self.host = host;
        self.port = mapped;

        info!(
            "{} ready at {}:{} (container {}, network {})",
            alias,
            self.host,
            self.port,
            container.short_id(),
            self.network
        );
        Ok(())
    }

    async fn resolve_endpoint(
        ctx: &RunContext,
        container: &Container,
        port: ContainerPort,
    ) -> std::result::Result<(String, u16), ContainerError> {
        let host = ctx.run(container.host()).await??;
        let mapped = ctx.run(container.mapped_port(port)).await??;
        Ok((host, parse_port(&mapped)?))
    }

    /// Terminate the container, if any and not already terminated.
    ///
    /// The handle and the resolved endpoint stay readable afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Termination`] if the runtime fails to remove
    /// the container or `ctx` ends first. A later call retries.
    pub async fn shutdown(&mut self, ctx: &RunContext, alias: &str) -> Result<()> {
        let Some(container) = self.container.clone().filter(|_| !self.terminated) else {
            debug!("No {} container to terminate", alias);
            return Ok(());
        };

        debug!("Terminating {} container {}", alias, container.short_id());

        let outcome = match ctx.run(container.terminate()).await {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(()) => {
                info!("Terminated {} container {}", alias, container.short_id());
                self.terminated = true;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to terminate {} container {}: {}", alias, container.short_id(), e);
                Err(FixtureError::termination(alias, e))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::container::{ContainerError, ContainerPort, ContainerRuntime, ContainerSpec, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Runtime for adapter tests that never reach the engine.
    pub(crate) struct IdleRuntime;

    fn idle<T>() -> Result<T> {
        Err(ContainerError::Other("idle runtime".to_string()))
    }

    #[async_trait]
    impl ContainerRuntime for IdleRuntime {
        async fn create_network(&self, _: &str, _: &HashMap<String, String>) -> Result<String> {
            idle()
        }
        async fn remove_network(&self, _: &str) -> Result<()> {
            idle()
        }
        async fn create_container(&self, _: &ContainerSpec) -> Result<String> {
            idle()
        }
        async fn start_container(&self, _: &str) -> Result<()> {
            idle()
        }
        async fn is_running(&self, _: &str) -> Result<bool> {
            idle()
        }
        async fn host(&self, _: &str) -> Result<String> {
            idle()
        }
        async fn mapped_port(&self, _: &str, _: ContainerPort) -> Result<String> {
            idle()
        }
        async fn logs(&self, _: &str) -> Result<String> {
            idle()
        }
        async fn is_port_listening(&self, _: &str, _: ContainerPort) -> Result<bool> {
            idle()
        }
        async fn terminate(&self, _: &str) -> Result<()> {
            idle()
        }
        async fn container_exists(&self, _: &str) -> Result<bool> {
            idle()
        }
    }
}
