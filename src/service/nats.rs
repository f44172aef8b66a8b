//! NATS adapter, JetStream enabled.

use crate::config::FixtureConfig;
use crate::container::{Container, ContainerPort, ContainerRuntime, ContainerSpec, WaitFor};
use crate::context::RunContext;
use crate::error::{FixtureError, Result};
use crate::network::NetworkHandle;
use crate::service::{ContainerService, ServiceState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const NATS_IMAGE: &str = "docker.io/library/nats";
pub const NATS_VERSION: &str = "2-alpine";
pub const NATS_ALIAS: &str = "nats";
pub const NATS_PORT: ContainerPort = ContainerPort::tcp(4222);
pub const NATS_READY_LOG: &str = "Server is ready";
pub const NATS_LOG_TIMEOUT: Duration = Duration::from_secs(30);

const NATS_CMD: [&str; 2] = ["nats-server", "-js"];

pub struct NatsService {
    state: ServiceState,
}

impl NatsService {
    /// Container specification this adapter starts.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Start`] if the configured image is empty.
    pub fn container_spec(&self) -> Result<ContainerSpec> {
        self.state
            .spec_builder(NATS_ALIAS, NATS_PORT, &[])
            .cmd(NATS_CMD)
            .wait_for(WaitFor::all([
                WaitFor::log(NATS_READY_LOG).with_startup_timeout(NATS_LOG_TIMEOUT),
                WaitFor::listening_port(NATS_PORT),
            ]))
            .build()
            .map_err(|e| FixtureError::start(NATS_ALIAS, e))
    }
}

#[async_trait]
impl ContainerService for NatsService {
    fn new(runtime: Arc<dyn ContainerRuntime>, config: FixtureConfig, network: NetworkHandle) -> Self {
        Self {
            state: ServiceState::new(runtime, config, network),
        }
    }

    fn base_config() -> FixtureConfig {
        FixtureConfig::new(NATS_IMAGE, NATS_VERSION)
    }

    async fn start(&mut self, ctx: &RunContext) -> Result<()> {
        let spec = self.container_spec()?;
        self.state.launch(ctx, spec, NATS_PORT, NATS_ALIAS).await
    }

    async fn close(&mut self, ctx: &RunContext) -> Result<()> {
        self.state.shutdown(ctx, NATS_ALIAS).await
    }

    fn host(&self) -> &str {
        self.state.host()
    }

    fn port(&self) -> u16 {
        self.state.port()
    }

    fn host_alias(&self) -> &str {
        NATS_ALIAS
    }

    fn network_name(&self) -> &str {
        self.state.network().name()
    }

    fn container(&self) -> Option<&Container> {
        self.state.container()
    }

    fn connection_url(&self) -> Option<Url> {
        if !self.state.is_started() {
            return None;
        }
        Url::parse(&format!("nats://{}:{}", self.host(), self.port())).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixtureOptions;
    use crate::service::test_support::IdleRuntime;

    fn service(options: FixtureOptions) -> NatsService {
        NatsService::new(
            Arc::new(IdleRuntime),
            options.compose_for::<NatsService>(),
            NetworkHandle::new("net-id", "testbarrel-net-nats"),
        )
    }

    #[test]
    fn test_default_spec() {
        let spec = service(FixtureOptions::new()).container_spec().unwrap();

        assert_eq!(spec.image(), "docker.io/library/nats:2-alpine");
        assert_eq!(
            spec.cmd().unwrap(),
            &["nats-server".to_string(), "-js".to_string()]
        );
        assert_eq!(spec.exposed_ports(), &[NATS_PORT]);
        assert!(spec.env().is_empty());
        assert_eq!(
            spec.network_aliases()["testbarrel-net-nats"],
            vec!["nats".to_string()]
        );
        assert_eq!(
            spec.wait_for().to_string(),
            "all(log \"Server is ready\" x1, listening port 4222/tcp)"
        );
    }

    #[test]
    fn test_log_condition_has_own_timeout() {
        let spec = service(FixtureOptions::new()).container_spec().unwrap();

        let WaitFor::All { conditions, .. } = spec.wait_for() else {
            panic!("expected all()");
        };
        assert!(matches!(
            conditions[0],
            WaitFor::Log { startup_timeout, .. } if startup_timeout == NATS_LOG_TIMEOUT
        ));
    }

    #[test]
    fn test_no_credentials() {
        let service = service(FixtureOptions::new().env_var("NATS_DEBUG", "1"));

        assert_eq!(service.user(), "");
        assert_eq!(service.password(), "");
        assert_eq!(service.db_name(), "");
        assert_eq!(service.host_alias(), "nats");
        assert_eq!(service.endpoint().database, "");
        assert_eq!(service.container_spec().unwrap().env()["NATS_DEBUG"], "1");
    }
}
