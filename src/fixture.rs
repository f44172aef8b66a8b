//! Fixture lifecycle.
//!
//! A [`Fixture`] owns one service adapter plus the network it joined, and
//! drives them through `new → start → close`:
//!
//! ```rust,no_run
//! use testbarrel::{ContainerService, FixtureOptions, PostgresFixture, RunContext};
//!
//! # async fn demo() -> testbarrel::Result<()> {
//! let ctx = RunContext::background();
//! let mut postgres = PostgresFixture::connect(&ctx, FixtureOptions::new()).await?;
//! postgres.start().await?;
//!
//! let url = postgres.service().connection_url();
//! println!("postgres at {:?}", url);
//!
//! postgres.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{FixtureConfig, FixtureOptions};
use crate::container::{ContainerRuntime, DockerRuntime};
use crate::context::RunContext;
use crate::error::{FixtureError, Result};
use crate::network::{NetworkHandle, NetworkOwnership, resolve_network};
use crate::service::{ContainerService, NatsService, PostgresService};
use crate::settings::RuntimeSettings;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// PostgreSQL fixture.
pub type PostgresFixture = Fixture<PostgresService>;

/// NATS fixture.
pub type NatsFixture = Fixture<NatsService>;

/// Where a fixture is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureState {
    /// Network resolved, container not created yet
    Constructed,
    /// Container starting or waiting for readiness
    Starting,
    /// Service reachable
    Ready,
    /// Start failed; `close` still cleans up
    Failed,
    /// Resources released; the fixture cannot be reused
    Closed,
}

impl fmt::Display for FixtureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FixtureState::Constructed => "constructed",
            FixtureState::Starting => "starting",
            FixtureState::Ready => "ready",
            FixtureState::Failed => "failed",
            FixtureState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// One service container on its network.
pub struct Fixture<S: ContainerService> {
    runtime: Arc<dyn ContainerRuntime>,
    ctx: RunContext,
    config: FixtureConfig,
    network: NetworkHandle,
    ownership: NetworkOwnership,
    service: S,
    state: FixtureState,
    container_released: bool,
}

impl<S: ContainerService> Fixture<S> {
    /// Compose the configuration, resolve the network and construct the
    /// adapter. Nothing is started.
    ///
    /// The fixture's run context is a child of `ctx` bounded by the
    /// configured timeout. Its deadline starts here, not at
    /// [`start`](Fixture::start), so time spent between the two counts
    /// against the startup budget.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::NetworkCreation`] if a fresh network was
    /// needed and could not be created.
    pub async fn new(
        ctx: &RunContext,
        runtime: Arc<dyn ContainerRuntime>,
        options: FixtureOptions,
    ) -> Result<Self> {
        let config = options.compose_for::<S>();
        let run_ctx = ctx.child_with_timeout(config.timeout());

        let (network, ownership) = resolve_network(&run_ctx, runtime.as_ref(), config.network()).await?;

        debug!(
            "Constructed fixture for {} on network {} ({:?})",
            config.image_reference(),
            network,
            ownership
        );

        let service = S::new(Arc::clone(&runtime), config.clone(), network.clone());

        Ok(Self {
            runtime,
            ctx: run_ctx,
            config,
            network,
            ownership,
            service,
            state: FixtureState::Constructed,
            container_released: false,
        })
    }

    /// Like [`Fixture::new`], against the local Docker or Podman daemon
    /// described by the discovered [`RuntimeSettings`].
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Configuration`] for unreadable settings and
    /// [`FixtureError::Runtime`] if no daemon answers.
    pub async fn connect(ctx: &RunContext, options: FixtureOptions) -> Result<Self> {
        let settings = RuntimeSettings::discover().map_err(|e| FixtureError::Configuration(e.to_string()))?;
        let runtime = DockerRuntime::connect(settings).await?;
        Self::new(ctx, Arc::new(runtime), options).await
    }

    /// Create the container and wait until the service is ready.
    ///
    /// Bounded by the run context created in [`new`](Fixture::new), whose
    /// deadline is already running.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Configuration`] if the fixture was already
    /// started or closed, otherwise the adapter's [`FixtureError::Start`].
    pub async fn start(&mut self) -> Result<()> {
        if self.state != FixtureState::Constructed {
            return Err(FixtureError::Configuration(format!(
                "Cannot start {} fixture in state {}",
                self.service.host_alias(),
                self.state
            )));
        }

        self.state = FixtureState::Starting;
        match self.service.start(&self.ctx).await {
            Ok(()) => {
                self.state = FixtureState::Ready;
                Ok(())
            }
            Err(e) => {
                warn!("{} fixture failed to start: {}", self.service.host_alias(), e);
                self.state = FixtureState::Failed;
                Err(e)
            }
        }
    }

    /// Terminate the container and remove the network if this fixture
    /// created it.
    ///
    /// Teardown runs under a fresh context bounded by the configured
    /// timeout, so it works even after the run context expired. A failed
    /// close leaves the fixture open and can be retried; once it succeeded,
    /// closing again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Termination`] if the container could not be
    /// removed. The network is then left alone, since the container is
    /// still attached. Returns [`FixtureError::NetworkRemoval`] if the owned
    /// network could not be removed.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == FixtureState::Closed {
            return Ok(());
        }

        let teardown = RunContext::with_timeout(self.config.timeout());
        self.service.close(&teardown).await?;
        self.container_released = true;

        match self.ownership {
            NetworkOwnership::Owned => self.remove_network(&teardown).await?,
            NetworkOwnership::Borrowed => {
                debug!("Leaving borrowed network {} in place", self.network);
            }
        }

        self.ctx.cancel();
        self.state = FixtureState::Closed;
        Ok(())
    }

    async fn remove_network(&self, ctx: &RunContext) -> Result<()> {
        let outcome = match ctx.run(self.runtime.remove_network(self.network.id())).await {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(()) => {
                info!("Removed network {}", self.network);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Network {} already gone", self.network);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to remove network {}: {}", self.network, e);
                Err(FixtureError::NetworkRemoval {
                    network: self.network.name().to_string(),
                    source: e,
                })
            }
        }
    }

    /// The service adapter.
    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// The network the service joined.
    pub fn network(&self) -> &NetworkHandle {
        &self.network
    }

    pub fn network_name(&self) -> &str {
        self.network.name()
    }

    /// Whether `close` removes the network.
    pub fn network_ownership(&self) -> NetworkOwnership {
        self.ownership
    }

    /// Composed configuration.
    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    pub fn state(&self) -> FixtureState {
        self.state
    }

    /// Run context that bounds `start`.
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Full container logs.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Logs`] if no container exists or the runtime
    /// cannot read them.
    pub async fn logs(&self) -> Result<String> {
        let service = self.service.host_alias().to_string();
        let Some(container) = self.service.container() else {
            return Err(FixtureError::Logs {
                service,
                source: crate::container::ContainerError::NotFound("no container was created".to_string()),
            });
        };

        container
            .logs()
            .await
            .map_err(|source| FixtureError::Logs { service, source })
    }

    /// Write the container logs to the `tracing` output. Failures are
    /// reported as warnings.
    pub async fn print_logs(&self) {
        match self.logs().await {
            Ok(logs) => info!(
                "{} container logs:\n{}",
                self.service.host_alias(),
                logs.trim_end()
            ),
            Err(e) => warn!("{}", e),
        }
    }
}

impl<S: ContainerService> fmt::Debug for Fixture<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fixture")
            .field("service", &self.service.host_alias())
            .field("network", &self.network)
            .field("ownership", &self.ownership)
            .field("state", &self.state)
            .finish()
    }
}

impl<S: ContainerService> Drop for Fixture<S> {
    fn drop(&mut self) {
        if self.state == FixtureState::Closed {
            return;
        }
        match self.service.container() {
            Some(container) if !self.container_released => warn!(
                "{} fixture dropped without close; container {} and network {} are left behind",
                self.service.host_alias(),
                container.short_id(),
                self.network
            ),
            _ if self.ownership == NetworkOwnership::Owned => warn!(
                "{} fixture dropped without close; network {} is left behind",
                self.service.host_alias(),
                self.network
            ),
            _ => {}
        }
    }
}
