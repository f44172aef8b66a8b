//! Docker/Podman implementation of [`ContainerRuntime`].
//!
//! Handles image pulling, container creation and start, published-port
//! lookup, log collection, listener probes and forced removal.

use crate::container::executor::{self, ExecConfig};
use crate::container::network::{NetworkConfig, NetworkManager};
use crate::container::{
    ContainerClient, ContainerClientConfig, ContainerError, ContainerPort, ContainerRuntime,
    ContainerSpec, ExecOutput, MANAGED_LABEL, Result,
};
use crate::settings::RuntimeSettings;
use async_trait::async_trait;
use bollard::models::{EndpointSettings, HostConfig, PortBinding};
use futures::stream::TryStreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Timeout of the host-side TCP connect in a listener probe.
const HOST_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Container runtime backed by the Docker Engine API.
pub struct DockerRuntime {
    client: ContainerClient,
    networks: NetworkManager,
    settings: RuntimeSettings,
}

impl DockerRuntime {
    /// Connect using settings discovered from files and environment.
    ///
    /// # Errors
    ///
    /// Returns error if settings are invalid or the runtime is unreachable.
    pub async fn connect_default() -> Result<Self> {
        let settings = RuntimeSettings::discover()
            .map_err(|e| ContainerError::ConfigError(e.to_string()))?;
        Self::connect(settings).await
    }

    /// Connect with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns error if connection to container runtime fails.
    pub async fn connect(settings: RuntimeSettings) -> Result<Self> {
        let client = ContainerClient::with_config(ContainerClientConfig::from(&settings)).await?;
        Ok(Self::with_client(client, settings))
    }

    /// Create a runtime around an existing client.
    pub fn with_client(client: ContainerClient, settings: RuntimeSettings) -> Self {
        let networks = NetworkManager::new(client.docker().clone());
        Self {
            client,
            networks,
            settings,
        }
    }

    /// Get the underlying client.
    pub fn client(&self) -> &ContainerClient {
        &self.client
    }

    /// Settings this runtime was created with.
    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Execute a command in a running container.
    ///
    /// # Errors
    ///
    /// Returns error if execution fails.
    pub async fn exec(&self, container_id: &str, config: &ExecConfig) -> Result<ExecOutput> {
        executor::execute(self.client.docker(), container_id, config).await
    }

    /// Make `image` available locally, pulling it when missing.
    ///
    /// # Errors
    ///
    /// Returns error if the image is missing and cannot be pulled.
    pub async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.client.image_exists(image).await? {
            debug!("Image {} present locally", image);
            Ok(())
        } else {
            self.pull_image(image).await
        }
    }

    /// Pull `image` from its registry, draining the progress stream.
    ///
    /// # Errors
    ///
    /// Returns error if the registry refuses or the image does not exist.
    pub async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling image {}", image);

        let mut progress = self.client.docker().create_image(
            Some(bollard::image::CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(update) = progress.try_next().await? {
            if let Some(status) = update.status {
                debug!("{}: {}", image, status);
            }
        }

        info!("Pulled image {}", image);
        Ok(())
    }

    fn host_config(&self, spec: &ContainerSpec) -> HostConfig {
        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .exposed_ports()
            .iter()
            .filter_map(|port| {
                spec.host_port_for(*port).map(|host_port| {
                    (
                        port.to_string(),
                        Some(vec![PortBinding {
                            host_ip: Some("0.0.0.0".to_string()),
                            host_port: Some(host_port.to_string()),
                        }]),
                    )
                })
            })
            .collect();

        HostConfig {
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            // Ports without an explicit binding get an ephemeral host port.
            publish_all_ports: Some(true),
            auto_remove: Some(spec.auto_remove()),
            ..Default::default()
        }
    }

    fn networking_config(spec: &ContainerSpec) -> Option<bollard::container::NetworkingConfig<String>> {
        if spec.network_aliases().is_empty() {
            return None;
        }

        let endpoints_config = spec
            .network_aliases()
            .iter()
            .map(|(network, aliases)| {
                (
                    network.clone(),
                    EndpointSettings {
                        aliases: Some(aliases.clone()),
                        ..Default::default()
                    },
                )
            })
            .collect();

        Some(bollard::container::NetworkingConfig { endpoints_config })
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        debug!("Stopping container: {}", container_id);

        self.client
            .docker()
            .stop_container(
                container_id,
                Some(bollard::container::StopContainerOptions {
                    t: self.settings.stop_timeout_secs,
                }),
            )
            .await?;

        debug!("Stopped container: {}", container_id);
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        debug!("Removing container: {}", container_id);

        self.client
            .docker()
            .remove_container(
                container_id,
                Some(bollard::container::RemoveContainerOptions {
                    force: true,
                    v: true, // Remove anonymous volumes (database data dirs)
                    ..Default::default()
                }),
            )
            .await?;

        Ok(())
    }

    async fn host_port_accepts(&self, container_id: &str, port: ContainerPort) -> Result<bool> {
        let host = self.client.daemon_host();
        let mapped = self.client.published_port(container_id, port).await?;
        let address = format!("{}:{}", host, mapped);

        match tokio::time::timeout(HOST_PROBE_TIMEOUT, tokio::net::TcpStream::connect(&address)).await {
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) => {
                debug!("Host probe {} refused: {}", address, e);
                Ok(false)
            }
            Err(_) => {
                debug!("Host probe {} timed out", address);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_network(&self, name: &str, labels: &HashMap<String, String>) -> Result<String> {
        let config = NetworkConfig::bridge(name).with_labels(labels);
        self.networks.create_network(&config).await
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        self.networks.remove_network(network_id).await
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        if self.settings.auto_pull {
            self.ensure_image(spec.image()).await?;
        }

        let container_name = spec
            .name()
            .map(String::from)
            .unwrap_or_else(|| format!("{}-{}", self.settings.name_prefix, uuid::Uuid::new_v4()));

        let options = bollard::container::CreateContainerOptions {
            name: container_name.as_str(),
            ..Default::default()
        };

        let mut labels = spec.labels().clone();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());

        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .exposed_ports()
            .iter()
            .map(|port| (port.to_string(), HashMap::new()))
            .collect();

        debug!("Creating container: {}", container_name);

        use bollard::container::Config as BollardConfig;

        let bollard_config = BollardConfig {
            image: Some(spec.image().to_string()),
            cmd: spec.cmd().map(<[String]>::to_vec),
            env: Some(spec.env_list()),
            labels: Some(labels),
            exposed_ports: Some(exposed_ports),
            host_config: Some(self.host_config(spec)),
            networking_config: Self::networking_config(spec),
            ..Default::default()
        };

        let response = self
            .client
            .docker()
            .create_container(Some(options), bollard_config)
            .await?;

        info!("Created container: {} ({})", container_name, response.id);

        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        debug!("Starting container: {}", container_id);

        self.client
            .docker()
            .start_container(
                container_id,
                None::<bollard::container::StartContainerOptions<String>>,
            )
            .await?;

        info!("Started container: {}", container_id);
        Ok(())
    }

    async fn is_running(&self, container_id: &str) -> Result<bool> {
        match self.client.container_state(container_id).await {
            Ok(state) => Ok(state.is_alive()),
            Err(ContainerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn host(&self, _container_id: &str) -> Result<String> {
        Ok(self.client.daemon_host())
    }

    async fn mapped_port(&self, container_id: &str, port: ContainerPort) -> Result<String> {
        self.client.published_port(container_id, port).await
    }

    async fn logs(&self, container_id: &str) -> Result<String> {
        let options = bollard::container::LogsOptions {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };

        self.client
            .docker()
            .logs(container_id, Some(options))
            .map_ok(|chunk| chunk.to_string())
            .try_collect::<String>()
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => ContainerError::NotFound(container_id.to_string()),
                e => ContainerError::ApiError(e),
            })
    }

    async fn is_port_listening(&self, container_id: &str, port: ContainerPort) -> Result<bool> {
        // The userland proxy accepts host connections before anything listens
        // inside, so both sides are checked.
        if !self.host_port_accepts(container_id, port).await? {
            return Ok(false);
        }

        let probe = ExecConfig::shell(executor::listening_probe_script(port.number()));
        let output = self.exec(container_id, &probe).await?;

        if output.not_runnable() {
            debug!(
                "In-container probe unavailable in {}, relying on host probe",
                container_id
            );
            return Ok(true);
        }

        Ok(output.success())
    }

    async fn terminate(&self, container_id: &str) -> Result<()> {
        // A stop failure still leaves removal with force to finish the job.
        if let Err(e) = self.stop_container(container_id).await {
            debug!("Stop before removal failed for {}: {}", container_id, e);
        }

        match self.remove_container(container_id).await {
            Ok(()) => {
                info!("Removed container: {}", container_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Container {} already removed", container_id);
                Ok(())
            }
            // Removal already in progress, e.g. auto-remove after stop.
            Err(ContainerError::ApiError(bollard::errors::Error::DockerResponseServerError {
                status_code: 409,
                ..
            })) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn container_exists(&self, container_id: &str) -> Result<bool> {
        self.client.container_exists(container_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Container, WaitFor};
    use crate::context::RunContext;
    use std::sync::Arc;

    #[tokio::test]
    #[ignore] // Requires Docker/Podman
    async fn test_container_lifecycle() {
        let runtime = Arc::new(DockerRuntime::connect(RuntimeSettings::default()).await.unwrap());
        let port = ContainerPort::tcp(4222);

        let spec = ContainerSpec::builder()
            .image("docker.io/library/nats:2-alpine")
            .expose(port)
            .wait_for(WaitFor::all([
                WaitFor::log("Server is ready"),
                WaitFor::listening_port(port),
            ]))
            .build()
            .unwrap();

        let container = Container::run(runtime.clone(), &spec).await.unwrap();
        let ctx = RunContext::with_timeout(Duration::from_secs(60));
        spec.wait_for().wait_until_ready(&ctx, &container).await.unwrap();

        let mapped = container.mapped_port(port).await.unwrap();
        assert_ne!(crate::container::parse_port(&mapped).unwrap(), 0);

        container.terminate().await.unwrap();
        assert!(!runtime.container_exists(container.id()).await.unwrap());
    }
}
