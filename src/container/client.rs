//! Docker/Podman client wrapper.
//!
//! Provides a simplified interface to the bollard Docker API with connection
//! fallback strategies, health checking and the inspection helpers the
//! runtime needs (state, published ports, daemon host).

use crate::container::{ContainerError, ContainerPort, Result};
use crate::settings::RuntimeSettings;
use bollard::Docker;
use bollard::models::ContainerInspectResponse;
use std::sync::Arc;
use tracing::{debug, info};

/// Container client configuration.
#[derive(Debug, Clone)]
pub struct ContainerClientConfig {
    /// Explicit engine endpoint; local defaults are tried when unset
    pub docker_host: Option<String>,
    /// Connection timeout in seconds
    pub timeout: u64,
}

impl Default for ContainerClientConfig {
    fn default() -> Self {
        Self {
            docker_host: None,
            timeout: 120,
        }
    }
}

impl From<&RuntimeSettings> for ContainerClientConfig {
    fn from(settings: &RuntimeSettings) -> Self {
        Self {
            docker_host: settings.docker_host.clone(),
            timeout: settings.connect_timeout_secs,
        }
    }
}

/// Docker/Podman API client wrapper.
#[derive(Clone)]
pub struct ContainerClient {
    docker: Arc<Docker>,
    config: ContainerClientConfig,
}

impl ContainerClient {
    /// Create a new container client with default configuration.
    ///
    /// Attempts to connect to Docker first, then falls back to Podman if available.
    ///
    /// # Errors
    ///
    /// Returns error if neither Docker nor Podman are available or connection fails.
    pub async fn new() -> Result<Self> {
        Self::with_config(ContainerClientConfig::default()).await
    }

    /// Create a new container client with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns error if connection to container runtime fails.
    pub async fn with_config(config: ContainerClientConfig) -> Result<Self> {
        let docker = Self::connect(&config)?;

        let client = Self {
            docker: Arc::new(docker),
            config,
        };

        // Verify connection works
        client.ping().await?;

        Ok(client)
    }

    /// Open a client for the configured endpoint, or the first local one
    /// that accepts a connection: `DOCKER_HOST`/default socket, then the
    /// rootless and system Podman sockets.
    fn connect(config: &ContainerClientConfig) -> Result<Docker> {
        if let Some(host) = &config.docker_host {
            debug!("Using configured engine endpoint {}", host);
            return Self::connect_to(host, config.timeout);
        }

        match Docker::connect_with_local_defaults() {
            Ok(docker) => return Ok(docker),
            Err(e) => debug!("No Docker endpoint from local defaults: {}", e),
        }

        #[cfg(unix)]
        for socket in podman_sockets() {
            if let Ok(docker) = Self::connect_to(&socket, config.timeout) {
                info!("Falling back to Podman at {}", socket);
                return Ok(docker);
            }
        }

        Err(ContainerError::Connection(
            "no Docker or Podman endpoint found; start a daemon or set TESTBARREL_DOCKER_HOST"
                .to_string(),
        ))
    }

    fn connect_to(host: &str, timeout: u64) -> Result<Docker> {
        let connected = if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, timeout, bollard::API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_socket(host, timeout, bollard::API_DEFAULT_VERSION)
        };

        connected.map_err(|e| ContainerError::Connection(format!("{}: {}", host, e)))
    }

    /// Ping the container runtime to verify connectivity.
    ///
    /// # Errors
    ///
    /// Returns error if ping fails.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map_err(|e| {
            ContainerError::Connection(format!("Failed to ping container runtime: {}", e))
        })?;
        debug!("Container runtime ping successful");
        Ok(())
    }

    /// Get the underlying Docker client.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Which engine answers on the endpoint. Podman reports itself as a
    /// version component.
    ///
    /// # Errors
    ///
    /// Returns error if the version query fails.
    pub async fn runtime_type(&self) -> Result<RuntimeType> {
        let components = self.docker.version().await?.components.unwrap_or_default();

        Ok(
            if components
                .iter()
                .any(|component| component.name.to_lowercase().contains("podman"))
            {
                RuntimeType::Podman
            } else {
                RuntimeType::Docker
            },
        )
    }

    /// Host under which published container ports are reachable.
    ///
    /// A TCP endpoint means the engine runs elsewhere and ports are published
    /// on that machine; a local socket means they are on localhost.
    pub fn daemon_host(&self) -> String {
        let endpoint = self
            .config
            .docker_host
            .clone()
            .or_else(|| std::env::var("DOCKER_HOST").ok());

        endpoint
            .as_deref()
            .and_then(|endpoint| {
                endpoint
                    .strip_prefix("tcp://")
                    .or_else(|| endpoint.strip_prefix("http://"))
            })
            .and_then(|rest| rest.split(':').next())
            .filter(|host| !host.is_empty())
            .unwrap_or("localhost")
            .to_string()
    }

    /// Whether `image` is already in the local image store.
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be queried.
    pub async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            inspected => inspected.map(|_| true).map_err(ContainerError::ApiError),
        }
    }

    /// Inspect a container by name or ID.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotFound`] for unknown containers.
    pub async fn inspect(&self, name_or_id: &str) -> Result<ContainerInspectResponse> {
        self.docker
            .inspect_container(
                name_or_id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => ContainerError::NotFound(name_or_id.to_string()),
                e => ContainerError::ApiError(e),
            })
    }

    /// Check if a container exists by name or ID.
    ///
    /// # Errors
    ///
    /// Returns error if inspection fails for reasons other than not found.
    pub async fn container_exists(&self, name_or_id: &str) -> Result<bool> {
        match self.inspect(name_or_id).await {
            Ok(_) => Ok(true),
            Err(ContainerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lifecycle state of a container by name or ID.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotFound`] for unknown containers.
    pub async fn container_state(&self, name_or_id: &str) -> Result<ContainerState> {
        let state = self.inspect(name_or_id).await?.state.ok_or_else(|| {
            ContainerError::Other(format!("Container {} has no state", name_or_id))
        })?;

        Ok(match (state.running, state.restarting, state.paused) {
            (_, Some(true), _) => ContainerState::Restarting,
            (_, _, Some(true)) => ContainerState::Paused,
            (Some(true), _, _) => ContainerState::Running,
            _ => ContainerState::Exited {
                exit_code: state.exit_code,
            },
        })
    }

    /// Host port published for `port`.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotFound`] if the port has no host binding.
    pub async fn published_port(&self, name_or_id: &str, port: ContainerPort) -> Result<String> {
        let inspect = self.inspect(name_or_id).await?;
        let key = port.to_string();

        inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .and_then(|mut ports| ports.remove(&key))
            .flatten()
            .and_then(|bindings| bindings.into_iter().find_map(|binding| binding.host_port))
            .filter(|host_port| !host_port.is_empty())
            .ok_or_else(|| {
                ContainerError::NotFound(format!("No host binding for {} on {}", key, name_or_id))
            })
    }
}

#[cfg(unix)]
fn podman_sockets() -> Vec<String> {
    std::env::var("XDG_RUNTIME_DIR")
        .ok()
        .map(|dir| format!("unix://{}/podman/podman.sock", dir))
        .into_iter()
        .chain(std::iter::once("unix:///run/podman/podman.sock".to_string()))
        .collect()
}

/// Container lifecycle state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    /// Restart policy is bringing the container back
    Restarting,
    Paused,
    /// Created but never started, stopped, or dead
    Exited {
        /// Exit code, when the engine knows it
        exit_code: Option<i64>,
    },
}

impl ContainerState {
    /// Whether the container's processes are alive or coming back.
    pub fn is_alive(&self) -> bool {
        matches!(self, ContainerState::Running | ContainerState::Restarting)
    }
}

/// Type of container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeType {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeType::Docker => write!(f, "Docker"),
            RuntimeType::Podman => write!(f, "Podman"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_from_settings() {
        let settings = RuntimeSettings {
            docker_host: Some("tcp://10.0.0.5:2375".to_string()),
            connect_timeout_secs: 5,
            ..Default::default()
        };

        let config = ContainerClientConfig::from(&settings);
        assert_eq!(config.docker_host.as_deref(), Some("tcp://10.0.0.5:2375"));
        assert_eq!(config.timeout, 5);
    }

    #[test]
    fn test_daemon_host_follows_tcp_endpoint() {
        let remote = ContainerClientConfig {
            docker_host: Some("tcp://10.0.0.5:2375".to_string()),
            timeout: 5,
        };
        let client = ContainerClient {
            docker: Arc::new(ContainerClient::connect(&remote).unwrap()),
            config: remote,
        };
        assert_eq!(client.daemon_host(), "10.0.0.5");
    }

    #[test]
    fn test_container_state_liveness() {
        assert!(ContainerState::Running.is_alive());
        assert!(ContainerState::Restarting.is_alive());
        assert!(!ContainerState::Paused.is_alive());
        assert!(!ContainerState::Exited { exit_code: Some(1) }.is_alive());
    }

    #[tokio::test]
    #[ignore] // Requires Docker/Podman to be running
    async fn test_client_connection() {
        let client = ContainerClient::new().await.unwrap();
        client.ping().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_runtime_detection() {
        let client = ContainerClient::new().await.unwrap();
        let runtime_type = client.runtime_type().await.unwrap();
        println!("Runtime type: {}", runtime_type);
    }
}
