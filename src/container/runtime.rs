//! The container runtime capability.
//!
//! Fixtures treat the container engine as an opaque service: they hand it a
//! [`ContainerSpec`] and get back an id wrapped in a [`Container`] handle.

use crate::container::{ContainerError, ContainerPort, ContainerSpec, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Operations a container engine must provide.
///
/// Implementations must be cheap to share behind an `Arc`; fixtures clone the
/// `Arc` into every adapter and container handle they create.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create an attachable network named `name` and return its id.
    async fn create_network(&self, name: &str, labels: &HashMap<String, String>) -> Result<String>;

    /// Remove a network by id or name.
    async fn remove_network(&self, network_id: &str) -> Result<()>;

    /// Create a container from `spec` without starting it, returning its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Start a created container.
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Create and start a container from `spec`, returning its id.
    ///
    /// A container that fails to start is removed again. Readiness is not
    /// awaited here; see [`crate::container::WaitFor`].
    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        let container_id = self.create_container(spec).await?;

        if let Err(e) = self.start_container(&container_id).await {
            if let Err(cleanup) = self.terminate(&container_id).await {
                warn!("Failed to remove unstarted container {}: {}", container_id, cleanup);
            }
            return Err(e);
        }

        Ok(container_id)
    }

    /// Whether the container is currently running.
    async fn is_running(&self, container_id: &str) -> Result<bool>;

    /// Host address under which the container's published ports are reachable.
    async fn host(&self, container_id: &str) -> Result<String>;

    /// Host port published for `port`, as reported by the runtime.
    async fn mapped_port(&self, container_id: &str, port: ContainerPort) -> Result<String>;

    /// The container's full stdout/stderr output so far.
    async fn logs(&self, container_id: &str) -> Result<String>;

    /// Whether `port` is accepting connections.
    async fn is_port_listening(&self, container_id: &str, port: ContainerPort) -> Result<bool>;

    /// Stop and remove the container. Removing a container that is already
    /// gone succeeds.
    async fn terminate(&self, container_id: &str) -> Result<()>;

    /// Whether a container with this id or name still exists.
    async fn container_exists(&self, container_id: &str) -> Result<bool>;
}

/// Handle to a container created through a [`ContainerRuntime`].
#[derive(Clone)]
pub struct Container {
    id: String,
    runtime: Arc<dyn ContainerRuntime>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container").field("id", &self.id).finish()
    }
}

impl Container {
    /// Wrap an existing container id.
    pub fn new(id: impl Into<String>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            id: id.into(),
            runtime,
        }
    }

    /// Create and start a container from `spec`.
    ///
    /// Not cancellation safe: dropping the future between create and start
    /// leaves the container behind. Fixtures use [`Container::create`] and
    /// [`Container::start`] instead.
    ///
    /// # Errors
    ///
    /// Returns error if the runtime fails to create or start the container.
    pub async fn run(runtime: Arc<dyn ContainerRuntime>, spec: &ContainerSpec) -> Result<Self> {
        let id = runtime.run_container(spec).await?;
        Ok(Self { id, runtime })
    }

    /// Create a container from `spec` without starting it.
    ///
    /// # Errors
    ///
    /// Returns error if the runtime cannot create the container.
    pub async fn create(runtime: Arc<dyn ContainerRuntime>, spec: &ContainerSpec) -> Result<Self> {
        let id = runtime.create_container(spec).await?;
        Ok(Self { id, runtime })
    }

    /// Start the container.
    ///
    /// # Errors
    ///
    /// Returns error if the runtime cannot start it, e.g. because the host
    /// port is taken.
    pub async fn start(&self) -> Result<()> {
        self.runtime.start_container(&self.id).await
    }

    /// Container id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Short form of the id used in diagnostics.
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }

    /// Host address of the container's published ports.
    ///
    /// # Errors
    ///
    /// Returns error if the runtime cannot inspect the container.
    pub async fn host(&self) -> Result<String> {
        self.runtime.host(&self.id).await
    }

    /// Host port published for `port`, unparsed.
    ///
    /// # Errors
    ///
    /// Returns error if the port is not published.
    pub async fn mapped_port(&self, port: ContainerPort) -> Result<String> {
        self.runtime.mapped_port(&self.id, port).await
    }

    /// Full log output.
    ///
    /// # Errors
    ///
    /// Returns error if the log stream cannot be read.
    pub async fn logs(&self) -> Result<String> {
        self.runtime.logs(&self.id).await
    }

    /// Whether the container is running.
    ///
    /// # Errors
    ///
    /// Returns error if the container cannot be inspected.
    pub async fn is_running(&self) -> Result<bool> {
        self.runtime.is_running(&self.id).await
    }

    /// Whether `port` accepts connections.
    ///
    /// # Errors
    ///
    /// Returns error if the runtime cannot probe the port.
    pub async fn is_port_listening(&self, port: ContainerPort) -> Result<bool> {
        self.runtime.is_port_listening(&self.id, port).await
    }

    /// Stop and remove the container.
    ///
    /// # Errors
    ///
    /// Returns error if the runtime refuses to remove the container.
    pub async fn terminate(&self) -> Result<()> {
        self.runtime.terminate(&self.id).await
    }
}

/// Convert a runtime-reported port into a port number.
///
/// # Errors
///
/// Returns [`ContainerError::InvalidPort`] for anything that is not a nonzero
/// 16-bit number.
pub fn parse_port(text: &str) -> Result<u16> {
    match text.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(ContainerError::InvalidPort(text.to_string())),
        Ok(port) => Ok(port),
    }
}
