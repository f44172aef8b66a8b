//! Container runtime layer.
//!
//! Everything the fixtures need from a container engine goes through the
//! [`ContainerRuntime`] trait: a declarative [`ContainerSpec`] goes in, a
//! [`Container`] handle comes out. [`DockerRuntime`] implements the trait on
//! top of the Docker/Podman Engine API via bollard.
//!
//! ## Components
//!
//! - [`client`]: Docker/Podman API client wrapper with connection fallback
//! - [`spec`]: Declarative container specification builder
//! - [`wait`]: Readiness conditions and their combinator
//! - [`runtime`]: The runtime capability trait and container handle
//! - [`docker`]: bollard-backed runtime implementation
//! - [`network`]: Attachable network creation and removal
//! - [`executor`]: Command execution inside running containers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use testbarrel::container::{ContainerPort, ContainerSpec, DockerRuntime, WaitFor};
//! use testbarrel::RunContext;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Arc::new(DockerRuntime::connect_default().await?);
//!     let ctx = RunContext::with_timeout(std::time::Duration::from_secs(60));
//!
//!     let port = ContainerPort::tcp(6379);
//!     let spec = ContainerSpec::builder()
//!         .image("redis:7-alpine")
//!         .expose(port)
//!         .wait_for(WaitFor::listening_port(port))
//!         .build()?;
//!
//!     let container = testbarrel::container::Container::run(runtime, &spec).await?;
//!     spec.wait_for().wait_until_ready(&ctx, &container).await?;
//!     println!("redis on {}", container.mapped_port(port).await?);
//!     container.terminate().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod docker;
mod executor;
mod network;
mod runtime;
mod spec;
mod wait;

pub use client::{ContainerClient, ContainerClientConfig, RuntimeType};
pub use docker::DockerRuntime;
pub use executor::{ExecConfig, ExecOutput};
pub use network::{NetworkConfig, NetworkManager};
pub use runtime::{Container, ContainerRuntime, parse_port};
pub use spec::{ContainerPort, ContainerSpec, ContainerSpecBuilder, PortProtocol};
pub use wait::{LogPattern, WaitFor};

use crate::context::ContextError;

/// Label marking containers and networks created by this crate.
pub const MANAGED_LABEL: &str = "org.testbarrel.managed";

/// Label carrying the service alias of a fixture container.
pub const SERVICE_LABEL: &str = "org.testbarrel.service";

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Docker/Podman API error
    #[error("Container API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// Could not reach the container runtime
    #[error("Connection error: {0}")]
    Connection(String),

    /// Container or network not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Container configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Command execution error
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A readiness condition did not hold within its startup timeout
    #[error("Readiness timed out after {timeout:?} waiting for {condition}")]
    ReadinessTimeout {
        /// Human readable description of the condition
        condition: String,
        /// The timeout that expired
        timeout: std::time::Duration,
    },

    /// The container stopped while we were waiting for it
    #[error("Container {0} exited before becoming ready")]
    ContainerExited(String),

    /// The runtime reported a mapped port that is not a valid port number
    #[error("Invalid mapped port '{0}'")]
    InvalidPort(String),

    /// The execution context was cancelled or its deadline passed
    #[error("Interrupted: {0}")]
    Interrupted(#[from] ContextError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// General error
    #[error("Container error: {0}")]
    Other(String),
}

impl ContainerError {
    /// Whether this error comes from a cancelled or expired context.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ContainerError::Interrupted(_))
    }

    /// Whether the runtime answered with HTTP 404 for the target object.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ContainerError::NotFound(_)
                | ContainerError::ApiError(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404,
                    ..
                })
        )
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
