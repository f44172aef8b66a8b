//! Fixture-level errors.
//!
//! Each variant names the lifecycle step that failed and carries the
//! runtime-level [`ContainerError`] that caused it.

use crate::container::ContainerError;

/// Errors returned by fixtures and service adapters.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// Invalid fixture configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The isolated network could not be created
    #[error("Failed to create network: {0}")]
    NetworkCreation(#[source] ContainerError),

    /// Container creation, readiness or endpoint resolution failed
    #[error("Failed to start {service} container: {source}")]
    Start {
        /// Alias of the service being started
        service: String,
        /// Underlying cause
        #[source]
        source: ContainerError,
    },

    /// The runtime failed to stop or remove the container
    #[error("Failed to terminate {service} container: {source}")]
    Termination {
        /// Alias of the service being terminated
        service: String,
        /// Underlying cause
        #[source]
        source: ContainerError,
    },

    /// The network created by this fixture could not be removed
    #[error("Failed to remove network {network}: {source}")]
    NetworkRemoval {
        /// Network name
        network: String,
        /// Underlying cause
        #[source]
        source: ContainerError,
    },

    /// Container logs could not be fetched
    #[error("Failed to fetch {service} container logs: {source}")]
    Logs {
        /// Alias of the service
        service: String,
        /// Underlying cause
        #[source]
        source: ContainerError,
    },

    /// Connecting to the container runtime failed
    #[error("Container runtime unavailable: {0}")]
    Runtime(#[from] ContainerError),
}

impl FixtureError {
    /// Build a start error for `service`.
    pub fn start(service: impl Into<String>, source: impl Into<ContainerError>) -> Self {
        Self::Start {
            service: service.into(),
            source: source.into(),
        }
    }

    /// Build a termination error for `service`.
    pub fn termination(service: impl Into<String>, source: impl Into<ContainerError>) -> Self {
        Self::Termination {
            service: service.into(),
            source: source.into(),
        }
    }

    /// The runtime-level cause, if any.
    pub fn container_error(&self) -> Option<&ContainerError> {
        match self {
            FixtureError::Configuration(_) => None,
            FixtureError::NetworkCreation(source)
            | FixtureError::Runtime(source)
            | FixtureError::Start { source, .. }
            | FixtureError::Termination { source, .. }
            | FixtureError::NetworkRemoval { source, .. }
            | FixtureError::Logs { source, .. } => Some(source),
        }
    }

    /// Whether the operation stopped because its context was cancelled or
    /// ran past its deadline.
    pub fn is_cancelled(&self) -> bool {
        self.container_error()
            .is_some_and(ContainerError::is_interrupted)
    }
}

/// Result type for fixture operations.
pub type Result<T> = std::result::Result<T, FixtureError>;
