//! Fixture network management.
//!
//! Fixture networks are user-defined bridge networks created attachable, so
//! services started one after another can join them and resolve each other by
//! alias.

use crate::container::{ContainerError, MANAGED_LABEL, Result};
use bollard::Docker;
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use std::collections::HashMap;
use tracing::{debug, info};

const DEFAULT_DRIVER: &str = "bridge";

/// How a fixture network is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Unique network name; container aliases are scoped to it
    pub name: String,
    /// Network driver
    pub driver: String,
    /// Network labels; the managed label is always added
    pub labels: HashMap<String, String>,
}

impl NetworkConfig {
    /// Attachable bridge network named `name`.
    pub fn bridge(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: DEFAULT_DRIVER.to_string(),
            labels: HashMap::new(),
        }
    }

    /// Add labels, replacing existing keys.
    pub fn with_labels<'a>(mut self, labels: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.labels
            .extend(labels.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    fn engine_labels(&self) -> HashMap<&str, &str> {
        let mut labels: HashMap<&str, &str> = self
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        labels.insert(MANAGED_LABEL, "true");
        labels
    }
}

/// Creates and removes fixture networks.
pub struct NetworkManager {
    docker: Docker,
}

impl NetworkManager {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Create an attachable network and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NetworkError`] naming the network if the
    /// engine refuses, e.g. on a name clash or exhausted address pools.
    pub async fn create_network(&self, config: &NetworkConfig) -> Result<String> {
        debug!("Creating network: {}", config.name);

        let options = CreateNetworkOptions {
            name: config.name.as_str(),
            driver: config.driver.as_str(),
            attachable: true,
            check_duplicate: true,
            labels: config.engine_labels(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_network(options)
            .await
            .map_err(|e| ContainerError::NetworkError(format!("{}: {}", config.name, e)))?;

        info!("Created network: {} ({})", config.name, response.id);
        Ok(response.id)
    }

    /// Remove a network by id or name.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotFound`] when the network is already gone,
    /// otherwise the engine error (typically endpoints still attached).
    pub async fn remove_network(&self, network_id: &str) -> Result<()> {
        debug!("Removing network: {}", network_id);

        match self.docker.remove_network(network_id).await {
            Ok(()) => {
                debug!("Removed network: {}", network_id);
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(ContainerError::NotFound(format!("network {}", network_id))),
            Err(e) => Err(ContainerError::ApiError(e)),
        }
    }

    /// Whether a network with this id or name exists.
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be queried.
    pub async fn network_exists(&self, network: &str) -> Result<bool> {
        let inspected = self
            .docker
            .inspect_network(network, None::<InspectNetworkOptions<String>>)
            .await;

        match inspected {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ContainerError::ApiError(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_config_carries_managed_label() {
        let extra = HashMap::from([("org.testbarrel.network".to_string(), "n1".to_string())]);
        let config = NetworkConfig::bridge("n1").with_labels(&extra);

        assert_eq!(config.driver, "bridge");
        let labels = config.engine_labels();
        assert_eq!(labels[MANAGED_LABEL], "true");
        assert_eq!(labels["org.testbarrel.network"], "n1");
    }

    #[tokio::test]
    #[ignore] // Requires Docker/Podman
    async fn test_network_lifecycle() {
        let docker = Docker::connect_with_local_defaults().unwrap();
        let manager = NetworkManager::new(docker);
        let config = NetworkConfig::bridge(format!("testbarrel-net-{}", uuid::Uuid::new_v4()));

        let network_id = manager.create_network(&config).await.unwrap();
        assert!(manager.network_exists(&config.name).await.unwrap());

        manager.remove_network(&network_id).await.unwrap();
        assert!(!manager.network_exists(&config.name).await.unwrap());
        assert!(manager.remove_network(&network_id).await.unwrap_err().is_not_found());
    }
}
