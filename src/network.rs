//! Isolated fixture networks.
//!
//! Every fixture joins one attachable network so cooperating services can
//! address each other by alias. A fixture either creates that network (and
//! then owns it) or borrows one handed in through its options.

use crate::container::{ContainerRuntime, MANAGED_LABEL};
use crate::context::RunContext;
use crate::error::{FixtureError, Result};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Prefix of generated network names.
pub const NETWORK_NAME_PREFIX: &str = "testbarrel-net";

/// Label identifying networks created by the provisioner.
pub const NETWORK_LABEL: &str = "org.testbarrel.network";

/// One isolated network, identified by runtime id and unique name.
///
/// Handles are cheap to clone; pass a clone to another fixture's options to
/// let both services share the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkHandle {
    id: String,
    name: String,
}

impl NetworkHandle {
    /// Wrap an existing network.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Runtime network id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Network name, used as the key for container aliases.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for NetworkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Who is responsible for removing a fixture's network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkOwnership {
    /// Created by this fixture; removed on close
    Owned,
    /// Supplied by the caller; never removed by the fixture
    Borrowed,
}

/// Create a fresh attachable network with a unique name.
///
/// # Errors
///
/// Returns [`FixtureError::NetworkCreation`] if `ctx` is already done or the
/// runtime cannot allocate the network.
pub async fn provision_network(
    ctx: &RunContext,
    runtime: &dyn ContainerRuntime,
) -> Result<NetworkHandle> {
    let name = format!("{}-{}", NETWORK_NAME_PREFIX, uuid::Uuid::new_v4());
    let labels = HashMap::from([
        (MANAGED_LABEL.to_string(), "true".to_string()),
        (NETWORK_LABEL.to_string(), name.clone()),
    ]);

    debug!("Provisioning network {}", name);

    let id = ctx
        .run(runtime.create_network(&name, &labels))
        .await
        .map_err(|e| FixtureError::NetworkCreation(e.into()))?
        .map_err(FixtureError::NetworkCreation)?;

    info!("Provisioned network {} ({})", name, id);
    Ok(NetworkHandle::new(id, name))
}

/// Reuse `requested` verbatim or provision a new network.
///
/// # Errors
///
/// Returns [`FixtureError::NetworkCreation`] when a new network is needed and
/// cannot be created.
pub async fn resolve_network(
    ctx: &RunContext,
    runtime: &dyn ContainerRuntime,
    requested: Option<&NetworkHandle>,
) -> Result<(NetworkHandle, NetworkOwnership)> {
    match requested {
        Some(handle) => {
            debug!("Reusing network {}", handle);
            Ok((handle.clone(), NetworkOwnership::Borrowed))
        }
        None => {
            let handle = provision_network(ctx, runtime).await?;
            Ok((handle, NetworkOwnership::Owned))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_accessors() {
        let handle = NetworkHandle::new("abc123", "testbarrel-net-1");
        assert_eq!(handle.id(), "abc123");
        assert_eq!(handle.name(), "testbarrel-net-1");
        assert_eq!(handle.to_string(), "testbarrel-net-1");
        assert_eq!(handle.clone(), handle);
    }
}
