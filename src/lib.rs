//! # testbarrel
//!
//! Disposable backing services for integration tests. A fixture starts a
//! PostgreSQL or NATS container on an isolated network, waits until the
//! service really accepts connections, hands out its endpoint and removes
//! everything again on close.
//!
//! ## Architecture Overview
//!
//! - **[`config`]**: Fixture configuration composed from ordered overrides
//! - **[`network`]**: Per-fixture network provisioning and ownership
//! - **[`service`]**: The service capability and its PostgreSQL/NATS adapters
//! - **[`fixture`]**: Lifecycle orchestration over one adapter
//! - **[`container`]**: Container runtime abstraction backed by Docker/Podman
//! - **[`context`]**: Cancellation and deadlines for every blocking step
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use testbarrel::{ContainerService, FixtureOptions, NatsFixture, PostgresFixture, RunContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = RunContext::with_timeout(Duration::from_secs(120));
//!
//!     let mut postgres = PostgresFixture::connect(&ctx, FixtureOptions::new()).await?;
//!     postgres.start().await?;
//!
//!     // Join the same network so NATS can reach "postgres:5432".
//!     let options = FixtureOptions::new().network(postgres.network().clone());
//!     let mut nats = NatsFixture::connect(&ctx, options).await?;
//!     nats.start().await?;
//!
//!     println!("postgres: {:?}", postgres.service().connection_url());
//!     println!("nats: {:?}", nats.service().connection_url());
//!
//!     nats.close().await?;
//!     postgres.close().await?;
//!     Ok(())
//! }
//! ```

/// Fixture configuration and override composition.
pub mod config;

/// Container runtime abstraction.
///
/// Container specifications, readiness conditions and the Docker/Podman
/// runtime built on bollard.
pub mod container;

/// Cancellation and deadline propagation.
pub mod context;

pub mod error;

/// Fixture lifecycle orchestration.
pub mod fixture;

/// Isolated fixture networks.
pub mod network;

/// Service capability and adapters.
pub mod service;

/// Runtime connection settings loaded from TOML and the environment.
pub mod settings;

/// Helpers for test suites.
pub mod testing;

pub use config::{ConfigOverride, FixtureConfig, FixtureOptions};
pub use container::{Container, ContainerError, ContainerRuntime, DockerRuntime};
pub use context::{ContextError, RunContext};
pub use error::{FixtureError, Result};
pub use fixture::{Fixture, FixtureState, NatsFixture, PostgresFixture};
pub use network::{NetworkHandle, NetworkOwnership};
pub use service::{ContainerService, Endpoint, NatsService, PostgresService};
pub use settings::RuntimeSettings;
