//! Basic PostgreSQL fixture example.
//!
//! This example demonstrates the fixture lifecycle:
//! - Connecting to the container runtime
//! - Starting PostgreSQL and waiting for readiness
//! - Querying it with the container's own psql
//! - Cleaning up
//!
//! Run with: cargo run --example postgres_basic

use std::sync::Arc;
use std::time::Duration;
use testbarrel::container::ExecConfig;
use testbarrel::{ContainerService, DockerRuntime, FixtureOptions, PostgresFixture, RunContext, RuntimeSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    testbarrel::testing::init_test_tracing();
    println!("🐘 PostgreSQL Fixture Example\n");

    // Step 1: Connect to Docker/Podman
    println!("1. Connecting to container runtime...");
    let runtime = Arc::new(DockerRuntime::connect(RuntimeSettings::discover()?).await?);
    println!("   ✓ Connected ({:?})\n", runtime.client().runtime_type().await?);

    // Step 2: Construct the fixture (creates its network)
    println!("2. Creating fixture...");
    let ctx = RunContext::with_timeout(Duration::from_secs(120));
    let options = FixtureOptions::new()
        .timeout(Duration::from_secs(90))
        .env_var("TZ", "UTC");
    let mut postgres = PostgresFixture::new(&ctx, runtime.clone(), options).await?;
    println!("   ✓ Network: {}\n", postgres.network_name());

    // Step 3: Start and wait for readiness
    println!("3. Starting PostgreSQL...");
    if let Err(e) = postgres.start().await {
        postgres.print_logs().await;
        postgres.close().await?;
        return Err(e.into());
    }
    let endpoint = postgres.service().endpoint();
    println!("   ✓ Ready at {}", endpoint.address());
    if let Some(url) = postgres.service().connection_url() {
        println!("   URL: {}\n", url);
    }

    // Step 4: Run a query
    println!("4. Querying...");
    if let Some(container) = postgres.service().container() {
        let query = ExecConfig::new(["psql", "-U", "test", "-d", "testdb", "-tAc", "SELECT version()"]);
        let output = runtime.exec(container.id(), &query).await?;
        println!("   {}\n", output.stdout.trim());
    }

    // Step 5: Cleanup
    println!("5. Cleaning up...");
    postgres.close().await?;
    println!("   ✓ Container and network removed\n");

    println!("✅ Example complete!");

    Ok(())
}
