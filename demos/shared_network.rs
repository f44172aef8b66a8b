//! Two services on one network.
//!
//! PostgreSQL creates the network; NATS borrows it, so each service can
//! reach the other by alias. Closing NATS leaves the network in place.
//!
//! Run with: cargo run --example shared_network

use std::time::Duration;
use testbarrel::{ContainerService, FixtureOptions, NatsFixture, PostgresFixture, RunContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    testbarrel::testing::init_test_tracing();
    println!("🔗 Shared Network Example\n");

    let ctx = RunContext::with_timeout(Duration::from_secs(180));

    println!("1. Starting PostgreSQL...");
    let mut postgres = PostgresFixture::connect(&ctx, FixtureOptions::new()).await?;
    postgres.start().await?;
    println!(
        "   ✓ {} on {} ({:?})\n",
        postgres.service().host_alias(),
        postgres.network_name(),
        postgres.network_ownership()
    );

    println!("2. Starting NATS on the same network...");
    let options = FixtureOptions::new().network(postgres.network().clone());
    let mut nats = NatsFixture::connect(&ctx, options).await?;
    nats.start().await?;
    println!(
        "   ✓ {} on {} ({:?})\n",
        nats.service().host_alias(),
        nats.network_name(),
        nats.network_ownership()
    );

    println!("3. Endpoints:");
    for endpoint in [postgres.service().endpoint(), nats.service().endpoint()] {
        println!(
            "   {} → {} (alias on {})",
            endpoint.host_alias,
            endpoint.address(),
            endpoint.network_name
        );
    }
    println!();

    println!("4. Cleaning up...");
    nats.close().await?;
    println!("   ✓ NATS removed, network kept");
    postgres.close().await?;
    println!("   ✓ PostgreSQL and network removed\n");

    println!("✅ Example complete!");

    Ok(())
}
