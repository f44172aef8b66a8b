//! Integration tests against a real Docker/Podman daemon.
//!
//! Skipped when no runtime is available or SKIP_CONTAINER_TESTS=1.

use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use test_tag::tag;
use testbarrel::container::{ContainerRuntime, ExecConfig};
use testbarrel::testing::{init_test_tracing, runtime_available};
use testbarrel::{
    ContainerService, DockerRuntime, FixtureOptions, NatsFixture, PostgresFixture, RunContext,
    RuntimeSettings,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const TEST_TIMEOUT: Duration = Duration::from_secs(180);

async fn docker() -> Option<Arc<DockerRuntime>> {
    init_test_tracing();
    if !runtime_available() {
        eprintln!("Skipping container tests (Docker/Podman not available or SKIP_CONTAINER_TESTS=1)");
        return None;
    }

    let settings = RuntimeSettings::discover().expect("settings");
    let runtime = DockerRuntime::connect(settings)
        .await
        .expect("Failed to connect to Docker/Podman");
    Some(Arc::new(runtime))
}

fn options() -> FixtureOptions {
    FixtureOptions::new().timeout(Duration::from_secs(120))
}

#[tokio::test]
#[tag(docker)]
#[serial]
async fn test_postgres_fixture_defaults() {
    let Some(runtime) = docker().await else { return };
    let ctx = RunContext::with_timeout(TEST_TIMEOUT);

    let mut fixture = PostgresFixture::new(&ctx, runtime.clone(), options())
        .await
        .expect("network");
    fixture.start().await.expect("postgres should start");

    let service = fixture.service();
    assert_eq!(service.host_alias(), "postgres");
    assert_ne!(service.port(), 0);
    assert!(!service.host().is_empty());
    assert!(service.network_name().starts_with("testbarrel-net-"));

    TcpStream::connect((service.host(), service.port()))
        .await
        .expect("postgres port should accept connections");

    let container_id = service.container().expect("container").id().to_string();
    fixture.print_logs().await;
    fixture.close().await.expect("close");

    assert!(!runtime.container_exists(&container_id).await.unwrap());
}

#[tokio::test]
#[tag(docker)]
#[serial]
async fn test_postgres_query_round_trip() {
    let Some(runtime) = docker().await else { return };
    let ctx = RunContext::with_timeout(TEST_TIMEOUT);

    let mut fixture = PostgresFixture::new(&ctx, runtime.clone(), options())
        .await
        .expect("network");
    fixture.start().await.expect("postgres should start");

    let container_id = fixture.service().container().expect("container").id().to_string();
    let psql = |sql: &str| {
        ExecConfig::new(["psql", "-U", "test", "-d", "testdb", "-v", "ON_ERROR_STOP=1", "-tAc", sql])
            .env("PGPASSWORD", "12345")
    };

    let write = runtime
        .exec(
            &container_id,
            &psql("CREATE TABLE notes (body text); INSERT INTO notes VALUES ('round trip');"),
        )
        .await
        .expect("exec");
    assert!(write.success(), "write failed: {}", write.combined());

    let read = runtime
        .exec(&container_id, &psql("SELECT body FROM notes"))
        .await
        .expect("exec");
    assert!(read.success(), "read failed: {}", read.combined());
    assert_eq!(read.stdout.trim(), "round trip");

    fixture.close().await.expect("close");
}

#[tokio::test]
#[tag(docker)]
#[serial]
async fn test_nats_publish_subscribe_round_trip() {
    let Some(runtime) = docker().await else { return };
    let ctx = RunContext::with_timeout(TEST_TIMEOUT);

    let mut fixture = NatsFixture::new(&ctx, runtime.clone(), options())
        .await
        .expect("network");
    fixture.start().await.expect("nats should start");

    let service = fixture.service();
    assert_eq!(service.host_alias(), "nats");
    assert_ne!(service.port(), 0);

    let stream = TcpStream::connect((service.host(), service.port()))
        .await
        .expect("connect");
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let info = lines.next_line().await.unwrap().expect("INFO line");
    assert!(info.starts_with("INFO "), "unexpected greeting: {}", info);

    writer
        .write_all(b"CONNECT {\"verbose\":false}\r\nSUB greetings 1\r\nPUB greetings 5\r\nhello\r\nPING\r\n")
        .await
        .unwrap();

    let mut received = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(line) = lines.next_line().await.unwrap() {
            let done = line == "hello";
            received.push(line);
            if done {
                break;
            }
        }
    })
    .await;

    assert!(read.is_ok(), "no message within 10s, got {:?}", received);
    assert!(received.iter().any(|l| l.starts_with("MSG greetings 1 5")));

    fixture.close().await.expect("close");
}

#[tokio::test]
#[tag(docker)]
#[serial]
async fn test_services_reach_each_other_by_alias() {
    let Some(runtime) = docker().await else { return };
    let ctx = RunContext::with_timeout(TEST_TIMEOUT);

    let mut postgres = PostgresFixture::new(&ctx, runtime.clone(), options())
        .await
        .expect("network");
    postgres.start().await.expect("postgres should start");

    let mut nats = NatsFixture::new(
        &ctx,
        runtime.clone(),
        options().network(postgres.network().clone()),
    )
    .await
    .expect("shared network");
    nats.start().await.expect("nats should start");

    assert_eq!(nats.network_name(), postgres.network_name());

    // The postgres image ships bash, whose /dev/tcp resolves the alias.
    let postgres_id = postgres.service().container().expect("container").id().to_string();
    let probe = ExecConfig::shell("bash -c '</dev/tcp/nats/4222' && echo reachable");
    let output = runtime.exec(&postgres_id, &probe).await.expect("exec");
    assert!(output.success(), "alias lookup failed: {}", output.combined());
    assert_eq!(output.stdout.trim(), "reachable");

    nats.close().await.expect("close nats");
    postgres.close().await.expect("close postgres");
}

#[tokio::test]
#[tag(docker)]
#[serial]
async fn test_fixed_host_port() {
    let Some(runtime) = docker().await else { return };
    let ctx = RunContext::with_timeout(TEST_TIMEOUT);

    let mut fixture = NatsFixture::new(&ctx, runtime.clone(), options().port("14222"))
        .await
        .expect("network");
    fixture.start().await.expect("nats should start");

    assert_eq!(fixture.service().port(), 14222);
    assert_eq!(
        fixture.service().connection_url().unwrap().port(),
        Some(14222)
    );

    fixture.close().await.expect("close");
}
