//! Helpers for test suites that use fixtures.

use std::process::Command;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Environment variable that disables container-backed tests.
pub const SKIP_CONTAINER_TESTS_VAR: &str = "SKIP_CONTAINER_TESTS";

const DEFAULT_TEST_FILTER: &str = "testbarrel=info";

static INIT_TRACING: Once = Once::new();

/// Install a `tracing` subscriber that writes through the test harness, so
/// fixture logs show up next to the failing test.
///
/// Honors `RUST_LOG`; defaults to `testbarrel=info`. Safe to call from every
/// test.
pub fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));

        // Another subscriber may already be installed by the test binary.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Whether container-backed tests can run here.
///
/// False when `SKIP_CONTAINER_TESTS` is `1` or `true`, or when neither
/// `docker info` nor `podman info` succeeds.
pub fn runtime_available() -> bool {
    if let Ok(value) = std::env::var(SKIP_CONTAINER_TESTS_VAR)
        && (value == "1" || value.eq_ignore_ascii_case("true"))
    {
        return false;
    }

    ["docker", "podman"].iter().any(|binary| {
        Command::new(binary)
            .arg("info")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
        tracing::info!("tracing initialized twice without panicking");
    }
}
