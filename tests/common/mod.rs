//! In-memory container runtime for lifecycle tests that must not need
//! Docker.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use testbarrel::container::{ContainerError, ContainerPort, ContainerRuntime, ContainerSpec, Result};

/// Log output that satisfies both adapters' readiness conditions.
pub const READY_LOGS: &str =
    "LOG:  database system is ready to accept connections\n[1] Server is ready\n";

/// Records every call and answers from configurable canned values.
pub struct FakeRuntime {
    networks: Mutex<HashMap<String, String>>,
    removed_networks: Mutex<Vec<String>>,
    specs: Mutex<Vec<ContainerSpec>>,
    terminated: Mutex<Vec<String>>,
    create_calls: AtomicUsize,
    create_delay: Mutex<Duration>,
    network_seq: AtomicUsize,
    logs: Mutex<String>,
    mapped_port: Mutex<String>,
    listening: AtomicBool,
    fail_create: AtomicBool,
    fail_terminate: AtomicBool,
    fail_remove_network: AtomicBool,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self {
            networks: Mutex::new(HashMap::new()),
            removed_networks: Mutex::new(Vec::new()),
            specs: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
            create_delay: Mutex::new(Duration::ZERO),
            network_seq: AtomicUsize::new(0),
            logs: Mutex::new(READY_LOGS.to_string()),
            mapped_port: Mutex::new("49153".to_string()),
            listening: AtomicBool::new(true),
            fail_create: AtomicBool::new(false),
            fail_terminate: AtomicBool::new(false),
            fail_remove_network: AtomicBool::new(false),
        }
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_logs(&self, logs: &str) {
        *self.logs.lock().unwrap() = logs.to_string();
    }

    pub fn set_mapped_port(&self, port: &str) {
        *self.mapped_port.lock().unwrap() = port.to_string();
    }

    pub fn set_listening(&self, listening: bool) {
        self.listening.store(listening, Ordering::SeqCst);
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// Make `create_container` take `delay` after recording the spec, like
    /// an engine that is slow to answer.
    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = delay;
    }

    pub fn fail_terminate(&self) {
        self.fail_terminate.store(true, Ordering::SeqCst);
    }

    pub fn recover_terminate(&self) {
        self.fail_terminate.store(false, Ordering::SeqCst);
    }

    pub fn fail_remove_network(&self) {
        self.fail_remove_network.store(true, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Networks created and not yet removed, keyed by id.
    pub fn live_networks(&self) -> HashMap<String, String> {
        self.networks.lock().unwrap().clone()
    }

    pub fn removed_networks(&self) -> Vec<String> {
        self.removed_networks.lock().unwrap().clone()
    }

    /// Specs passed to `create_container`, in call order.
    pub fn specs(&self) -> Vec<ContainerSpec> {
        self.specs.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_network(&self, name: &str, _labels: &HashMap<String, String>) -> Result<String> {
        let id = format!("net-{}", self.network_seq.fetch_add(1, Ordering::SeqCst));
        self.networks
            .lock()
            .unwrap()
            .insert(id.clone(), name.to_string());
        Ok(id)
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        if self.fail_remove_network.load(Ordering::SeqCst) {
            return Err(ContainerError::NetworkError("network has active endpoints".to_string()));
        }
        if self.networks.lock().unwrap().remove(network_id).is_none() {
            return Err(ContainerError::NotFound(network_id.to_string()));
        }
        self.removed_networks
            .lock()
            .unwrap()
            .push(network_id.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ContainerError::Other("image not found".to_string()));
        }
        self.specs.lock().unwrap().push(spec.clone());

        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(format!("{:064x}", n + 1))
    }

    async fn start_container(&self, _container_id: &str) -> Result<()> {
        Ok(())
    }

    async fn is_running(&self, container_id: &str) -> Result<bool> {
        Ok(!self.terminated.lock().unwrap().iter().any(|id| id == container_id))
    }

    async fn host(&self, _container_id: &str) -> Result<String> {
        Ok("localhost".to_string())
    }

    async fn mapped_port(&self, _container_id: &str, _port: ContainerPort) -> Result<String> {
        Ok(self.mapped_port.lock().unwrap().clone())
    }

    async fn logs(&self, _container_id: &str) -> Result<String> {
        Ok(self.logs.lock().unwrap().clone())
    }

    async fn is_port_listening(&self, _container_id: &str, _port: ContainerPort) -> Result<bool> {
        Ok(self.listening.load(Ordering::SeqCst))
    }

    async fn terminate(&self, container_id: &str) -> Result<()> {
        if self.fail_terminate.load(Ordering::SeqCst) {
            return Err(ContainerError::Other("device or resource busy".to_string()));
        }
        self.terminated
            .lock()
            .unwrap()
            .push(container_id.to_string());
        Ok(())
    }

    async fn container_exists(&self, container_id: &str) -> Result<bool> {
        Ok(!self.terminated.lock().unwrap().iter().any(|id| id == container_id))
    }
}
