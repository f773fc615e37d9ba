use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CoordinatorError, Result};

pub const DEFAULT_WORKER_SERVICE_BASE: &str = "/batfishservice";

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Address of the client-facing HTTP API.
    pub listen_addr: SocketAddr,
    /// Delay between assignment cycles.
    pub assign_interval_ms: u64,
    /// Delay between status-check cycles.
    pub check_interval_ms: u64,
    /// Upper bound on any single dispatch or poll RPC.
    pub rpc_timeout_ms: u64,
    /// Record/worker pairs reserved per assignment tick. 1 gives one
    /// assignment per tick.
    pub max_assignments_per_tick: usize,
    /// Assigned records polled per check tick.
    pub max_checks_per_tick: usize,
    /// Root directory for uploaded snapshots, also handed to workers as `datadir`.
    pub storage_location: PathBuf,
    /// Path prefix of the worker service endpoints.
    pub worker_service_base: String,
    /// Workers registered at startup (host:port).
    pub workers: Vec<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9996)),
            assign_interval_ms: 1000,
            check_interval_ms: 1000,
            rpc_timeout_ms: 5000,
            max_assignments_per_tick: 8,
            max_checks_per_tick: 8,
            storage_location: PathBuf::from("testrigs"),
            worker_service_base: DEFAULT_WORKER_SERVICE_BASE.to_string(),
            workers: Vec::new(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_worker(mut self, address: impl Into<String>) -> Self {
        self.workers.push(address.into());
        self
    }

    pub fn assign_interval(&self) -> Duration {
        Duration::from_millis(self.assign_interval_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.assign_interval_ms == 0, "assign interval must be positive"),
            (self.check_interval_ms == 0, "check interval must be positive"),
            (self.rpc_timeout_ms == 0, "RPC timeout must be positive"),
            (
                self.max_assignments_per_tick == 0,
                "assignments per tick must be at least 1",
            ),
            (self.max_checks_per_tick == 0, "checks per tick must be at least 1"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(CoordinatorError::InvalidConfig(reason.to_string())),
            None => Ok(()),
        }
    }
}
