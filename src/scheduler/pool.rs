use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Idle,
    /// Handed out by `take_idle_worker`, dispatch outcome not yet recorded.
    Reserved,
    Busy,
    Unreachable,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Idle => write!(f, "IDLE"),
            WorkerStatus::Reserved => write!(f, "RESERVED"),
            WorkerStatus::Busy => write!(f, "BUSY"),
            WorkerStatus::Unreachable => write!(f, "UNREACHABLE"),
        }
    }
}

/// Worker state tracking
#[derive(Debug, Clone, Serialize)]
pub struct WorkerState {
    pub address: String,
    pub status: WorkerStatus,
    pub registered_at: DateTime<Utc>,
    /// Position in the idle order; lower went idle earlier.
    #[serde(skip)]
    idle_since: u64,
}

impl WorkerState {
    fn new(address: String, idle_since: u64) -> Self {
        Self {
            address,
            status: WorkerStatus::Idle,
            registered_at: Utc::now(),
            idle_since,
        }
    }

    fn set_idle(&mut self, idle_since: u64) {
        self.status = WorkerStatus::Idle;
        self.idle_since = idle_since;
    }
}

/// Tracks worker availability. Never sees job content.
#[derive(Debug, Default)]
pub struct WorkerPool {
    workers: HashMap<String, WorkerState>,
    idle_clock: u64,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker as IDLE. Re-registering a known address is a no-op
    /// unless the worker is UNREACHABLE, which restores it to IDLE.
    /// Returns true when the worker became available through this call.
    pub fn register_worker(&mut self, address: &str) -> bool {
        match self.workers.get_mut(address) {
            Some(worker) if worker.status == WorkerStatus::Unreachable => {
                self.idle_clock += 1;
                worker.set_idle(self.idle_clock);
                tracing::info!(worker = address, "Unreachable worker re-registered");
                true
            }
            Some(_) => false,
            None => {
                self.idle_clock += 1;
                self.workers.insert(
                    address.to_string(),
                    WorkerState::new(address.to_string(), self.idle_clock),
                );
                tracing::info!(worker = address, "Worker registered");
                true
            }
        }
    }

    /// Reserve the longest-idle worker.
    pub fn take_idle_worker(&mut self) -> Option<String> {
        let worker = self
            .workers
            .values_mut()
            .filter(|w| w.status == WorkerStatus::Idle)
            .min_by_key(|w| w.idle_since)?;
        worker.status = WorkerStatus::Reserved;
        Some(worker.address.clone())
    }

    /// Success makes the worker BUSY; failure marks it UNREACHABLE until it is
    /// registered again.
    pub fn record_assignment_outcome(&mut self, address: &str, succeeded: bool) {
        let Some(worker) = self.workers.get_mut(address) else {
            tracing::warn!(worker = address, "Outcome recorded for unknown worker");
            return;
        };
        if succeeded {
            if worker.status != WorkerStatus::Reserved {
                tracing::warn!(
                    worker = address,
                    status = %worker.status,
                    "Successful assignment on a worker that was not reserved"
                );
            }
            worker.status = WorkerStatus::Busy;
        } else {
            worker.status = WorkerStatus::Unreachable;
            tracing::warn!(worker = address, "Worker marked unreachable");
        }
    }

    /// The worker's job reached a terminal state: BUSY -> IDLE.
    pub fn release_worker(&mut self, address: &str) {
        match self.workers.get_mut(address) {
            Some(worker) if worker.status == WorkerStatus::Busy => {
                self.idle_clock += 1;
                worker.set_idle(self.idle_clock);
                tracing::debug!(worker = address, "Worker released");
            }
            Some(worker) => {
                tracing::warn!(worker = address, status = %worker.status, "Release of a worker that is not busy");
            }
            None => tracing::warn!(worker = address, "Release of unknown worker"),
        }
    }

    pub fn status(&self, address: &str) -> Option<WorkerStatus> {
        self.workers.get(address).map(|w| w.status)
    }

    /// All workers ordered by address.
    pub fn workers(&self) -> Vec<&WorkerState> {
        let mut workers: Vec<&WorkerState> = self.workers.values().collect();
        workers.sort_by(|a, b| a.address.cmp(&b.address));
        workers
    }

    pub fn count(&self, status: WorkerStatus) -> usize {
        self.workers.values().filter(|w| w.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
