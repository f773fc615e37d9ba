//! Scripted worker transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;

use netcoord::config::CoordinatorConfig;
use netcoord::coordinator::{Coordinator, EagerTrigger};
use netcoord::error::{CoordinatorError, Result};
use netcoord::rpc::{TaskDocument, WorkerClient};
use netcoord::scheduler::{JobId, TaskStatus};

/// How a worker answers a dispatch.
#[derive(Debug, Clone)]
pub enum DispatchReply {
    Accept,
    Reject(String),
    Unreachable,
    Hang,
}

/// How a worker answers a status poll.
#[derive(Debug, Clone)]
pub enum PollReply {
    Status(TaskStatus),
    Unreachable,
    Malformed,
    Hang,
}

#[derive(Default)]
struct Script {
    dispatch: HashMap<String, DispatchReply>,
    poll: HashMap<String, PollReply>,
    dispatched: Vec<(String, TaskDocument)>,
    polled: Vec<(String, JobId)>,
}

/// In-memory [`WorkerClient`]: unscripted workers accept every dispatch and
/// report `InProgress`.
#[derive(Clone, Default)]
pub struct ScriptedWorkers {
    script: Arc<Mutex<Script>>,
}

impl ScriptedWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_dispatch(&self, worker: &str, reply: DispatchReply) {
        self.script
            .lock()
            .unwrap()
            .dispatch
            .insert(worker.to_string(), reply);
    }

    pub fn on_poll(&self, worker: &str, reply: PollReply) {
        self.script
            .lock()
            .unwrap()
            .poll
            .insert(worker.to_string(), reply);
    }

    pub fn dispatched(&self) -> Vec<(String, TaskDocument)> {
        self.script.lock().unwrap().dispatched.clone()
    }

    pub fn polled(&self) -> Vec<(String, JobId)> {
        self.script.lock().unwrap().polled.clone()
    }
}

#[async_trait]
impl WorkerClient for ScriptedWorkers {
    async fn dispatch(&self, worker: &str, task: &TaskDocument) -> Result<()> {
        let reply = {
            let mut script = self.script.lock().unwrap();
            script.dispatched.push((worker.to_string(), task.clone()));
            script
                .dispatch
                .get(worker)
                .cloned()
                .unwrap_or(DispatchReply::Accept)
        };
        match reply {
            DispatchReply::Accept => Ok(()),
            DispatchReply::Reject(message) => Err(CoordinatorError::WorkerRejected {
                worker: worker.to_string(),
                message,
            }),
            DispatchReply::Unreachable => Err(CoordinatorError::WorkerUnreachable {
                worker: worker.to_string(),
                reason: "connection refused".to_string(),
            }),
            DispatchReply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn poll_status(&self, worker: &str, job_id: JobId) -> Result<TaskStatus> {
        let reply = {
            let mut script = self.script.lock().unwrap();
            script.polled.push((worker.to_string(), job_id));
            script
                .poll
                .get(worker)
                .cloned()
                .unwrap_or(PollReply::Status(TaskStatus::InProgress))
        };
        match reply {
            PollReply::Status(status) => Ok(status),
            PollReply::Unreachable => Err(CoordinatorError::WorkerUnreachable {
                worker: worker.to_string(),
                reason: "connection refused".to_string(),
            }),
            PollReply::Malformed => Err(CoordinatorError::MalformedResponse {
                worker: worker.to_string(),
                reason: "missing status key".to_string(),
                payload: "{}".to_string(),
            }),
            PollReply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(TaskStatus::InProgress)
            }
        }
    }
}

/// Config with short timings for tests.
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        assign_interval_ms: 20,
        check_interval_ms: 20,
        rpc_timeout_ms: 200,
        ..CoordinatorConfig::default()
    }
}

pub fn test_coordinator(config: CoordinatorConfig) -> (Coordinator, EagerTrigger, ScriptedWorkers) {
    let workers = ScriptedWorkers::new();
    let (coordinator, eager) = Coordinator::new(config, Arc::new(workers.clone()));
    (coordinator, eager, workers)
}

pub fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn assert_eventually<F, Fut>(timeout: Duration, mut check: F, msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {:?}: {}", timeout, msg);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
