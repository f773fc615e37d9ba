//! Calls from the coordinator to remote workers.
//!
//! [`WorkerClient`] is the seam between the coordination logic and the wire:
//! the coordinator only needs "dispatch this task" and "what is the status of
//! that task". [`http::HttpWorkerClient`] speaks the worker service's HTTP/JSON
//! protocol; tests substitute scripted clients.

pub mod http;

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::scheduler::{Job, JobId, TaskStatus};

pub use http::HttpWorkerClient;

/// Task key carrying the snapshot storage location.
pub const TASK_DATADIR_KEY: &str = "datadir";
/// Task key carrying the worker's log file name.
pub const TASK_LOGFILE_KEY: &str = "logfile";

/// What a worker receives for one job: its parameters plus coordinator metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDocument {
    pub task_id: JobId,
    pub body: Map<String, Value>,
}

impl TaskDocument {
    pub fn new(job: &Job, storage_location: &Path) -> Self {
        let mut body: Map<String, Value> = job
            .params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        body.insert(
            TASK_DATADIR_KEY.to_string(),
            Value::String(storage_location.display().to_string()),
        );
        body.insert(
            TASK_LOGFILE_KEY.to_string(),
            Value::String(format!("{}.log", job.id)),
        );
        Self {
            task_id: job.id,
            body,
        }
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.body.clone()).to_string()
    }
}

/// Remote procedure calls against a worker address.
///
/// Any `Err` is a failed attempt for that worker; the coordinator never
/// retries within a cycle.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Hand a task to the worker. `Ok` only for a success-coded response.
    async fn dispatch(&self, worker: &str, task: &TaskDocument) -> Result<()>;

    /// Ask the worker for the status of a task it was given.
    async fn poll_status(&self, worker: &str, job_id: JobId) -> Result<TaskStatus>;
}
