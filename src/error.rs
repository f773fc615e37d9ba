use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Job already queued: {0}")]
    DuplicateJob(Uuid),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Worker {worker} unreachable: {reason}")]
    WorkerUnreachable { worker: String, reason: String },

    #[error("Worker {worker} rejected request: {message}")]
    WorkerRejected { worker: String, message: String },

    #[error("Malformed response from worker {worker}: {reason} (payload: {payload})")]
    MalformedResponse {
        worker: String,
        reason: String,
        payload: String,
    },

    #[error("RPC to worker {worker} timed out after {timeout_ms}ms")]
    RpcTimeout { worker: String, timeout_ms: u64 },

    #[error("Snapshot already exists: {0}")]
    SnapshotExists(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Coordinator cycle failed: {0}")]
    CycleFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
