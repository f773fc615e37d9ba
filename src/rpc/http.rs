use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CoordinatorError, Result};
use crate::rpc::{TaskDocument, WorkerClient};
use crate::scheduler::{JobId, TaskStatus};

pub const RUN_TASK_RSC: &str = "run";
pub const GET_TASK_STATUS_RSC: &str = "getstatus";
pub const TASK_ID_KEY: &str = "taskid";
pub const TASK_KEY: &str = "task";
pub const SUCCESS_KEY: &str = "success";
pub const STATUS_KEY: &str = "status";

/// [`WorkerClient`] over the worker service's HTTP/JSON endpoints.
///
/// Every endpoint answers with a two-element JSON array `[key, payload]`
/// where `key` is `"success"` or an error code.
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    client: reqwest::Client,
    service_base: String,
    timeout_ms: u64,
}

impl HttpWorkerClient {
    pub fn new(service_base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoordinatorError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            service_base: service_base.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn url(&self, worker: &str, resource: &str) -> String {
        format!(
            "http://{}/{}/{}",
            worker,
            self.service_base.trim_matches('/'),
            resource
        )
    }

    async fn call(&self, worker: &str, url: String, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(worker, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoordinatorError::WorkerUnreachable {
                worker: worker.to_string(),
                reason: format!("non-OK response {}", status),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(worker, e))?;
        parse_envelope(worker, &body)
    }

    fn transport_error(&self, worker: &str, e: reqwest::Error) -> CoordinatorError {
        if e.is_timeout() {
            CoordinatorError::RpcTimeout {
                worker: worker.to_string(),
                timeout_ms: self.timeout_ms,
            }
        } else {
            CoordinatorError::WorkerUnreachable {
                worker: worker.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn dispatch(&self, worker: &str, task: &TaskDocument) -> Result<()> {
        let url = self.url(worker, RUN_TASK_RSC);
        let query = [
            (TASK_ID_KEY, task.task_id.to_string()),
            (TASK_KEY, task.to_json()),
        ];
        let payload = self.call(worker, url, &query).await?;
        tracing::debug!(worker, task_id = %task.task_id, response = %payload, "Dispatch accepted");
        Ok(())
    }

    async fn poll_status(&self, worker: &str, job_id: JobId) -> Result<TaskStatus> {
        let url = self.url(worker, GET_TASK_STATUS_RSC);
        let query = [(TASK_ID_KEY, job_id.to_string())];
        let payload = self.call(worker, url, &query).await?;
        parse_task_status(worker, &payload)
    }
}

fn malformed(worker: &str, reason: impl Into<String>, payload: impl ToString) -> CoordinatorError {
    CoordinatorError::MalformedResponse {
        worker: worker.to_string(),
        reason: reason.into(),
        payload: payload.to_string(),
    }
}

/// Unwrap a `[key, payload]` response, returning the payload on success.
pub(crate) fn parse_envelope(worker: &str, body: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| malformed(worker, format!("invalid JSON: {}", e), body))?;

    let (key, payload) = match value.as_array().map(Vec::as_slice) {
        Some([key, payload, ..]) => (key, payload),
        _ => return Err(malformed(worker, "expected a [key, payload] array", body)),
    };

    match key.as_str() {
        Some(SUCCESS_KEY) => Ok(payload.clone()),
        Some(_) => Err(CoordinatorError::WorkerRejected {
            worker: worker.to_string(),
            message: match payload {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        }),
        None => Err(malformed(worker, "response key is not a string", body)),
    }
}

/// Read the task status out of a status payload. The payload is either an
/// object or a string holding one.
pub(crate) fn parse_task_status(worker: &str, payload: &Value) -> Result<TaskStatus> {
    let object = match payload {
        Value::String(s) => serde_json::from_str::<Value>(s)
            .map_err(|e| malformed(worker, format!("invalid status JSON: {}", e), payload))?,
        other => other.clone(),
    };

    let status = object
        .get(STATUS_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(worker, "missing status key", payload))?;

    status
        .parse::<TaskStatus>()
        .map_err(|e| malformed(worker, e, payload))
}
