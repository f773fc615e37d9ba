use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::coordinator::Coordinator;
use crate::error::CoordinatorError;
use crate::scheduler::{Job, QueueSnapshot, WorkRecord, WorkerState};
use crate::storage::SnapshotStore;

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Coordinator,
    pub store: Arc<SnapshotStore>,
}

#[derive(Deserialize)]
struct SubmitJobRequest {
    /// Client-chosen id; generated when absent.
    id: Option<Uuid>,
    #[serde(default)]
    params: IndexMap<String, String>,
}

#[derive(Serialize)]
struct SubmitJobResponse {
    success: bool,
    job_id: String,
}

#[derive(Serialize)]
struct JobResponse {
    id: String,
    status: String,
    assigned_worker: Option<String>,
    params: IndexMap<String, String>,
    submit_time: String,
    last_assign_time: Option<String>,
    last_check_time: Option<String>,
}

impl From<WorkRecord> for JobResponse {
    fn from(record: WorkRecord) -> Self {
        Self {
            id: record.job.id.to_string(),
            status: record.status.to_string(),
            assigned_worker: record.assigned_worker,
            params: record.job.params,
            submit_time: record.submit_time.to_rfc3339(),
            last_assign_time: record.last_assign_time.map(|t| t.to_rfc3339()),
            last_check_time: record.last_check_time.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Deserialize)]
struct RegisterWorkerRequest {
    address: String,
}

#[derive(Serialize)]
struct RegisterWorkerResponse {
    success: bool,
    available: bool,
}

#[derive(Serialize)]
struct SnapshotResponse {
    success: bool,
    name: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

struct ApiError(CoordinatorError);

impl From<CoordinatorError> for ApiError {
    fn from(e: CoordinatorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoordinatorError::DuplicateJob(_) | CoordinatorError::SnapshotExists(_) => {
                StatusCode::CONFLICT
            }
            CoordinatorError::JobNotFound(_) | CoordinatorError::ObjectNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            CoordinatorError::InvalidName(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "API request failed");
        }
        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/queue", get(queue_status_handler))
        .route("/api/jobs", get(list_jobs_handler).post(submit_job_handler))
        .route("/api/jobs/{id}", get(job_status_handler))
        .route(
            "/api/workers",
            get(list_workers_handler).post(register_worker_handler),
        )
        .route("/api/snapshots/{name}", put(upload_snapshot_handler))
        .route("/api/objects/{*path}", get(get_object_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the client API until `shutdown` is cancelled.
pub async fn run_api(
    addr: SocketAddr,
    state: ApiState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Starting API server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn queue_status_handler(State(state): State<ApiState>) -> Json<QueueSnapshot> {
    Json(state.coordinator.queue_snapshot().await)
}

async fn list_jobs_handler(State(state): State<ApiState>) -> Json<Vec<JobResponse>> {
    let jobs = state
        .coordinator
        .records()
        .await
        .into_iter()
        .map(JobResponse::from)
        .collect();
    Json(jobs)
}

async fn submit_job_handler(
    State(state): State<ApiState>,
    Json(payload): Json<SubmitJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = match payload.id {
        Some(id) => Job::with_id(id, payload.params),
        None => Job::new(payload.params),
    };
    let job_id = state.coordinator.enqueue(job).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitJobResponse {
            success: true,
            job_id: job_id.to_string(),
        }),
    ))
}

async fn job_status_handler(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let record = state.coordinator.get_record(&id).await?;
    Ok(Json(record.into()))
}

async fn list_workers_handler(State(state): State<ApiState>) -> Json<Vec<WorkerState>> {
    Json(state.coordinator.workers().await)
}

async fn register_worker_handler(
    State(state): State<ApiState>,
    Json(payload): Json<RegisterWorkerRequest>,
) -> Result<Json<RegisterWorkerResponse>, ApiError> {
    let address = payload.address.trim();
    if address.is_empty() {
        return Err(CoordinatorError::InvalidName(payload.address).into());
    }
    let available = state.coordinator.register_worker(address).await;
    Ok(Json(RegisterWorkerResponse {
        success: true,
        available,
    }))
}

async fn upload_snapshot_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.store.store_snapshot(&name, &body).await?;
    Ok((
        StatusCode::CREATED,
        Json(SnapshotResponse {
            success: true,
            name,
        }),
    ))
}

async fn get_object_handler(
    State(state): State<ApiState>,
    Path(path): Path<String>,
) -> Result<Vec<u8>, ApiError> {
    Ok(state.store.fetch_object(&path).await?)
}
