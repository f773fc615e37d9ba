use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::rpc::{TaskDocument, WorkerClient};
use crate::scheduler::{
    CheckTransition, Job, JobId, QueueSnapshot, WorkQueue, WorkRecord, WorkStatus, WorkerPool,
    WorkerState, WorkerStatus,
};

/// Receiving end of the eager assignment signal, consumed by [`Coordinator::start`].
pub type EagerTrigger = mpsc::Receiver<()>;

/// Result of one assignment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    NoWork,
    /// No idle worker; the job was released untouched.
    NoCapacity,
    Assigned { job_id: JobId, worker: String },
    Failed { job_id: JobId, worker: String },
}

/// Result of one status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    NoWork,
    StillRunning { job_id: JobId },
    Terminated { job_id: JobId, status: WorkStatus },
    Requeued { job_id: JobId, worker: Option<String> },
}

/// Coordinator context: owns the queue and the pool and drives the
/// assignment and check cycles against remote workers.
///
/// Cheap to clone; clones share state. The queue and pool are only locked for
/// single transitions, never across an RPC.
#[derive(Clone)]
pub struct Coordinator {
    config: Arc<CoordinatorConfig>,
    queue: Arc<Mutex<WorkQueue>>,
    pool: Arc<Mutex<WorkerPool>>,
    client: Arc<dyn WorkerClient>,
    eager_tx: mpsc::Sender<()>,
}

impl Coordinator {
    /// Build the coordinator and register the statically configured workers.
    pub fn new(config: CoordinatorConfig, client: Arc<dyn WorkerClient>) -> (Self, EagerTrigger) {
        let mut pool = WorkerPool::new();
        for address in &config.workers {
            pool.register_worker(address);
        }

        // Capacity 1: any number of enqueues collapse into one pending attempt.
        let (eager_tx, eager_rx) = mpsc::channel(1);

        let coordinator = Self {
            config: Arc::new(config),
            queue: Arc::new(Mutex::new(WorkQueue::new())),
            pool: Arc::new(Mutex::new(pool)),
            client,
            eager_tx,
        };
        (coordinator, eager_rx)
    }

    pub async fn enqueue(&self, job: Job) -> Result<JobId> {
        let job_id = self.queue.lock().await.enqueue(job)?;
        tracing::info!(job_id = %job_id, "Job queued");
        self.poke();
        Ok(job_id)
    }

    /// Enqueue a new job with a generated id.
    pub async fn submit(&self, params: IndexMap<String, String>) -> Result<JobId> {
        self.enqueue(Job::new(params)).await
    }

    pub async fn get_status(&self, job_id: &JobId) -> Result<WorkStatus> {
        self.queue.lock().await.status(job_id)
    }

    pub async fn get_record(&self, job_id: &JobId) -> Result<WorkRecord> {
        self.queue
            .lock()
            .await
            .get(job_id)
            .cloned()
            .ok_or(CoordinatorError::JobNotFound(*job_id))
    }

    pub async fn records(&self) -> Vec<WorkRecord> {
        self.queue
            .lock()
            .await
            .records()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn queue_snapshot(&self) -> QueueSnapshot {
        self.queue.lock().await.snapshot()
    }

    /// Register (or restore) a worker. A newly available worker also fires
    /// the eager trigger so waiting jobs need not wait for the next tick.
    pub async fn register_worker(&self, address: &str) -> bool {
        let available = self.pool.lock().await.register_worker(address);
        if available {
            self.poke();
        }
        available
    }

    pub async fn workers(&self) -> Vec<WorkerState> {
        self.pool
            .lock()
            .await
            .workers()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn worker_status(&self, address: &str) -> Option<WorkerStatus> {
        self.pool.lock().await.status(address)
    }

    fn poke(&self) {
        match self.eager_tx.try_send(()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(())) => {
                tracing::trace!("Eager assignment already pending");
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::trace!("Eager assignment loop not running");
            }
        }
    }

    /// A single assignment attempt: one record, one worker, one dispatch.
    pub async fn assign_once(&self) -> AssignOutcome {
        match self.reserve_assignment().await {
            Ok((job, worker)) => self.dispatch(job, worker).await,
            Err(outcome) => outcome,
        }
    }

    /// Reserve up to `max_assignments_per_tick` record/worker pairs and
    /// dispatch them concurrently.
    pub async fn run_assignment_cycle(&self) -> Vec<AssignOutcome> {
        let mut attempts = JoinSet::new();
        let mut outcomes = Vec::new();

        for _ in 0..self.config.max_assignments_per_tick {
            match self.reserve_assignment().await {
                Ok((job, worker)) => {
                    let this = self.clone();
                    attempts.spawn(async move { this.dispatch(job, worker).await });
                }
                Err(outcome) => {
                    outcomes.push(outcome);
                    break;
                }
            }
        }

        outcomes.extend(join_all(attempts).await);
        outcomes
    }

    /// A single status check of the least recently checked assigned record.
    pub async fn check_once(&self) -> CheckOutcome {
        let Some(record) = self.queue.lock().await.take_for_check() else {
            return CheckOutcome::NoWork;
        };
        self.check_record(record).await
    }

    /// Reserve up to `max_checks_per_tick` assigned records and poll them
    /// concurrently.
    pub async fn run_check_cycle(&self) -> Vec<CheckOutcome> {
        let mut checks = JoinSet::new();
        let mut outcomes = Vec::new();

        for _ in 0..self.config.max_checks_per_tick {
            let Some(record) = self.queue.lock().await.take_for_check() else {
                outcomes.push(CheckOutcome::NoWork);
                break;
            };
            let this = self.clone();
            checks.spawn(async move { this.check_record(record).await });
        }

        outcomes.extend(join_all(checks).await);
        outcomes
    }

    async fn reserve_assignment(&self) -> std::result::Result<(Job, String), AssignOutcome> {
        let Some(job) = self.queue.lock().await.take_for_assignment() else {
            tracing::trace!("No unassigned work");
            return Err(AssignOutcome::NoWork);
        };

        let worker = self.pool.lock().await.take_idle_worker();
        let Some(worker) = worker else {
            self.queue.lock().await.abort_assignment(&job.id);
            tracing::debug!(job_id = %job.id, "No idle worker");
            return Err(AssignOutcome::NoCapacity);
        };

        Ok((job, worker))
    }

    async fn dispatch(&self, job: Job, worker: String) -> AssignOutcome {
        let task = TaskDocument::new(&job, &self.config.storage_location);
        tracing::info!(job_id = %job.id, worker = %worker, "Dispatching job");

        match self
            .bounded(&worker, self.client.dispatch(&worker, &task))
            .await
        {
            Ok(()) => {
                // Pool first: once the record is ASSIGNED a check may release the worker.
                self.pool
                    .lock()
                    .await
                    .record_assignment_outcome(&worker, true);
                self.queue.lock().await.commit_assignment(&job.id, &worker);
                AssignOutcome::Assigned {
                    job_id: job.id,
                    worker,
                }
            }
            Err(e) => {
                log_rpc_failure(&e, job.id, &worker, "Dispatch failed");
                self.queue.lock().await.abort_assignment(&job.id);
                self.pool
                    .lock()
                    .await
                    .record_assignment_outcome(&worker, false);
                AssignOutcome::Failed {
                    job_id: job.id,
                    worker,
                }
            }
        }
    }

    async fn check_record(&self, record: WorkRecord) -> CheckOutcome {
        let job_id = record.id();
        let Some(worker) = record.assigned_worker else {
            tracing::error!(job_id = %job_id, "Assigned job has no worker, requeueing");
            self.queue.lock().await.requeue(&job_id);
            return CheckOutcome::Requeued {
                job_id,
                worker: None,
            };
        };

        tracing::debug!(job_id = %job_id, worker = %worker, "Checking job");

        match self
            .bounded(&worker, self.client.poll_status(&worker, job_id))
            .await
        {
            Err(e) => {
                log_rpc_failure(&e, job_id, &worker, "Status check failed");
                self.queue.lock().await.requeue(&job_id);
                self.pool
                    .lock()
                    .await
                    .record_assignment_outcome(&worker, false);
                CheckOutcome::Requeued {
                    job_id,
                    worker: Some(worker),
                }
            }
            Ok(task_status) => {
                tracing::debug!(job_id = %job_id, worker = %worker, status = %task_status, "Task status");
                let transition = self
                    .queue
                    .lock()
                    .await
                    .record_check_result(&job_id, task_status);
                match transition {
                    CheckTransition::StillRunning => CheckOutcome::StillRunning { job_id },
                    CheckTransition::Terminated(status) => {
                        self.pool.lock().await.release_worker(&worker);
                        CheckOutcome::Terminated { job_id, status }
                    }
                    CheckTransition::Requeued => {
                        self.pool.lock().await.release_worker(&worker);
                        CheckOutcome::Requeued {
                            job_id,
                            worker: Some(worker),
                        }
                    }
                }
            }
        }
    }

    async fn bounded<T>(&self, worker: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.rpc_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CoordinatorError::RpcTimeout {
                worker: worker.to_string(),
                timeout_ms: self.config.rpc_timeout_ms,
            }),
        }
    }

    /// Spawn the assignment cycle, the check cycle and the eager assignment
    /// loop. All three stop when `shutdown` is cancelled.
    pub fn start(&self, eager: EagerTrigger, shutdown: CancellationToken) -> JoinSet<()> {
        tracing::info!(
            assign_interval_ms = self.config.assign_interval_ms,
            check_interval_ms = self.config.check_interval_ms,
            rpc_timeout_ms = self.config.rpc_timeout_ms,
            "Starting coordinator cycles"
        );
        let mut cycles = JoinSet::new();
        cycles.spawn(self.clone().assignment_loop(shutdown.clone()));
        cycles.spawn(self.clone().check_loop(shutdown.clone()));
        cycles.spawn(self.clone().eager_loop(eager, shutdown));
        cycles
    }

    /// Fixed-delay assignment cycle: run, then wait the interval.
    async fn assignment_loop(self, shutdown: CancellationToken) {
        loop {
            self.run_assignment_cycle().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.assign_interval()) => {}
            }
        }
        tracing::info!("Assignment cycle stopped");
    }

    async fn check_loop(self, shutdown: CancellationToken) {
        loop {
            self.run_check_cycle().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.check_interval()) => {}
            }
        }
        tracing::info!("Check cycle stopped");
    }

    async fn eager_loop(self, mut eager: EagerTrigger, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                signal = eager.recv() => {
                    if signal.is_none() {
                        break;
                    }
                    let outcome = self.assign_once().await;
                    tracing::debug!(outcome = ?outcome, "Eager assignment attempt");
                }
            }
        }
        tracing::info!("Eager assignment loop stopped");
    }
}

/// Wait for every cycle task to finish.
///
/// A cycle that ends before `shutdown` is cancelled, or ends by panicking, is
/// dead: the token is cancelled so the rest of the process stops with it, and
/// the first such failure is returned.
pub async fn supervise(mut cycles: JoinSet<()>, shutdown: CancellationToken) -> Result<()> {
    let mut failure = None;
    while let Some(joined) = cycles.join_next().await {
        let reason = match joined {
            Ok(()) if shutdown.is_cancelled() => continue,
            Ok(()) => "stopped before shutdown".to_string(),
            Err(e) => e.to_string(),
        };
        tracing::error!(reason = %reason, "Coordinator cycle ended abnormally, shutting down");
        shutdown.cancel();
        failure.get_or_insert(reason);
    }
    match failure {
        Some(reason) => Err(CoordinatorError::CycleFailed(reason)),
        None => Ok(()),
    }
}

/// Collect task results; a panicking attempt means a broken invariant and is
/// re-raised on the cycle task.
async fn join_all<T: 'static>(mut set: JoinSet<T>) -> Vec<T> {
    let mut results = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => tracing::error!(error = %e, "Coordinator attempt cancelled"),
        }
    }
    results
}

fn log_rpc_failure(err: &CoordinatorError, job_id: JobId, worker: &str, what: &str) {
    match err {
        CoordinatorError::MalformedResponse { payload, reason, .. } => {
            tracing::error!(job_id = %job_id, worker, reason = %reason, payload = %payload, "{}", what);
        }
        other => {
            tracing::warn!(job_id = %job_id, worker, error = %other, "{}", what);
        }
    }
}
