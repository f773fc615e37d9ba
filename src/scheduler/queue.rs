use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::Serialize;

use crate::error::{CoordinatorError, Result};
use crate::scheduler::job::{CheckTransition, Claim, Job, JobId, TaskStatus, WorkRecord, WorkStatus};

/// Point-in-time record counts keyed by status name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub counts: BTreeMap<String, usize>,
    pub total: usize,
}

impl QueueSnapshot {
    pub fn count(&self, status: WorkStatus) -> usize {
        self.counts.get(&status.to_string()).copied().unwrap_or(0)
    }
}

/// Owns every WorkRecord and is the only place their state changes.
///
/// `take_*` calls set a claim on the chosen record so it cannot be selected
/// again until the matching commit/abort/result call. Callers hold the queue
/// lock only for the transition itself, never across a worker RPC.
#[derive(Debug, Default)]
pub struct WorkQueue {
    records: HashMap<JobId, WorkRecord>,
    next_seq: u64,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job as UNASSIGNED. Ids are never reused, even after termination.
    pub fn enqueue(&mut self, job: Job) -> Result<JobId> {
        let id = job.id;
        if self.records.contains_key(&id) {
            return Err(CoordinatorError::DuplicateJob(id));
        }
        let record = WorkRecord::new(job, self.next_seq);
        self.next_seq += 1;
        self.records.insert(id, record);
        tracing::debug!(job_id = %id, "Job enqueued");
        Ok(id)
    }

    /// Reserve the oldest unclaimed UNASSIGNED record for an assignment attempt.
    pub fn take_for_assignment(&mut self) -> Option<Job> {
        let record = self
            .records
            .values_mut()
            .filter(|r| r.status == WorkStatus::Unassigned && r.claim.is_none())
            .min_by_key(|r| r.seq)?;
        record.claim = Some(Claim::Assignment);
        Some(record.job.clone())
    }

    /// Assignment RPC succeeded: the record becomes ASSIGNED to `worker`.
    ///
    /// # Panics
    ///
    /// If the record is not currently reserved by `take_for_assignment`.
    pub fn commit_assignment(&mut self, id: &JobId, worker: &str) {
        let record = self.claimed(id, Claim::Assignment, "commit_assignment");
        record.claim = None;
        record.status = WorkStatus::Assigned;
        record.assigned_worker = Some(worker.to_string());
        record.last_assign_time = Some(Utc::now());
        tracing::info!(job_id = %id, worker, "Job assigned");
    }

    /// Assignment did not happen: release the reservation. The record keeps
    /// its original submit position.
    ///
    /// # Panics
    ///
    /// If the record is not currently reserved by `take_for_assignment`.
    pub fn abort_assignment(&mut self, id: &JobId) {
        let record = self.claimed(id, Claim::Assignment, "abort_assignment");
        record.claim = None;
        tracing::debug!(job_id = %id, "Assignment aborted, job stays unassigned");
    }

    /// Reserve an ASSIGNED record for a status poll, least recently checked first.
    /// The returned copy reflects the CHECKING_SUCCESS_PENDING state.
    pub fn take_for_check(&mut self) -> Option<WorkRecord> {
        let record = self
            .records
            .values_mut()
            .filter(|r| r.status == WorkStatus::Assigned && r.claim.is_none())
            .min_by_key(|r| (r.last_check_time, r.seq))?;
        record.claim = Some(Claim::Check);
        record.status = WorkStatus::CheckingSuccessPending;
        Some(record.clone())
    }

    /// Apply a successfully polled worker status to a record under check.
    ///
    /// # Panics
    ///
    /// If the record is not currently reserved by `take_for_check`.
    pub fn record_check_result(&mut self, id: &JobId, status: TaskStatus) -> CheckTransition {
        let record = self.claimed(id, Claim::Check, "record_check_result");
        record.claim = None;
        record.last_check_time = Some(Utc::now());
        match status {
            TaskStatus::Unscheduled | TaskStatus::InProgress => {
                record.status = WorkStatus::Assigned;
                CheckTransition::StillRunning
            }
            TaskStatus::TerminatedNormally => {
                record.status = WorkStatus::TerminatedNormally;
                tracing::info!(job_id = %id, "Job terminated normally");
                CheckTransition::Terminated(WorkStatus::TerminatedNormally)
            }
            TaskStatus::TerminatedAbnormally => {
                record.status = WorkStatus::TerminatedAbnormally;
                tracing::info!(job_id = %id, "Job terminated abnormally");
                CheckTransition::Terminated(WorkStatus::TerminatedAbnormally)
            }
            TaskStatus::Unknown => {
                record.status = WorkStatus::Unassigned;
                record.assigned_worker = None;
                tracing::warn!(job_id = %id, "Worker does not know the task, requeued");
                CheckTransition::Requeued
            }
        }
    }

    /// Return an assigned record (including one under check) to UNASSIGNED
    /// and clear its worker. Returns false, changing nothing, for records that
    /// are unknown, unassigned or terminal.
    pub fn requeue(&mut self, id: &JobId) -> bool {
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };
        match record.status {
            WorkStatus::Assigned | WorkStatus::CheckingSuccessPending => {
                let worker = record.assigned_worker.take();
                record.status = WorkStatus::Unassigned;
                record.claim = None;
                tracing::info!(job_id = %id, worker = ?worker, "Job requeued");
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &JobId) -> Option<&WorkRecord> {
        self.records.get(id)
    }

    pub fn status(&self, id: &JobId) -> Result<WorkStatus> {
        self.records
            .get(id)
            .map(|r| r.status)
            .ok_or(CoordinatorError::JobNotFound(*id))
    }

    /// All records, oldest submission first.
    pub fn records(&self) -> Vec<&WorkRecord> {
        let mut records: Vec<&WorkRecord> = self.records.values().collect();
        records.sort_by_key(|r| r.seq);
        records
    }

    /// Records currently assigned to (or being checked on) `worker`.
    pub fn records_for_worker(&self, worker: &str) -> Vec<&WorkRecord> {
        self.records
            .values()
            .filter(|r| !r.status.is_terminal() && r.assigned_worker.as_deref() == Some(worker))
            .collect()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let mut counts: BTreeMap<String, usize> = WorkStatus::ALL
            .iter()
            .map(|s| (s.to_string(), 0))
            .collect();
        for record in self.records.values() {
            *counts.entry(record.status.to_string()).or_default() += 1;
        }
        QueueSnapshot {
            counts,
            total: self.records.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn claimed(&mut self, id: &JobId, claim: Claim, op: &str) -> &mut WorkRecord {
        match self.records.get_mut(id) {
            Some(record) if record.claim == Some(claim) => record,
            Some(record) => panic!(
                "{} on job {} holding claim {:?}, expected {:?}",
                op, id, record.claim, claim
            ),
            None => panic!("{} on unknown job {}", op, id),
        }
    }
}
