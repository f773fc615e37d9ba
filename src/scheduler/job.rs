use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = Uuid;

/// Coordinator-side lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkStatus {
    Unassigned,
    Assigned,
    CheckingSuccessPending,
    TerminatedNormally,
    TerminatedAbnormally,
}

impl WorkStatus {
    pub const ALL: [WorkStatus; 5] = [
        WorkStatus::Unassigned,
        WorkStatus::Assigned,
        WorkStatus::CheckingSuccessPending,
        WorkStatus::TerminatedNormally,
        WorkStatus::TerminatedAbnormally,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkStatus::TerminatedNormally | WorkStatus::TerminatedAbnormally
        )
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkStatus::Unassigned => write!(f, "UNASSIGNED"),
            WorkStatus::Assigned => write!(f, "ASSIGNED"),
            WorkStatus::CheckingSuccessPending => write!(f, "CHECKING_SUCCESS_PENDING"),
            WorkStatus::TerminatedNormally => write!(f, "TERMINATED_NORMALLY"),
            WorkStatus::TerminatedAbnormally => write!(f, "TERMINATED_ABNORMALLY"),
        }
    }
}

/// Task status as reported by a worker's status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Unscheduled,
    InProgress,
    TerminatedNormally,
    TerminatedAbnormally,
    Unknown,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Unscheduled => write!(f, "Unscheduled"),
            TaskStatus::InProgress => write!(f, "InProgress"),
            TaskStatus::TerminatedNormally => write!(f, "TerminatedNormally"),
            TaskStatus::TerminatedAbnormally => write!(f, "TerminatedAbnormally"),
            TaskStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unscheduled" => Ok(TaskStatus::Unscheduled),
            "InProgress" => Ok(TaskStatus::InProgress),
            "TerminatedNormally" => Ok(TaskStatus::TerminatedNormally),
            "TerminatedAbnormally" => Ok(TaskStatus::TerminatedAbnormally),
            "Unknown" => Ok(TaskStatus::Unknown),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// What a status check did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTransition {
    StillRunning,
    Terminated(WorkStatus),
    /// The worker no longer knows the task; the record went back to UNASSIGNED.
    Requeued,
}

/// A unit of analysis work. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub params: IndexMap<String, String>,
}

impl Job {
    pub fn new(params: IndexMap<String, String>) -> Self {
        Self::with_id(Uuid::new_v4(), params)
    }

    pub fn with_id(id: JobId, params: IndexMap<String, String>) -> Self {
        Self { id, params }
    }
}

/// In-flight operation holding a record out of further selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    Assignment,
    Check,
}

/// Coordination state wrapped around one job.
#[derive(Debug, Clone, Serialize)]
pub struct WorkRecord {
    pub job: Job,
    pub status: WorkStatus,
    pub assigned_worker: Option<String>,
    pub submit_time: DateTime<Utc>,
    pub last_assign_time: Option<DateTime<Utc>>,
    pub last_check_time: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) seq: u64,
    #[serde(skip)]
    pub(crate) claim: Option<Claim>,
}

impl WorkRecord {
    pub(crate) fn new(job: Job, seq: u64) -> Self {
        Self {
            job,
            status: WorkStatus::Unassigned,
            assigned_worker: None,
            submit_time: Utc::now(),
            last_assign_time: None,
            last_check_time: None,
            seq,
            claim: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.job.id
    }

    /// True while an assignment or check attempt holds this record.
    pub fn is_reserved(&self) -> bool {
        self.claim.is_some()
    }
}
