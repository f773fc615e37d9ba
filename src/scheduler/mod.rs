pub mod job;
pub mod pool;
pub mod queue;

pub use job::{CheckTransition, Job, JobId, TaskStatus, WorkRecord, WorkStatus};
pub use pool::{WorkerPool, WorkerState, WorkerStatus};
pub use queue::{QueueSnapshot, WorkQueue};
