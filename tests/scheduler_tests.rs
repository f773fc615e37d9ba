use indexmap::IndexMap;
use uuid::Uuid;

use netcoord::error::CoordinatorError;
use netcoord::scheduler::{
    CheckTransition, Job, TaskStatus, WorkQueue, WorkStatus, WorkerPool, WorkerStatus,
};

fn job(command: &str) -> Job {
    let mut params = IndexMap::new();
    params.insert("command".to_string(), command.to_string());
    Job::new(params)
}

/// Enqueue and assign a job in one go.
fn assigned(queue: &mut WorkQueue, worker: &str) -> Uuid {
    let id = queue.enqueue(job("parse")).unwrap();
    let taken = queue.take_for_assignment().unwrap();
    assert_eq!(taken.id, id);
    queue.commit_assignment(&id, worker);
    id
}

#[test]
fn test_enqueue_creates_unassigned_record() {
    let mut queue = WorkQueue::new();
    assert!(queue.is_empty());
    let job = job("parse");
    let id = queue.enqueue(job.clone()).unwrap();

    let record = queue.get(&id).unwrap();
    assert_eq!(record.job, job);
    assert_eq!(record.status, WorkStatus::Unassigned);
    assert!(record.assigned_worker.is_none());
    assert!(record.last_assign_time.is_none());
    assert_eq!(queue.len(), 1);
    assert!(!queue.is_empty());
}

#[test]
fn test_duplicate_enqueue_rejected() {
    let mut queue = WorkQueue::new();
    let job = job("parse");
    let id = queue.enqueue(job.clone()).unwrap();

    let err = queue.enqueue(job).unwrap_err();
    assert!(matches!(err, CoordinatorError::DuplicateJob(dup) if dup == id));
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.status(&id).unwrap(), WorkStatus::Unassigned);
}

#[test]
fn test_duplicate_of_terminated_job_rejected() {
    let mut queue = WorkQueue::new();
    let id = assigned(&mut queue, "w1:9997");
    queue.take_for_check().unwrap();
    queue.record_check_result(&id, TaskStatus::TerminatedNormally);

    let again = Job::with_id(id, IndexMap::new());
    assert!(matches!(
        queue.enqueue(again),
        Err(CoordinatorError::DuplicateJob(_))
    ));
    assert_eq!(queue.status(&id).unwrap(), WorkStatus::TerminatedNormally);
}

#[test]
fn test_take_for_assignment_is_fifo() {
    let mut queue = WorkQueue::new();
    let first = queue.enqueue(job("a")).unwrap();
    let second = queue.enqueue(job("b")).unwrap();
    let third = queue.enqueue(job("c")).unwrap();

    assert_eq!(queue.take_for_assignment().unwrap().id, first);
    assert_eq!(queue.take_for_assignment().unwrap().id, second);
    assert_eq!(queue.take_for_assignment().unwrap().id, third);
    assert!(queue.take_for_assignment().is_none());
}

#[test]
fn test_abort_keeps_fifo_position() {
    let mut queue = WorkQueue::new();
    let first = queue.enqueue(job("a")).unwrap();
    let _second = queue.enqueue(job("b")).unwrap();

    let taken = queue.take_for_assignment().unwrap();
    assert_eq!(taken.id, first);
    queue.abort_assignment(&first);

    assert_eq!(queue.take_for_assignment().unwrap().id, first);
}

#[test]
fn test_reserved_record_not_taken_twice() {
    let mut queue = WorkQueue::new();
    let id = queue.enqueue(job("a")).unwrap();

    assert_eq!(queue.take_for_assignment().unwrap().id, id);
    assert!(queue.take_for_assignment().is_none());
    assert!(queue.get(&id).unwrap().is_reserved());
    // Reserved for assignment is still UNASSIGNED to observers.
    assert_eq!(queue.status(&id).unwrap(), WorkStatus::Unassigned);
}

#[test]
fn test_commit_assignment_sets_worker() {
    let mut queue = WorkQueue::new();
    let id = assigned(&mut queue, "w1:9997");

    let record = queue.get(&id).unwrap();
    assert_eq!(record.status, WorkStatus::Assigned);
    assert_eq!(record.assigned_worker.as_deref(), Some("w1:9997"));
    assert!(record.last_assign_time.is_some());
    assert!(!record.is_reserved());
    assert_eq!(queue.records_for_worker("w1:9997").len(), 1);
}

#[test]
#[should_panic(expected = "commit_assignment")]
fn test_commit_without_reservation_panics() {
    let mut queue = WorkQueue::new();
    let id = queue.enqueue(job("a")).unwrap();
    queue.commit_assignment(&id, "w1:9997");
}

#[test]
#[should_panic(expected = "abort_assignment")]
fn test_abort_of_unknown_job_panics() {
    let mut queue = WorkQueue::new();
    queue.abort_assignment(&Uuid::new_v4());
}

#[test]
#[should_panic(expected = "record_check_result")]
fn test_check_result_without_check_panics() {
    let mut queue = WorkQueue::new();
    let id = assigned(&mut queue, "w1:9997");
    queue.record_check_result(&id, TaskStatus::TerminatedNormally);
}

#[test]
fn test_take_for_check_only_assigned() {
    let mut queue = WorkQueue::new();
    queue.enqueue(job("waiting")).unwrap();
    assert!(queue.take_for_check().is_none());

    let id = assigned(&mut queue, "w1:9997");
    let record = queue.take_for_check().unwrap();
    assert_eq!(record.id(), id);
    assert_eq!(record.status, WorkStatus::CheckingSuccessPending);
    assert_eq!(record.assigned_worker.as_deref(), Some("w1:9997"));

    // Under check: not eligible again.
    assert!(queue.take_for_check().is_none());
}

#[test]
fn test_take_for_check_rotates_least_recently_checked() {
    let mut queue = WorkQueue::new();
    let a = assigned(&mut queue, "w1:9997");
    let b = assigned(&mut queue, "w2:9997");

    let first = queue.take_for_check().unwrap().id();
    assert_eq!(first, a);
    queue.record_check_result(&a, TaskStatus::InProgress);

    assert_eq!(queue.take_for_check().unwrap().id(), b);
    queue.record_check_result(&b, TaskStatus::InProgress);

    assert_eq!(queue.take_for_check().unwrap().id(), a);
}

#[test]
fn test_still_running_stays_assigned() {
    let mut queue = WorkQueue::new();
    let id = assigned(&mut queue, "w1:9997");

    for status in [TaskStatus::Unscheduled, TaskStatus::InProgress] {
        queue.take_for_check().unwrap();
        assert_eq!(
            queue.record_check_result(&id, status),
            CheckTransition::StillRunning
        );
        let record = queue.get(&id).unwrap();
        assert_eq!(record.status, WorkStatus::Assigned);
        assert_eq!(record.assigned_worker.as_deref(), Some("w1:9997"));
        assert!(record.last_check_time.is_some());
    }
}

#[test]
fn test_terminal_results() {
    let mut queue = WorkQueue::new();
    let ok = assigned(&mut queue, "w1:9997");
    let bad = assigned(&mut queue, "w2:9997");

    queue.take_for_check().unwrap();
    assert_eq!(
        queue.record_check_result(&ok, TaskStatus::TerminatedNormally),
        CheckTransition::Terminated(WorkStatus::TerminatedNormally)
    );
    queue.take_for_check().unwrap();
    assert_eq!(
        queue.record_check_result(&bad, TaskStatus::TerminatedAbnormally),
        CheckTransition::Terminated(WorkStatus::TerminatedAbnormally)
    );

    // Terminal records keep the worker that ran them.
    assert_eq!(
        queue.get(&ok).unwrap().assigned_worker.as_deref(),
        Some("w1:9997")
    );
    assert!(queue.take_for_check().is_none());
    assert!(queue.take_for_assignment().is_none());
}

#[test]
fn test_unknown_task_status_requeues() {
    let mut queue = WorkQueue::new();
    let id = assigned(&mut queue, "w1:9997");
    queue.take_for_check().unwrap();

    assert_eq!(
        queue.record_check_result(&id, TaskStatus::Unknown),
        CheckTransition::Requeued
    );
    let record = queue.get(&id).unwrap();
    assert_eq!(record.status, WorkStatus::Unassigned);
    assert!(record.assigned_worker.is_none());
    assert_eq!(queue.take_for_assignment().unwrap().id, id);
}

#[test]
fn test_requeue_clears_worker() {
    let mut queue = WorkQueue::new();
    let id = assigned(&mut queue, "w1:9997");
    queue.take_for_check().unwrap();

    assert!(queue.requeue(&id));
    let record = queue.get(&id).unwrap();
    assert_eq!(record.status, WorkStatus::Unassigned);
    assert!(record.assigned_worker.is_none());
    assert!(!record.is_reserved());
    assert!(queue.records_for_worker("w1:9997").is_empty());
}

#[test]
fn test_terminal_records_never_change() {
    let mut queue = WorkQueue::new();
    let id = assigned(&mut queue, "w1:9997");
    queue.take_for_check().unwrap();
    queue.record_check_result(&id, TaskStatus::TerminatedAbnormally);

    assert!(!queue.requeue(&id));
    assert!(queue.take_for_assignment().is_none());
    assert!(queue.take_for_check().is_none());

    let record = queue.get(&id).unwrap();
    assert_eq!(record.status, WorkStatus::TerminatedAbnormally);
    assert_eq!(record.assigned_worker.as_deref(), Some("w1:9997"));
}

#[test]
fn test_requeue_ignores_unassigned_and_unknown() {
    let mut queue = WorkQueue::new();
    let id = queue.enqueue(job("a")).unwrap();
    assert!(!queue.requeue(&id));
    assert!(!queue.requeue(&Uuid::new_v4()));
    assert_eq!(queue.status(&id).unwrap(), WorkStatus::Unassigned);
}

#[test]
fn test_status_of_unknown_job() {
    let queue = WorkQueue::new();
    let id = Uuid::new_v4();
    assert!(matches!(
        queue.status(&id),
        Err(CoordinatorError::JobNotFound(missing)) if missing == id
    ));
}

#[test]
fn test_snapshot_counts_every_status() {
    let mut queue = WorkQueue::new();
    queue.enqueue(job("waiting")).unwrap();
    let running = assigned(&mut queue, "w1:9997");
    let done = assigned(&mut queue, "w2:9997");

    queue.take_for_check().unwrap();
    queue.record_check_result(&running, TaskStatus::InProgress);
    queue.take_for_check().unwrap();
    queue.record_check_result(&done, TaskStatus::TerminatedNormally);

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.total, 3);
    assert_eq!(snapshot.count(WorkStatus::Unassigned), 1);
    assert_eq!(snapshot.count(WorkStatus::Assigned), 1);
    assert_eq!(snapshot.count(WorkStatus::TerminatedNormally), 1);
    assert_eq!(snapshot.count(WorkStatus::TerminatedAbnormally), 0);
    assert_eq!(snapshot.counts.len(), WorkStatus::ALL.len());
}

#[test]
fn test_records_sorted_by_submission() {
    let mut queue = WorkQueue::new();
    let ids: Vec<_> = (0..5)
        .map(|i| queue.enqueue(job(&i.to_string())).unwrap())
        .collect();
    let listed: Vec<_> = queue.records().iter().map(|r| r.id()).collect();
    assert_eq!(listed, ids);
}

#[test]
fn test_register_worker_idempotent() {
    let mut pool = WorkerPool::new();
    assert!(pool.is_empty());
    assert!(pool.register_worker("w1:9997"));
    assert!(!pool.register_worker("w1:9997"));
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.count(WorkerStatus::Idle), 1);
    assert_eq!(pool.status("w1:9997"), Some(WorkerStatus::Idle));
}

#[test]
fn test_reregister_does_not_free_busy_worker() {
    let mut pool = WorkerPool::new();
    pool.register_worker("w1:9997");
    let worker = pool.take_idle_worker().unwrap();
    pool.record_assignment_outcome(&worker, true);

    assert!(!pool.register_worker("w1:9997"));
    assert_eq!(pool.status("w1:9997"), Some(WorkerStatus::Busy));
}

#[test]
fn test_take_idle_worker_reserves() {
    let mut pool = WorkerPool::new();
    pool.register_worker("w1:9997");

    assert_eq!(pool.take_idle_worker().as_deref(), Some("w1:9997"));
    assert_eq!(pool.status("w1:9997"), Some(WorkerStatus::Reserved));
    assert!(pool.take_idle_worker().is_none());
}

#[test]
fn test_take_idle_worker_oldest_idle_first() {
    let mut pool = WorkerPool::new();
    pool.register_worker("w1:9997");
    pool.register_worker("w2:9997");
    pool.register_worker("w3:9997");

    let first = pool.take_idle_worker().unwrap();
    assert_eq!(first, "w1:9997");
    pool.record_assignment_outcome(&first, true);
    pool.release_worker(&first);

    // w1 went idle again after w2 and w3.
    assert_eq!(pool.take_idle_worker().as_deref(), Some("w2:9997"));
    assert_eq!(pool.take_idle_worker().as_deref(), Some("w3:9997"));
    assert_eq!(pool.take_idle_worker().as_deref(), Some("w1:9997"));
}

#[test]
fn test_failed_assignment_marks_unreachable() {
    let mut pool = WorkerPool::new();
    pool.register_worker("w1:9997");
    let worker = pool.take_idle_worker().unwrap();
    pool.record_assignment_outcome(&worker, false);

    assert_eq!(pool.status("w1:9997"), Some(WorkerStatus::Unreachable));
    assert!(pool.take_idle_worker().is_none());

    // Only re-registration restores it.
    assert!(pool.register_worker("w1:9997"));
    assert_eq!(pool.status("w1:9997"), Some(WorkerStatus::Idle));
    assert_eq!(pool.take_idle_worker().as_deref(), Some("w1:9997"));
}

#[test]
fn test_release_only_busy_workers() {
    let mut pool = WorkerPool::new();
    pool.register_worker("w1:9997");
    pool.register_worker("w2:9997");

    let busy = pool.take_idle_worker().unwrap();
    pool.record_assignment_outcome(&busy, true);
    assert_eq!(pool.count(WorkerStatus::Busy), 1);
    pool.release_worker(&busy);
    assert_eq!(pool.status(&busy), Some(WorkerStatus::Idle));

    let lost = pool.take_idle_worker().unwrap();
    pool.record_assignment_outcome(&lost, false);
    pool.release_worker(&lost);
    assert_eq!(pool.status(&lost), Some(WorkerStatus::Unreachable));

    pool.release_worker("unknown:1");
    assert_eq!(pool.len(), 2);
}

#[test]
fn test_workers_listed_by_address() {
    let mut pool = WorkerPool::new();
    pool.register_worker("b:1");
    pool.register_worker("a:1");
    let listed: Vec<_> = pool.workers().iter().map(|w| w.address.clone()).collect();
    assert_eq!(listed, vec!["a:1", "b:1"]);
}
