mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{quiet_opts, runner, worked_plan, ListReviewer, RecordingExecutor, SPEC};
use pretty_assertions::assert_eq;
use strata_core::config::CheckpointGranularity;
use strata_core::error::ExecutorError;
use strata_core::executor::{ExecutionRunner, FailureKind, ResourceLockManager};
use strata_core::plan::{Plan, PlanBuilder, ResourceKind, ResourceRef, Task};
use strata_core::state::{pending_blockers, status_report, BlockReason, SessionStatus, StateManager};

#[test]
fn test_worked_scenario_layers() {
    let plan = worked_plan();
    assert_eq!(
        plan.layers,
        vec![
            vec!["T1".to_string(), "T5".to_string()],
            vec!["T2".to_string(), "T3".to_string()],
            vec!["T4".to_string()],
        ]
    );
    assert_eq!(plan.layer_of("T2"), Some(1));
    assert!(plan.all_dependencies("T2").contains(&"T1".to_string()));
}

#[tokio::test]
async fn test_worked_scenario_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let plan = worked_plan();
    let exec = RecordingExecutor::new();
    let runner = runner(dir.path(), quiet_opts());

    let report = runner
        .execute_plan(&plan, SPEC, exec.arc(), ListReviewer::approve_all())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.layers_executed, vec![0, 1, 2]);
    let mut completed = report.completed.clone();
    completed.sort();
    assert_eq!(completed, vec!["T1", "T2", "T3", "T4", "T5"]);
    assert_eq!(report.stats.reviews_approved, 5);
    assert_eq!(report.stats.layers_completed, 3);
    assert!(runner.locks().snapshot().is_empty());

    let session = runner.state().load_session(&report.session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    let status = status_report(&session, &plan);
    assert!((status.progress_percent - 100.0).abs() < f64::EPSILON);
    assert!(pending_blockers(&session, &plan).is_empty());
}

#[tokio::test]
async fn test_layers_act_as_barriers() {
    let dir = tempfile::tempdir().unwrap();
    let plan = worked_plan();
    let exec = RecordingExecutor::new().with_delay(Duration::from_millis(20));

    runner(dir.path(), quiet_opts())
        .execute_plan(&plan, SPEC, exec.arc(), ListReviewer::approve_all())
        .await
        .unwrap();

    let calls = exec.calls();
    assert_eq!(calls.len(), 5);
    let mut first: Vec<_> = calls[0..2].to_vec();
    first.sort();
    let mut second: Vec<_> = calls[2..4].to_vec();
    second.sort();
    assert_eq!(first, vec!["T1", "T5"]);
    assert_eq!(second, vec!["T2", "T3"]);
    assert_eq!(calls[4], "T4");
}

#[tokio::test]
async fn test_parallelism_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let tasks: Vec<Task> = (0..6)
        .map(|i| Task::new(format!("t{i}"), format!("task {i}")))
        .collect();
    let plan = PlanBuilder::new("wide").build(tasks, SPEC).unwrap();
    assert_eq!(plan.layers.len(), 1);

    let exec = RecordingExecutor::new().with_delay(Duration::from_millis(30));
    let report = runner(dir.path(), quiet_opts().with_max_parallel(2))
        .execute_plan(&plan, SPEC, exec.arc(), ListReviewer::approve_all())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(exec.calls().len(), 6);
    assert!(exec.peak.load(Ordering::SeqCst) <= 2);
    assert!(report.stats.peak_parallelism <= 2);
    assert!(report.stats.peak_parallelism >= 1);
}

#[tokio::test]
async fn test_stale_plan_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let plan = worked_plan();
    let exec = RecordingExecutor::new();

    let err = runner(dir.path(), quiet_opts())
        .execute_plan(&plan, b"# feature spec v2\n", exec.arc(), ListReviewer::approve_all())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::StalePlan { .. }));
    assert!(err.is_build_time());
    assert!(exec.calls().is_empty());
}

#[tokio::test]
async fn test_review_rejection_fails_layer() {
    let dir = tempfile::tempdir().unwrap();
    let plan = worked_plan();
    let exec = RecordingExecutor::new();

    let report = runner(dir.path(), quiet_opts())
        .execute_plan(&plan, SPEC, exec.arc(), ListReviewer::rejecting(&["T5"]))
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed_layer, Some(0));
    assert_eq!(report.failed, vec!["T5"]);
    assert_eq!(report.failures[0].kind, FailureKind::ReviewRejected);
    assert_eq!(report.stats.reviews_rejected, 1);
    assert!(!exec.calls().contains(&"T4".to_string()));

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, ExecutorError::TaskReviewRejected { ref task_id, .. } if task_id == "T5"));
}

#[tokio::test]
async fn test_lock_timeout_fails_task() {
    let dir = tempfile::tempdir().unwrap();
    let plan = PlanBuilder::new("locked")
        .build(vec![Task::new("T1", "profiles table").with_tables(["profiles"])], SPEC)
        .unwrap();

    let locks = Arc::new(ResourceLockManager::new());
    locks
        .acquire("external", &[ResourceRef::new(ResourceKind::Table, "profiles")])
        .unwrap();

    let state = StateManager::new(dir.path()).unwrap();
    let opts = quiet_opts().with_lock_timing(Duration::from_millis(10), Duration::from_millis(60));
    let runner = ExecutionRunner::builder(state)
        .opts(opts)
        .locks(locks.clone())
        .build();
    let exec = RecordingExecutor::new();

    let report = runner
        .execute_plan(&plan, SPEC, exec.arc(), ListReviewer::approve_all())
        .await
        .unwrap();

    assert_eq!(report.failed, vec!["T1"]);
    let failure = &report.failures[0];
    assert_eq!(failure.kind, FailureKind::LockTimeout);
    assert_eq!(failure.resources, vec!["table:profiles"]);
    assert!(failure.waited_ms >= 60);
    assert!(report.stats.lock_contention >= 1);
    assert!(exec.calls().is_empty());
    // The foreign holder is untouched.
    assert_eq!(locks.held_by("external").len(), 1);

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, ExecutorError::LockTimeout { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_task_waits_until_lock_is_released() {
    let dir = tempfile::tempdir().unwrap();
    let plan = PlanBuilder::new("contended")
        .build(vec![Task::new("T1", "profiles table").with_tables(["profiles"])], SPEC)
        .unwrap();

    let locks = Arc::new(ResourceLockManager::new());
    locks
        .acquire("external", &[ResourceRef::new(ResourceKind::Table, "profiles")])
        .unwrap();
    let releaser = locks.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        releaser.release_locks("external");
    });

    let state = StateManager::new(dir.path()).unwrap();
    let opts = quiet_opts().with_lock_timing(Duration::from_millis(10), Duration::from_secs(5));
    let runner = ExecutionRunner::builder(state).opts(opts).locks(locks).build();
    let exec = RecordingExecutor::new();

    let report = runner
        .execute_plan(&plan, SPEC, exec.arc(), ListReviewer::approve_all())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(exec.calls(), vec!["T1"]);
    assert_eq!(report.stats.lock_contention, 1);
}

#[tokio::test]
async fn test_dependency_outputs_reach_context() {
    let dir = tempfile::tempdir().unwrap();
    let plan = worked_plan();
    let exec = RecordingExecutor::new();

    runner(dir.path(), quiet_opts())
        .execute_plan(&plan, SPEC, exec.arc(), ListReviewer::approve_all())
        .await
        .unwrap();

    let slice = exec.context_for("T4").unwrap();
    let mut deps: Vec<&str> = slice.dependencies.iter().map(|d| d.id.as_str()).collect();
    deps.sort();
    assert!(deps.contains(&"T2"));
    assert!(deps.contains(&"T3"));
    let t3 = slice.dependencies.iter().find(|d| d.id == "T3").unwrap();
    assert_eq!(t3.outputs, vec!["src/t3.rs"]);
}

#[tokio::test]
async fn test_task_granularity_checkpoints_more_often() {
    async fn checkpoint_events(granularity: CheckpointGranularity) -> usize {
        let dir = tempfile::tempdir().unwrap();
        let plan = worked_plan();
        let runner = runner(dir.path(), quiet_opts().with_checkpoint(granularity));
        runner
            .execute_plan(&plan, SPEC, RecordingExecutor::new().arc(), ListReviewer::approve_all())
            .await
            .unwrap();
        runner
            .state()
            .event_log()
            .read_all()
            .unwrap()
            .iter()
            .filter(|r| r.event.name() == "checkpoint_created")
            .count()
    }

    let per_layer = checkpoint_events(CheckpointGranularity::Layer).await;
    let per_task = checkpoint_events(CheckpointGranularity::Task).await;
    assert_eq!(per_layer, 3);
    assert_eq!(per_task, 3 + 5);
}

#[test]
fn test_plan_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.json");
    let plan = worked_plan();

    plan.save_to_file(&path).unwrap();
    let loaded = Plan::load_from_file(&path).unwrap();

    assert_eq!(loaded.plan_id, plan.plan_id);
    assert_eq!(loaded.layers, plan.layers);
    assert_eq!(loaded.spec_checksum, plan.spec_checksum);
    loaded.verify().unwrap();
}

#[tokio::test]
async fn test_blockers_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let plan = worked_plan();
    let exec = RecordingExecutor::new().failing(&["T1"]);
    let runner = runner(dir.path(), quiet_opts());

    let report = runner
        .execute_plan(&plan, SPEC, exec.arc(), ListReviewer::approve_all())
        .await
        .unwrap();
    assert_eq!(report.failed_layer, Some(0));

    let session = runner.state().latest_session().unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    let blockers = pending_blockers(&session, &plan);
    let t1 = blockers.iter().find(|b| b.task_id == "T1").unwrap();
    assert!(matches!(t1.reason, BlockReason::Failed { .. }));
    let t4 = blockers.iter().find(|b| b.task_id == "T4").unwrap();
    assert!(matches!(t4.reason, BlockReason::WaitingOnDependencies { .. }));
}
