#![cfg(unix)]

use pretty_assertions::assert_eq;
use strata_core::config::{PluginsConfig, ReviewerKind};
use strata_core::executor::{ExecutionOpts, ExecutionRunner, FailureKind};
use strata_core::plan::{PlanBuilder, Task};
use strata_core::state::StateManager;
use strata_plugins::factory::{build_executor, build_reviewer};

fn quiet() -> ExecutionOpts {
    let mut opts = ExecutionOpts::default();
    opts.quiet = true;
    opts.progress_bar = false;
    opts
}

#[tokio::test]
async fn test_shell_executor_drives_plan() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    let plan = PlanBuilder::new("shell")
        .build(
            vec![
                Task::new("T1", "profiles table").with_tables(["profiles"]),
                Task::new("T2", "profile api").depends_on(["T1"]),
            ],
            b"spec",
        )
        .unwrap();

    let cfg = PluginsConfig {
        executor_command: Some(format!(
            "cat > /dev/null; touch {0}/$STRATA_TASK_ID && echo \"{{\\\"success\\\": true, \\\"files_created\\\": [\\\"$STRATA_TASK_ID\\\"]}}\"",
            out_dir.display()
        )),
        reviewer: ReviewerKind::Outputs,
        reviewer_command: None,
    };

    let runner = ExecutionRunner::builder(StateManager::new(dir.path().join("state")).unwrap())
        .opts(quiet())
        .build();
    let report = runner
        .execute_plan(
            &plan,
            b"spec",
            build_executor(&cfg).unwrap(),
            build_reviewer(&cfg).unwrap(),
        )
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.completed, vec!["T1", "T2"]);
    assert!(out_dir.join("T1").exists());
    assert!(out_dir.join("T2").exists());
}

#[tokio::test]
async fn test_rejecting_review_command_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let plan = PlanBuilder::new("rejected")
        .build(vec![Task::new("T1", "t")], b"spec")
        .unwrap();

    let cfg = PluginsConfig {
        executor_command: Some("cat > /dev/null".into()),
        reviewer: ReviewerKind::Command,
        reviewer_command: Some("cat > /dev/null; echo 'naming convention violated'; exit 2".into()),
    };

    let runner = ExecutionRunner::builder(StateManager::new(dir.path()).unwrap())
        .opts(quiet())
        .build();
    let report = runner
        .execute_plan(
            &plan,
            b"spec",
            build_executor(&cfg).unwrap(),
            build_reviewer(&cfg).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(report.failed, vec!["T1"]);
    assert_eq!(report.failures[0].kind, FailureKind::ReviewRejected);
    assert_eq!(report.failures[0].message, "naming convention violated");
}
