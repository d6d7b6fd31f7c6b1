//! The end-to-end run scenarios, on the full in-process stack.

use crate::prelude::*;
use gantry_core::{FailureCause, TestStatus};
use gantry_sandbox::RunScript;
use std::time::Duration;

#[tokio::test]
async fn happy_path_three_tests_two_workers() {
    let stack = Stack::new(spec_config(2));
    let summary = stack.run(tests(&["/a.js", "/b.js", "/c.js"])).await;

    assert_eq!(summary.passed(), 3);
    assert_eq!(summary.failed(), 0);
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn retry_eventually_succeeds_with_delay_between_attempts() {
    let mut config = spec_config(1);
    config.retry_count = 2;
    config.retry_delay_ms = 50;
    let stack = Stack::new(config);
    stack.engine.script_run(
        "/flaky.js",
        RunScript::FailTimes(1, "first attempt fails".to_string()),
    );

    let started = std::time::Instant::now();
    let summary = stack.run(tests(&["/flaky.js"])).await;

    assert_eq!(summary.passed(), 1);
    assert_eq!(summary.reports[0].retries_used, 1);
    assert!(
        started.elapsed() >= Duration::from_millis(50),
        "the retry delay must elapse between attempts"
    );
}

#[tokio::test]
async fn retry_budget_exhausts_after_exactly_two_attempts() {
    let mut config = spec_config(1);
    config.retry_count = 1;
    config.retry_delay_ms = 10;
    let stack = Stack::new(config);
    stack
        .engine
        .script_run("/doomed.js", RunScript::Fail("always broken".to_string()));
    let engine = stack.engine.clone();

    let summary = stack.run(tests(&["/doomed.js"])).await;

    assert_eq!(summary.exit_code(), 1);
    assert_eq!(engine.ran().len(), 2, "retry cap of 1 means two attempts");
    match status_of(&summary, "/doomed.js") {
        TestStatus::Failed { failure } => {
            assert!(failure.message.contains("always broken"));
        }
        other => panic!("expected terminal failure, got {other:?}"),
    }
}

#[tokio::test]
async fn bail_reports_undispatched_tests_without_running_them() {
    let mut config = spec_config(1);
    config.bail = true;
    let stack = Stack::new(config);
    stack
        .engine
        .script_run("/2.js", RunScript::Fail("fatal".to_string()));
    let engine = stack.engine.clone();

    let summary = stack
        .run(tests(&["/1.js", "/2.js", "/3.js", "/4.js", "/5.js"]))
        .await;

    assert_eq!(summary.exit_code(), 1);
    assert!(status_of(&summary, "/1.js").is_passed());
    assert!(matches!(
        status_of(&summary, "/2.js"),
        TestStatus::Failed { .. }
    ));
    for path in ["/3.js", "/4.js", "/5.js"] {
        assert!(matches!(status_of(&summary, path), TestStatus::Skipped));
    }
    assert_eq!(engine.ran().len(), 2, "tests 3-5 never reached a worker");
}

#[tokio::test]
async fn per_test_timeout_cancels_within_the_window() {
    let mut config = spec_config(1);
    config.test_timeout_ms = 100;
    let stack = Stack::new(config);
    stack.engine.script_run("/sleepy.js", RunScript::Hang);

    let started = std::time::Instant::now();
    let summary = stack.run(tests(&["/sleepy.js"])).await;

    assert!(
        started.elapsed() < Duration::from_secs(2),
        "the run must not wait out the hang"
    );
    match status_of(&summary, "/sleepy.js") {
        TestStatus::Failed { failure } => {
            assert_eq!(failure.cause, FailureCause::Timeout);
        }
        other => panic!("expected a timeout failure, got {other:?}"),
    }
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn worker_crash_mid_test_restarts_and_the_pool_proceeds() {
    use gantry_controller::RunController;
    use gantry_core::{HookRegistry, SystemClock};
    use gantry_transport::{Bus, FakeLauncher, FakeWorkerScript};

    // A hard process death needs the scriptable launcher.
    let bus = Bus::root();
    let (exit_tx, exit_rx) = tokio::sync::mpsc::channel(64);
    let launcher = FakeLauncher::new(bus.clone(), exit_tx);
    launcher.script("/dies.js", FakeWorkerScript::Crash);

    let mut config = spec_config(1);
    config.worker_limit = gantry_core::WorkerLimit::Count(1);
    let controller = RunController::new(
        bus,
        launcher.clone(),
        SystemClock,
        config,
        HookRegistry::new(),
    );

    let summary = controller
        .run(tests(&["/dies.js", "/next.js"]), exit_rx)
        .await
        .unwrap();

    match status_of(&summary, "/dies.js") {
        TestStatus::Failed { failure } => {
            assert_eq!(failure.cause, FailureCause::Crashed);
        }
        other => panic!("expected a crash failure, got {other:?}"),
    }
    assert!(
        status_of(&summary, "/next.js").is_passed(),
        "a restarted worker serves the rest of the queue"
    );
}

#[tokio::test]
async fn global_timeout_aborts_the_run_with_exit_three() {
    let mut config = spec_config(2);
    config.run_timeout_ms = Some(150);
    let stack = Stack::new(config);
    stack.engine.script_run("/forever.js", RunScript::Hang);

    let summary = stack.run(tests(&["/forever.js"])).await;

    assert!(summary.global_timeout_hit);
    assert_eq!(summary.exit_code(), 3);
    assert!(matches!(
        status_of(&summary, "/forever.js"),
        TestStatus::Cancelled { .. }
    ));
}

#[tokio::test]
async fn empty_test_list_exits_zero() {
    let stack = Stack::new(spec_config(2));
    let summary = stack.run(Vec::new()).await;
    assert!(summary.reports.is_empty());
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn single_worker_runs_the_whole_queue_sequentially() {
    let stack = Stack::new(spec_config(1));
    let engine = stack.engine.clone();
    let summary = stack.run(tests(&["/a.js", "/b.js", "/c.js", "/d.js"])).await;

    assert_eq!(summary.passed(), 4);
    assert_eq!(engine.ran().len(), 4);
}
