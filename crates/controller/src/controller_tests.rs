// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gantry_core::{HookRegistry, RunConfig, SystemClock, WorkerLimit};
use gantry_transport::{FakeLauncher, FakeWorkerScript};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Rig {
    launcher: FakeLauncher,
    controller: RunController<FakeLauncher, SystemClock>,
    exit_rx: mpsc::Receiver<WorkerExit>,
}

fn rig_with_hooks(config: RunConfig, hooks: HookRegistry) -> Rig {
    let bus = Bus::root();
    let (exit_tx, exit_rx) = mpsc::channel(64);
    let launcher = FakeLauncher::new(bus.clone(), exit_tx);
    let controller = RunController::new(bus, launcher.clone(), SystemClock, config, hooks);
    Rig {
        launcher,
        controller,
        exit_rx,
    }
}

fn rig(config: RunConfig) -> Rig {
    rig_with_hooks(config, HookRegistry::new())
}

/// Fast-timer config: no retries unless a test opts in.
fn config() -> RunConfig {
    RunConfig {
        worker_limit: WorkerLimit::Count(2),
        retry_count: 0,
        retry_delay_ms: 30,
        test_timeout_ms: 5_000,
        shutdown_grace_ms: 300,
        cancel_grace_ms: 100,
        ..RunConfig::default()
    }
}

fn tests(paths: &[&str]) -> Vec<QueuedTest> {
    paths
        .iter()
        .map(|p| QueuedTest::new(*p, format!("content of {p}")))
        .collect()
}

fn status_of<'a>(summary: &'a RunSummary, path: &str) -> &'a TestStatus {
    &summary
        .reports
        .iter()
        .find(|r| r.path == path)
        .unwrap_or_else(|| panic!("no report for {path}"))
        .status
}

#[tokio::test]
async fn happy_path_three_tests_two_workers() {
    let rig = rig(config());
    let summary = rig
        .controller
        .run(tests(&["/a.js", "/b.js", "/c.js"]), rig.exit_rx)
        .await
        .unwrap();

    assert_eq!(summary.passed(), 3);
    assert_eq!(summary.exit_code(), 0);
    assert!(
        rig.launcher.max_in_flight() <= 2,
        "bounded parallelism: saw {} concurrent tests",
        rig.launcher.max_in_flight()
    );
}

#[tokio::test]
async fn single_worker_runs_strictly_sequentially() {
    let mut cfg = config();
    cfg.worker_limit = WorkerLimit::Count(1);
    let rig = rig(cfg);

    let summary = rig
        .controller
        .run(tests(&["/a.js", "/b.js", "/c.js"]), rig.exit_rx)
        .await
        .unwrap();

    assert_eq!(summary.passed(), 3);
    assert_eq!(rig.launcher.max_in_flight(), 1);
}

#[tokio::test]
async fn retry_eventually_succeeds_after_the_delay() {
    let mut cfg = config();
    cfg.retry_count = 2;
    cfg.retry_delay_ms = 50;
    let rig = rig(cfg);
    rig.launcher.script(
        "/flaky.js",
        FakeWorkerScript::FailTimes(1, "first attempt breaks".to_string()),
    );

    let summary = rig
        .controller
        .run(tests(&["/flaky.js"]), rig.exit_rx)
        .await
        .unwrap();

    assert_eq!(summary.passed(), 1);
    let report = &summary.reports[0];
    assert_eq!(report.retries_used, 1);

    let dispatches = rig.launcher.dispatches();
    assert_eq!(dispatches.len(), 2, "one retry means two dispatches");
    let gap = dispatches[1].at - dispatches[0].at;
    assert!(
        gap >= std::time::Duration::from_millis(45),
        "retry dispatched after {gap:?}, expected the 50ms delay"
    );
}

#[tokio::test]
async fn retry_budget_exhausts_into_terminal_failure() {
    let mut cfg = config();
    cfg.retry_count = 1;
    cfg.retry_delay_ms = 10;
    let rig = rig(cfg);
    rig.launcher
        .script("/always-fails.js", FakeWorkerScript::Fail("broken".to_string()));

    let summary = rig
        .controller
        .run(tests(&["/always-fails.js"]), rig.exit_rx)
        .await
        .unwrap();

    assert_eq!(summary.exit_code(), 1);
    assert_eq!(rig.launcher.dispatches().len(), 2, "retry cap: 2 attempts");
    match status_of(&summary, "/always-fails.js") {
        TestStatus::Failed { failure } => assert!(failure.message.contains("broken")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(summary.reports[0].retries_used, 1);
}

#[tokio::test]
async fn bail_skips_everything_after_the_first_terminal_failure() {
    let mut cfg = config();
    cfg.worker_limit = WorkerLimit::Count(1);
    cfg.bail = true;
    let rig = rig(cfg);
    rig.launcher
        .script("/b.js", FakeWorkerScript::Fail("fatal".to_string()));

    let summary = rig
        .controller
        .run(tests(&["/a.js", "/b.js", "/c.js", "/d.js", "/e.js"]), rig.exit_rx)
        .await
        .unwrap();

    assert_eq!(summary.exit_code(), 1);
    assert!(status_of(&summary, "/a.js").is_passed());
    assert!(matches!(
        status_of(&summary, "/b.js"),
        TestStatus::Failed { .. }
    ));
    for path in ["/c.js", "/d.js", "/e.js"] {
        assert!(
            matches!(status_of(&summary, path), TestStatus::Skipped),
            "{path} should be skipped after bail"
        );
    }
    assert_eq!(
        rig.launcher.dispatches().len(),
        2,
        "no dispatch after bail trips"
    );
}

#[tokio::test]
async fn per_test_timeout_cancels_and_reports_timeout() {
    let mut cfg = config();
    cfg.test_timeout_ms = 100;
    let rig = rig(cfg);
    rig.launcher.script("/hangs.js", FakeWorkerScript::Hang);

    let summary = rig
        .controller
        .run(tests(&["/hangs.js"]), rig.exit_rx)
        .await
        .unwrap();

    assert_eq!(summary.exit_code(), 1);
    match status_of(&summary, "/hangs.js") {
        TestStatus::Failed { failure } => {
            assert_eq!(failure.cause, gantry_core::FailureCause::Timeout);
        }
        other => panic!("expected timeout failure, got {other:?}"),
    }
}

#[tokio::test]
async fn unacknowledged_cancel_gets_the_worker_killed() {
    let mut cfg = config();
    cfg.test_timeout_ms = 80;
    cfg.cancel_grace_ms = 60;
    let rig = rig(cfg);
    rig.launcher
        .script("/mute.js", FakeWorkerScript::HangIgnoringCancel);

    let summary = rig
        .controller
        .run(tests(&["/mute.js"]), rig.exit_rx)
        .await
        .unwrap();

    match status_of(&summary, "/mute.js") {
        TestStatus::Failed { failure } => {
            assert_eq!(failure.cause, gantry_core::FailureCause::Timeout);
        }
        other => panic!("expected timeout failure, got {other:?}"),
    }
}

#[tokio::test]
async fn crash_mid_test_restarts_the_worker_and_the_pool_continues() {
    let mut cfg = config();
    cfg.worker_limit = WorkerLimit::Count(1);
    let rig = rig(cfg);
    rig.launcher.script("/crashes.js", FakeWorkerScript::Crash);

    let summary = rig
        .controller
        .run(tests(&["/crashes.js", "/after.js"]), rig.exit_rx)
        .await
        .unwrap();

    match status_of(&summary, "/crashes.js") {
        TestStatus::Failed { failure } => {
            assert_eq!(failure.cause, gantry_core::FailureCause::Crashed);
        }
        other => panic!("expected crash failure, got {other:?}"),
    }
    assert!(
        status_of(&summary, "/after.js").is_passed(),
        "the respawned worker keeps serving the queue"
    );
}

#[tokio::test]
async fn global_timeout_trips_bail_and_exits_three() {
    let mut cfg = config();
    cfg.run_timeout_ms = Some(100);
    let rig = rig(cfg);
    rig.launcher.script("/endless.js", FakeWorkerScript::Hang);

    let summary = rig
        .controller
        .run(tests(&["/endless.js", "/queued.js"]), rig.exit_rx)
        .await
        .unwrap();

    assert!(summary.global_timeout_hit);
    assert_eq!(summary.exit_code(), 3);
    assert!(matches!(
        status_of(&summary, "/endless.js"),
        TestStatus::Cancelled { .. }
    ));
}

#[tokio::test]
async fn empty_run_fires_hooks_and_exits_zero() {
    let hooks = HookRegistry::new();
    let before = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));
    {
        let before = Arc::clone(&before);
        hooks.get_hook(crate::hooks::BEFORE_RUN).tap(move |payload| {
            let before = Arc::clone(&before);
            async move {
                before.fetch_add(1, Ordering::SeqCst);
                Ok(payload)
            }
        });
    }
    {
        let after = Arc::clone(&after);
        hooks.get_hook(crate::hooks::AFTER_RUN).tap(move |payload| {
            let after = Arc::clone(&after);
            async move {
                after.fetch_add(1, Ordering::SeqCst);
                Ok(payload)
            }
        });
    }

    let rig = rig_with_hooks(config(), hooks);
    let summary = rig.controller.run(Vec::new(), rig.exit_rx).await.unwrap();

    assert!(summary.reports.is_empty());
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(after.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn should_not_start_veto_skips_the_test() {
    let hooks = HookRegistry::new();
    hooks
        .get_hook(crate::hooks::SHOULD_NOT_START)
        .tap(|mut payload| async move {
            if payload["path"] == "/skipped.js" {
                payload["veto"] = serde_json::json!(true);
            }
            Ok(payload)
        });

    let rig = rig_with_hooks(config(), hooks);
    let summary = rig
        .controller
        .run(tests(&["/skipped.js", "/runs.js"]), rig.exit_rx)
        .await
        .unwrap();

    assert!(matches!(
        status_of(&summary, "/skipped.js"),
        TestStatus::Skipped
    ));
    assert!(status_of(&summary, "/runs.js").is_passed());
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn should_not_retry_veto_makes_the_first_failure_terminal() {
    let mut cfg = config();
    cfg.retry_count = 5;
    cfg.retry_delay_ms = 10;
    let hooks = HookRegistry::new();
    hooks
        .get_hook(crate::hooks::SHOULD_NOT_RETRY)
        .tap(|mut payload| async move {
            payload["veto"] = serde_json::json!(true);
            Ok(payload)
        });

    let rig = rig_with_hooks(cfg, hooks);
    rig.launcher
        .script("/fails.js", FakeWorkerScript::Fail("nope".to_string()));

    let summary = rig
        .controller
        .run(tests(&["/fails.js"]), rig.exit_rx)
        .await
        .unwrap();

    assert_eq!(rig.launcher.dispatches().len(), 1, "veto stops the retry");
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn retries_requeue_at_the_tail_behind_fresh_tests() {
    let mut cfg = config();
    cfg.worker_limit = WorkerLimit::Count(1);
    cfg.retry_count = 1;
    cfg.retry_delay_ms = 5;
    let rig = rig(cfg);
    rig.launcher.script(
        "/flaky.js",
        FakeWorkerScript::FailTimes(1, "flake".to_string()),
    );
    rig.launcher.set_delay(std::time::Duration::from_millis(30));

    let summary = rig
        .controller
        .run(tests(&["/flaky.js", "/fresh.js"]), rig.exit_rx)
        .await
        .unwrap();

    assert_eq!(summary.passed(), 2);
    let dispatches = rig.launcher.dispatches();
    let order: Vec<&str> = dispatches.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(
        order,
        ["/flaky.js", "/fresh.js", "/flaky.js"],
        "the retry never preempts the fresh test"
    );
}

#[tokio::test]
async fn restart_worker_respawns_between_tests() {
    let mut cfg = config();
    cfg.worker_limit = WorkerLimit::Count(1);
    cfg.restart_worker = true;
    let rig = rig(cfg);

    let summary = rig
        .controller
        .run(tests(&["/a.js", "/b.js"]), rig.exit_rx)
        .await
        .unwrap();

    assert_eq!(summary.passed(), 2);
    assert_eq!(rig.launcher.max_in_flight(), 1);
}
