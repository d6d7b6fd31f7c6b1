//! Cross-cutting run invariants: every input test resolves exactly once,
//! retries never exceed their cap, and parallelism stays bounded.

use crate::prelude::*;
use gantry_core::TestStatus;
use gantry_sandbox::RunScript;
use std::collections::HashSet;

#[tokio::test]
async fn every_input_test_is_reported_exactly_once() {
    let mut config = spec_config(2);
    config.retry_count = 1;
    config.retry_delay_ms = 5;
    let stack = Stack::new(config);
    stack
        .engine
        .script_run("/b.js", RunScript::FailTimes(1, "flake".to_string()));
    stack
        .engine
        .script_run("/d.js", RunScript::Fail("always".to_string()));

    let input = ["/a.js", "/b.js", "/c.js", "/d.js", "/e.js"];
    let summary = stack.run(tests(&input)).await;

    assert_eq!(summary.reports.len(), input.len());
    let paths: HashSet<&str> = summary.reports.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths.len(), input.len(), "no duplicate verdicts");
    for path in input {
        assert!(paths.contains(path), "missing report for {path}");
    }
}

#[tokio::test]
async fn no_test_exceeds_max_retries_plus_one_attempts() {
    let mut config = spec_config(1);
    config.retry_count = 2;
    config.retry_delay_ms = 5;
    let stack = Stack::new(config);
    stack
        .engine
        .script_run("/stubborn.js", RunScript::Fail("never passes".to_string()));
    let engine = stack.engine.clone();

    let summary = stack.run(tests(&["/stubborn.js"])).await;

    assert_eq!(
        engine.ran().len(),
        3,
        "retry cap 2 allows exactly three attempts"
    );
    assert_eq!(summary.reports[0].retries_used, 2);
    assert!(matches!(
        status_of(&summary, "/stubborn.js"),
        TestStatus::Failed { .. }
    ));
}

#[tokio::test]
async fn parallelism_never_exceeds_the_worker_limit() {
    use gantry_controller::RunController;
    use gantry_core::{HookRegistry, SystemClock};
    use gantry_transport::{Bus, FakeLauncher};

    let bus = Bus::root();
    let (exit_tx, exit_rx) = tokio::sync::mpsc::channel(64);
    let launcher = FakeLauncher::new(bus.clone(), exit_tx);
    launcher.set_delay(std::time::Duration::from_millis(25));

    let mut config = spec_config(3);
    config.worker_limit = gantry_core::WorkerLimit::Count(3);
    let controller = RunController::new(
        bus,
        launcher.clone(),
        SystemClock,
        config,
        HookRegistry::new(),
    );

    let paths: Vec<String> = (0..9).map(|i| format!("/t{i}.js")).collect();
    let inputs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let summary = controller.run(tests(&inputs), exit_rx).await.unwrap();

    assert_eq!(summary.passed(), 9);
    assert!(
        launcher.max_in_flight() <= 3,
        "observed {} concurrent tests with a limit of 3",
        launcher.max_in_flight()
    );
}

#[tokio::test]
async fn bail_reporting_is_consistent_between_in_flight_and_queued() {
    // Two workers: when /fails.js trips bail, /slow.js is mid-flight (it
    // gets cancelled) while the rest are still queued (they get skipped).
    let mut config = spec_config(2);
    config.bail = true;
    let stack = Stack::new(config);
    stack
        .engine
        .script_run("/slow.js", RunScript::SleepThenPass(std::time::Duration::from_millis(300)));
    stack
        .engine
        .script_run("/fails.js", RunScript::Fail("fatal".to_string()));

    let summary = stack
        .run(tests(&["/slow.js", "/fails.js", "/q1.js", "/q2.js"]))
        .await;

    assert!(matches!(
        status_of(&summary, "/fails.js"),
        TestStatus::Failed { .. }
    ));
    assert!(
        matches!(status_of(&summary, "/slow.js"), TestStatus::Cancelled { .. }),
        "in-flight work at bail time reports cancelled, got {:?}",
        status_of(&summary, "/slow.js")
    );
    for path in ["/q1.js", "/q2.js"] {
        assert!(
            matches!(status_of(&summary, path), TestStatus::Skipped),
            "undispatched work reports skipped"
        );
    }
    assert_eq!(summary.exit_code(), 1);
}
