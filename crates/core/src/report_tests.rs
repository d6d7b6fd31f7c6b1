// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn report(path: &str, status: TestStatus) -> TestReport {
    TestReport {
        path: path.to_string(),
        status,
        retries_used: 0,
        logs: Vec::new(),
    }
}

#[test]
fn all_passed_exits_zero() {
    let summary = RunSummary {
        reports: vec![report("/a", TestStatus::Passed), report("/b", TestStatus::Passed)],
        global_timeout_hit: false,
        duration_ms: 10,
    };
    assert_eq!(summary.passed(), 2);
    assert_eq!(summary.exit_code(), 0);
}

#[test]
fn any_failure_exits_one() {
    let summary = RunSummary {
        reports: vec![
            report("/a", TestStatus::Passed),
            report(
                "/b",
                TestStatus::Failed {
                    failure: TestFailure::error("boom"),
                },
            ),
        ],
        global_timeout_hit: false,
        duration_ms: 10,
    };
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.exit_code(), 1);
}

#[test]
fn global_timeout_exits_three() {
    let summary = RunSummary {
        reports: vec![report(
            "/a",
            TestStatus::Cancelled {
                reason: "global timeout".to_string(),
            },
        )],
        global_timeout_hit: true,
        duration_ms: 10,
    };
    assert_eq!(summary.exit_code(), 3);
}

#[test]
fn skipped_tests_do_not_fail_the_run() {
    let summary = RunSummary {
        reports: vec![report("/a", TestStatus::Passed), report("/b", TestStatus::Skipped)],
        global_timeout_hit: false,
        duration_ms: 10,
    };
    assert_eq!(summary.skipped(), 1);
    assert_eq!(summary.exit_code(), 0);
}

#[test]
fn failure_display_includes_path() {
    let failure = TestFailure::timeout("no response").at_path("/src/t.js");
    let text = failure.to_string();
    assert!(text.contains("Timeout"));
    assert!(text.contains("/src/t.js"));
}
