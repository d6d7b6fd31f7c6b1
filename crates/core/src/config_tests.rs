// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn defaults_are_sane() {
    let config = RunConfig::default();
    assert_eq!(config.worker_limit, WorkerLimit::Count(2));
    assert_eq!(config.retry_count, 3);
    assert!(!config.bail);
    assert!(config.run_timeout_ms.is_none());
    assert_eq!(config.store_caps.text, 10);
    assert_eq!(config.engine, "noop");
}

#[test]
fn parses_toml_with_numeric_worker_limit() {
    let config = RunConfig::from_toml_str(
        r#"
        tests = "tests/**/*.spec.js"
        worker_limit = 4
        retry_count = 1
        bail = true
        "#,
    )
    .unwrap();

    assert_eq!(config.tests.as_deref(), Some("tests/**/*.spec.js"));
    assert_eq!(config.worker_limit, WorkerLimit::Count(4));
    assert_eq!(config.retry_count, 1);
    assert!(config.bail);
    // Unset fields keep defaults
    assert_eq!(config.retry_delay_ms, 2_000);
}

#[test]
fn parses_local_worker_limit() {
    let config = RunConfig::from_toml_str("worker_limit = \"local\"").unwrap();
    assert_eq!(config.worker_limit, WorkerLimit::Local);
    assert!(config.worker_limit.is_local());
}

#[parameterized(
    local = { "local", WorkerLimit::Local },
    upper = { "LOCAL", WorkerLimit::Local },
    count = { "8", WorkerLimit::Count(8) },
)]
fn worker_limit_from_str(input: &str, expected: WorkerLimit) {
    assert_eq!(input.parse::<WorkerLimit>().unwrap(), expected);
}

#[test]
fn worker_limit_rejects_garbage() {
    assert!("quick".parse::<WorkerLimit>().is_err());
}

#[parameterized(
    zero_queue = { WorkerLimit::Count(4), 0, 0 },
    bounded_by_queue = { WorkerLimit::Count(4), 2, 2 },
    bounded_by_limit = { WorkerLimit::Count(2), 10, 2 },
    local_is_one = { WorkerLimit::Local, 10, 1 },
    local_zero_queue = { WorkerLimit::Local, 0, 0 },
)]
fn effective_pool_size(limit: WorkerLimit, queued: usize, expected: usize) {
    assert_eq!(limit.effective(queued), expected);
}

#[test]
fn overlay_applies_only_set_fields() {
    let mut config = RunConfig::default();
    let overlay = RunConfigOverlay::from_toml_str(
        r#"
        worker_limit = "local"
        retry_delay_ms = 50
        run_timeout_ms = 60000
        "#,
    )
    .unwrap();

    overlay.apply(&mut config);

    assert_eq!(config.worker_limit, WorkerLimit::Local);
    assert_eq!(config.retry_delay_ms, 50);
    assert_eq!(config.run_timeout_ms, Some(60_000));
    // Untouched by the overlay
    assert_eq!(config.retry_count, 3);
    assert_eq!(config.test_timeout_ms, 30_000);
}

#[test]
fn store_caps_per_class() {
    let caps = StoreCaps {
        text: 1,
        binary: 2,
        screenshot: 3,
    };
    assert_eq!(caps.for_class(FileClass::Text), 1);
    assert_eq!(caps.for_class(FileClass::Binary), 2);
    assert_eq!(caps.for_class(FileClass::Screenshot), 3);
}

#[test]
fn config_round_trips_through_toml() {
    let mut config = RunConfig::default();
    config.tests = Some("demo/*.js".to_string());
    config.worker_limit = WorkerLimit::Local;

    let text = toml::to_string(&config).unwrap();
    let back = RunConfig::from_toml_str(&text).unwrap();
    assert_eq!(back, config);
}
