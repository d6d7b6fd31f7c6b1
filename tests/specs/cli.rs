//! Black-box CLI specs: exit codes and the multiprocess run path.

use assert_cmd::Command;
use std::path::Path;
use std::time::Duration;

struct RunResult {
    output: std::process::Output,
}

impl RunResult {
    fn code(self, expected: i32) -> Self {
        assert_eq!(
            self.output.status.code(),
            Some(expected),
            "unexpected exit code\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&self.output.stdout),
            String::from_utf8_lossy(&self.output.stderr),
        );
        self
    }

    fn stdout_has(self, needle: &str) -> Self {
        let stdout = String::from_utf8_lossy(&self.output.stdout);
        assert!(
            stdout.contains(needle),
            "stdout missing {needle:?}:\n{stdout}"
        );
        self
    }
}

fn gantry(dir: &Path, args: &[&str]) -> RunResult {
    let output = Command::cargo_bin("gantry")
        .expect("gantry binary")
        .current_dir(dir)
        .args(args)
        .timeout(Duration::from_secs(60))
        .output()
        .expect("failed to run gantry");
    RunResult { output }
}

#[test]
fn help_shows_usage() {
    let dir = tempfile::tempdir().unwrap();
    gantry(dir.path(), &["--help"]).code(0).stdout_has("Usage");
}

#[test]
fn run_help_shows_the_flags() {
    let dir = tempfile::tempdir().unwrap();
    gantry(dir.path(), &["run", "--help"])
        .code(0)
        .stdout_has("--worker-limit")
        .stdout_has("--retry-count")
        .stdout_has("--bail");
}

#[test]
fn empty_run_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    gantry(dir.path(), &["run"]).code(0);
}

#[test]
fn missing_config_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    gantry(dir.path(), &["run", "--config", "nope.toml"]).code(2);
}

#[test]
fn unknown_engine_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("gantry.toml"), "engine = \"v8\"\n").unwrap();
    gantry(dir.path(), &["run"]).code(2);
}

#[test]
fn malformed_worker_invocation_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    gantry(dir.path(), &["--gantry-worker", "w-1"]).code(2);
}

#[test]
fn multiprocess_run_executes_tests_from_a_glob() {
    let dir = tempfile::tempdir().unwrap();
    let tests_dir = dir.path().join("tests");
    std::fs::create_dir_all(&tests_dir).unwrap();
    std::fs::write(
        tests_dir.join("one.spec.js"),
        "const helper = require(\"./helper\");\n",
    )
    .unwrap();
    std::fs::write(tests_dir.join("two.spec.js"), "// standalone\n").unwrap();
    std::fs::write(tests_dir.join("helper.js"), "module.exports = 1;\n").unwrap();

    gantry(
        dir.path(),
        &["run", "--tests", "tests/*.spec.js", "--worker-limit", "2"],
    )
    .code(0)
    .stdout_has("2 passed");
}

#[test]
fn failing_dependency_resolution_fails_the_test_not_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let tests_dir = dir.path().join("tests");
    std::fs::create_dir_all(&tests_dir).unwrap();
    std::fs::write(tests_dir.join("broken.spec.js"), "require(\"./missing\");\n").unwrap();
    std::fs::write(tests_dir.join("ok.spec.js"), "// fine\n").unwrap();

    gantry(
        dir.path(),
        &["run", "--tests", "tests/*.spec.js", "--worker-limit", "1"],
    )
    .code(1)
    .stdout_has("1 passed")
    .stdout_has("FAIL");
}
