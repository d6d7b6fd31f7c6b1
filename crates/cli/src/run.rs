// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `run` command: collect tests, wire the root, execute, report.

use anyhow::Context;
use clap::Args;
use gantry_controller::RunController;
use gantry_core::{
    HookRegistry, QueuedTest, RunConfig, RunSummary, SystemClock, TestFailure, TestReport,
    TestStatus, WorkerLimit,
};
use gantry_sandbox::{DependencyBuilder, FsReader};
use gantry_store::{StoreConfig, StoreServer};
use gantry_transport::{Bus, ProcessLauncher};
use gantry_worker::LocalLauncher;
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Args)]
pub struct RunArgs {
    /// Project config file (default: ./gantry.toml when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Environment overlay applied over the project config
    #[arg(long = "env-config", value_name = "PATH")]
    pub env_config: Option<PathBuf>,

    /// Glob selecting test entry files
    #[arg(long, value_name = "GLOB")]
    pub tests: Option<String>,

    /// Plugin names recorded for host embeddings
    #[arg(long, value_name = "NAME", num_args = 0..)]
    pub plugins: Vec<String>,

    /// Worker pool size, or "local" for one in-process worker
    #[arg(long = "worker-limit", value_name = "N|local")]
    pub worker_limit: Option<WorkerLimit>,

    /// Retries granted to each test beyond its first attempt
    #[arg(long = "retry-count", value_name = "N")]
    pub retry_count: Option<u32>,

    /// Delay before a retry is re-enqueued
    #[arg(long = "retry-delay", value_name = "MS")]
    pub retry_delay: Option<u64>,

    /// Stop dispatching after the first terminal failure
    #[arg(long)]
    pub bail: bool,

    /// Per-test timeout
    #[arg(long = "test-timeout", value_name = "MS")]
    pub test_timeout: Option<u64>,

    /// Allocate debug ports for workers
    #[arg(long)]
    pub debug: bool,
}

pub async fn execute(args: RunArgs) -> anyhow::Result<i32> {
    let config = crate::config::load(&args)?;
    let (_log_guard, log_path) = crate::logging::init(&config)?;
    tracing::info!(log = %log_path.display(), "gantry run starting");

    let (tests, prefailed) = collect_tests(&config)?;
    if tests.is_empty() && prefailed.is_empty() {
        tracing::info!("no tests matched");
    }

    let hooks = HookRegistry::new();
    let bus = Bus::root();

    let store_root = config
        .store_root
        .clone()
        .unwrap_or_else(|| crate::config::default_state_dir().join("store"));
    let store = StoreServer::open(
        StoreConfig {
            root: store_root,
            caps: config.store_caps,
        },
        hooks.clone(),
    )?;
    store.serve(&bus);

    let (exit_tx, exit_rx) = mpsc::channel(64);
    let engine = crate::engine::engine_by_name(&config.engine)?;

    let mut summary = if config.worker_limit.is_local() {
        let launcher = LocalLauncher::new(bus.clone(), engine, store.clone(), exit_tx);
        let controller = RunController::new(
            bus,
            launcher,
            SystemClock,
            config.clone(),
            hooks,
        )
        .with_store(store.clone());
        controller.run(tests, exit_rx).await?
    } else {
        // Workers pick the engine up from the environment on re-invocation.
        std::env::set_var("GANTRY_ENGINE", &config.engine);

        let socket_dir = crate::config::default_state_dir();
        std::fs::create_dir_all(&socket_dir)?;
        let socket_path = socket_dir.join(format!("run-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&socket_path);

        let launcher = ProcessLauncher::bind(bus.clone(), socket_path.clone(), exit_tx)?;
        let controller = RunController::new(
            bus,
            launcher,
            SystemClock,
            config.clone(),
            hooks,
        )
        .with_store(store.clone());
        let summary = controller.run(tests, exit_rx).await?;
        let _ = std::fs::remove_file(&socket_path);
        summary
    };

    for (path, message) in prefailed {
        summary.reports.push(TestReport {
            path: path.clone(),
            status: TestStatus::Failed {
                failure: TestFailure::error(message).at_path(path),
            },
            retries_used: 0,
            logs: Vec::new(),
        });
    }

    print_summary(&summary);
    Ok(summary.exit_code())
}

/// Expand the tests glob, read each entry, and build its dependency
/// closure. Files whose closure cannot be built are reported as failed
/// without ever being dispatched.
fn collect_tests(config: &RunConfig) -> anyhow::Result<(Vec<QueuedTest>, Vec<(String, String)>)> {
    let Some(pattern) = &config.tests else {
        return Ok((Vec::new(), Vec::new()));
    };

    let builder = DependencyBuilder::new(FsReader);
    let mut ready = Vec::new();
    let mut prefailed = Vec::new();

    for entry in glob::glob(pattern).with_context(|| format!("bad tests glob {pattern:?}"))? {
        let path = entry?;
        if !path.is_file() {
            continue;
        }
        let path = path
            .canonicalize()
            .with_context(|| format!("cannot resolve {}", path.display()))?;
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let path_str = path.to_string_lossy().to_string();

        match builder.build(&path, &content) {
            Ok(dict) => {
                let mut test = QueuedTest::new(path_str, content).with_dependencies(dict);
                test.env_parameters = config.env_parameters.clone();
                ready.push(test);
            }
            Err(e) => {
                tracing::warn!(path = %path_str, error = %e, "dependency build failed");
                prefailed.push((path_str, e.to_string()));
            }
        }
    }

    ready.sort_by(|a, b| a.path.cmp(&b.path));
    Ok((ready, prefailed))
}

fn print_summary(summary: &RunSummary) {
    println!();
    for report in &summary.reports {
        let (tag, detail) = match &report.status {
            TestStatus::Passed => ("PASS", String::new()),
            TestStatus::Failed { failure } => ("FAIL", format!(" ({failure})")),
            TestStatus::Cancelled { reason } => ("CANCEL", format!(" ({reason})")),
            TestStatus::Skipped => ("SKIP", String::new()),
        };
        let retries = if report.retries_used > 0 {
            format!(" [retries: {}]", report.retries_used)
        } else {
            String::new()
        };
        println!("  {tag:>6}  {}{retries}{detail}", report.path);
    }
    println!(
        "\n{} passed, {} failed, {} skipped in {} ms{}",
        summary.passed(),
        summary.failed(),
        summary.skipped(),
        summary.duration_ms,
        if summary.global_timeout_hit {
            " (global timeout)"
        } else {
            ""
        }
    );
}
