//! Shared fixtures for the behavioral specs.

#![allow(dead_code)]

use gantry_controller::RunController;
use gantry_core::{
    HookRegistry, QueuedTest, RunConfig, RunSummary, SystemClock, TestStatus, WorkerLimit,
};
use gantry_sandbox::ScriptedEngine;
use gantry_store::{StoreConfig, StoreServer};
use gantry_transport::{Bus, WorkerExit};
use gantry_worker::LocalLauncher;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A full in-process stack: root bus, store server, local workers running
/// a scripted engine, and the run controller on top.
pub struct Stack {
    pub engine: ScriptedEngine,
    pub store: StoreServer,
    pub store_dir: tempfile::TempDir,
    controller: RunController<LocalLauncher, SystemClock>,
    exit_rx: mpsc::Receiver<WorkerExit>,
}

impl Stack {
    pub fn new(config: RunConfig) -> Self {
        Self::with_engine(config, ScriptedEngine::new())
    }

    pub fn with_engine(config: RunConfig, engine: ScriptedEngine) -> Self {
        let hooks = HookRegistry::new();
        let bus = Bus::root();
        let store_dir = tempfile::tempdir().expect("store dir");
        let store = StoreServer::open(
            StoreConfig {
                root: store_dir.path().join("store"),
                caps: config.store_caps,
            },
            hooks.clone(),
        )
        .expect("store open");
        store.serve(&bus);

        let (exit_tx, exit_rx) = mpsc::channel(64);
        let launcher = LocalLauncher::new(
            bus.clone(),
            Arc::new(engine.clone()),
            store.clone(),
            exit_tx,
        );
        let controller = RunController::new(bus, launcher, SystemClock, config, hooks)
            .with_store(store.clone());

        Self {
            engine,
            store,
            store_dir,
            controller,
            exit_rx,
        }
    }

    pub async fn run(self, tests: Vec<QueuedTest>) -> RunSummary {
        self.controller
            .run(tests, self.exit_rx)
            .await
            .expect("run failed to launch")
    }
}

/// Fast-timer config for specs. Retries stay off unless a spec opts in.
pub fn spec_config(workers: usize) -> RunConfig {
    RunConfig {
        worker_limit: WorkerLimit::Count(workers),
        retry_count: 0,
        retry_delay_ms: 30,
        test_timeout_ms: 5_000,
        shutdown_grace_ms: 300,
        cancel_grace_ms: 100,
        ..RunConfig::default()
    }
}

pub fn tests(paths: &[&str]) -> Vec<QueuedTest> {
    paths
        .iter()
        .map(|p| QueuedTest::new(*p, format!("content of {p}")))
        .collect()
}

pub fn status_of<'a>(summary: &'a RunSummary, path: &str) -> &'a TestStatus {
    &summary
        .reports
        .iter()
        .find(|r| r.path == path)
        .unwrap_or_else(|| panic!("no report for {path}"))
        .status
}
