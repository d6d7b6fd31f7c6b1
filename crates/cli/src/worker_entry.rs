// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry point for spawned worker processes.

use gantry_store::StoreClient;
use gantry_transport::{connect_worker, worker_args};
use gantry_worker::{NoOpBrowserProxy, TestWorker};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Boot a worker from its reserved argv flags. Returns the exit code.
pub async fn run_worker(args: &[String]) -> i32 {
    let Some(worker) = worker_args(args) else {
        eprintln!("error: malformed worker invocation");
        return 2;
    };

    // Workers log to stderr only; the root owns the run log.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GANTRY_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();

    let engine_name = std::env::var("GANTRY_ENGINE").unwrap_or_else(|_| "noop".to_string());
    let engine = match crate::engine::engine_by_name(&engine_name) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e:#}");
            return 2;
        }
    };

    if let Some(port) = worker.debug_port {
        tracing::info!(worker_id = %worker.worker_id, port, "debug port allocated");
    }

    let bus = match connect_worker(&worker.socket_path, worker.worker_id.clone()).await {
        Ok(bus) => bus,
        Err(e) => {
            eprintln!("error: cannot reach the run controller: {e}");
            return 2;
        }
    };

    let store = StoreClient::remote(bus.clone());
    let test_worker = TestWorker::new(
        bus,
        worker.worker_id,
        engine,
        Arc::new(NoOpBrowserProxy),
        store,
    );
    test_worker.run().await
}
