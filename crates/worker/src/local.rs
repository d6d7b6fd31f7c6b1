// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process worker hosting for `worker_limit = local`.
//!
//! The local launcher spawns a [`TestWorker`] as a task on a child bus
//! wired to the root bus through in-memory channels. Same protocol, same
//! invariants, no child processes.

use crate::browser::{BrowserProxy, NoOpBrowserProxy};
use crate::run::TestWorker;
use async_trait::async_trait;
use gantry_sandbox::ScriptEngine;
use gantry_store::{StoreClient, StoreServer};
use gantry_transport::{
    Bus, LaunchError, WorkerControl, WorkerExit, WorkerHandle, WorkerLauncher, WorkerSpawnOptions,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Launcher hosting workers inside the root process.
#[derive(Clone)]
pub struct LocalLauncher {
    bus: Bus,
    engine: Arc<dyn ScriptEngine>,
    browser: Arc<dyn BrowserProxy>,
    store: StoreServer,
    exit_tx: mpsc::Sender<WorkerExit>,
}

impl LocalLauncher {
    pub fn new(
        bus: Bus,
        engine: Arc<dyn ScriptEngine>,
        store: StoreServer,
        exit_tx: mpsc::Sender<WorkerExit>,
    ) -> Self {
        Self {
            bus,
            engine,
            browser: Arc::new(NoOpBrowserProxy),
            store,
            exit_tx,
        }
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserProxy>) -> Self {
        self.browser = browser;
        self
    }
}

#[async_trait]
impl WorkerLauncher for LocalLauncher {
    async fn spawn(&self, options: WorkerSpawnOptions) -> Result<WorkerHandle, LaunchError> {
        let worker_id = options.worker_id.clone();
        let process_id = worker_id.process_id();

        // Root -> worker half.
        let (to_worker_tx, mut to_worker_rx) = mpsc::channel(64);
        self.bus.register_peer(process_id.clone());
        self.bus.connect_peer(process_id.clone(), to_worker_tx).await;

        // Worker -> root half.
        let (to_root_tx, mut to_root_rx) = mpsc::channel(64);
        let child_bus = Bus::child(process_id.clone(), to_root_tx);

        // Pump both directions between the buses.
        let child_inbound = child_bus.inbound_sender();
        tokio::spawn(async move {
            while let Some(envelope) = to_worker_rx.recv().await {
                if child_inbound.send(envelope).await.is_err() {
                    break;
                }
            }
        });
        let root_inbound = self.bus.inbound_sender();
        tokio::spawn(async move {
            while let Some(envelope) = to_root_rx.recv().await {
                if root_inbound.send(envelope).await.is_err() {
                    break;
                }
            }
        });

        let worker = TestWorker::new(
            child_bus,
            worker_id.clone(),
            Arc::clone(&self.engine),
            Arc::clone(&self.browser),
            StoreClient::local(self.store.clone(), process_id.clone()),
        );

        let bus = self.bus.clone();
        let exit_tx = self.exit_tx.clone();
        let task_worker = worker_id.clone();
        let join = tokio::spawn(async move {
            let code = worker.run().await;
            bus.unregister_peer(&task_worker.process_id());
            let _ = exit_tx
                .send(WorkerExit {
                    worker_id: task_worker,
                    code: Some(code),
                })
                .await;
        });

        Ok(WorkerHandle::new(
            worker_id.clone(),
            None,
            Arc::new(LocalControl {
                join,
                bus: self.bus.clone(),
                worker_id,
                exit_tx: self.exit_tx.clone(),
            }),
        ))
    }
}

struct LocalControl {
    join: tokio::task::JoinHandle<()>,
    bus: Bus,
    worker_id: gantry_core::WorkerId,
    exit_tx: mpsc::Sender<WorkerExit>,
}

#[async_trait]
impl WorkerControl for LocalControl {
    async fn kill(&self) {
        self.join.abort();
        self.bus.unregister_peer(&self.worker_id.process_id());
        let _ = self
            .exit_tx
            .send(WorkerExit {
                worker_id: self.worker_id.clone(),
                code: None,
            })
            .await;
    }
}
