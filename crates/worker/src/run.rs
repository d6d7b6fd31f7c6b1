// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-worker execution loop.

use crate::browser::BrowserProxy;
use crate::host::HostContext;
use gantry_core::{
    FileNode, Message, MessageKind, ProcessId, QueuedTest, SystemClock, TestFailure, WorkerId,
};
use gantry_logger::LogClient;
use gantry_sandbox::{Sandbox, SandboxError, ScriptEngine};
use gantry_store::StoreClient;
use gantry_transport::Bus;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifecycle phase of a worker. One test at a time, strictly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Loading,
    Executing,
    Reporting,
    Exiting,
}

enum AfterTest {
    Continue,
    Exit,
}

/// The worker loop: receive a test, build a fresh sandbox, run, report,
/// tear down, repeat.
pub struct TestWorker {
    bus: Bus,
    worker_id: WorkerId,
    engine: Arc<dyn ScriptEngine>,
    browser: Arc<dyn BrowserProxy>,
    store: StoreClient,
    logger: LogClient<SystemClock>,
    phase: Arc<Mutex<WorkerPhase>>,
}

impl TestWorker {
    pub fn new(
        bus: Bus,
        worker_id: WorkerId,
        engine: Arc<dyn ScriptEngine>,
        browser: Arc<dyn BrowserProxy>,
        store: StoreClient,
    ) -> Self {
        let logger = LogClient::new(bus.clone(), worker_id.as_str(), SystemClock);
        Self {
            bus,
            worker_id,
            engine,
            browser,
            store,
            logger,
            phase: Arc::new(Mutex::new(WorkerPhase::Idle)),
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: WorkerPhase) {
        *self.phase.lock() = phase;
    }

    /// Run until shutdown. Returns the process exit code.
    pub async fn run(&self) -> i32 {
        if let Err(e) = self
            .bus
            .send(
                &ProcessId::root(),
                Message::WorkerHello {
                    worker_id: self.worker_id.clone(),
                },
            )
            .await
        {
            tracing::error!(error = %e, "worker hello failed");
            return 1;
        }

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        for kind in [
            MessageKind::ExecuteTest,
            MessageKind::CancelTest,
            MessageKind::Shutdown,
        ] {
            let tx = event_tx.clone();
            self.bus.on(kind, move |message, _source| {
                let _ = tx.send(message);
            });
        }

        loop {
            let Some(message) = event_rx.recv().await else {
                return 0;
            };
            match message {
                Message::Shutdown => {
                    self.set_phase(WorkerPhase::Exiting);
                    self.browser.kill().await;
                    tracing::info!(worker_id = %self.worker_id, "worker shutting down");
                    return 0;
                }
                Message::ExecuteTest { test } => {
                    match self.execute(test, &mut event_rx).await {
                        AfterTest::Continue => {}
                        AfterTest::Exit => {
                            self.set_phase(WorkerPhase::Exiting);
                            self.browser.kill().await;
                            return 0;
                        }
                    }
                }
                // A cancel with nothing in flight.
                _ => {}
            }
        }
    }

    async fn execute(
        &self,
        test: QueuedTest,
        events: &mut mpsc::UnboundedReceiver<Message>,
    ) -> AfterTest {
        self.set_phase(WorkerPhase::Loading);
        tracing::info!(worker_id = %self.worker_id, path = %test.path, "loading test");

        let mut dict = test.dependencies.clone();
        if !dict.contains(&test.path) {
            dict.insert(test.path.clone(), FileNode::new(test.content.clone()));
        }

        let host = HostContext {
            environment: self.worker_id.to_string(),
            parameters: test.parameters.clone(),
            env_parameters: test.env_parameters.clone(),
            logger: self.logger.clone(),
            store: self.store.clone(),
            browser: Arc::clone(&self.browser),
        };
        let sandbox = Sandbox::new(
            test.path.clone(),
            dict,
            Arc::clone(&self.engine),
            host.into_handle(),
        );

        let entry = match sandbox.evaluate_entry() {
            Ok(entry) => entry,
            Err(e) => {
                let failure = failure_from_sandbox(&test.path, e);
                return self.report(&sandbox, false, Some(failure), false).await;
            }
        };

        self.set_phase(WorkerPhase::Executing);
        let host_handle = sandbox.host();
        let run = self.engine.run_entry(&entry, &host_handle);
        tokio::pin!(run);

        let mut shutdown_after = false;
        let (success, error) = loop {
            tokio::select! {
                result = &mut run => {
                    break match result {
                        Ok(()) => (true, None),
                        Err(failure) => (false, Some(failure)),
                    };
                }
                event = events.recv() => match event {
                    None => {
                        break (
                            false,
                            Some(TestFailure::cancelled("worker torn down").at_path(test.path.clone())),
                        );
                    }
                    Some(Message::CancelTest { reason }) => {
                        tracing::info!(path = %test.path, reason = %reason, "cancelling test");
                        // Dropping the run future aborts user code at its
                        // next suspension point; the proxy aborts I/O.
                        self.browser.abort_all().await;
                        break (
                            false,
                            Some(
                                TestFailure::cancelled(format!("cancelled: {reason}"))
                                    .at_path(test.path.clone()),
                            ),
                        );
                    }
                    Some(Message::Shutdown) => {
                        // Finish the current test, then exit.
                        shutdown_after = true;
                    }
                    Some(_) => {}
                }
            }
        };

        self.report(&sandbox, success, error, shutdown_after).await
    }

    async fn report(
        &self,
        sandbox: &Sandbox,
        success: bool,
        error: Option<TestFailure>,
        shutdown_after: bool,
    ) -> AfterTest {
        self.set_phase(WorkerPhase::Reporting);

        // A cancelled step tree still reaches the root before the verdict.
        self.logger.flush().await;
        sandbox.teardown();

        if let Err(e) = self
            .bus
            .send(&ProcessId::root(), Message::TestComplete { success, error })
            .await
        {
            tracing::error!(error = %e, "failed to report test completion");
        }

        self.set_phase(WorkerPhase::Idle);
        if shutdown_after {
            AfterTest::Exit
        } else {
            AfterTest::Continue
        }
    }
}

fn failure_from_sandbox(test_path: &str, error: SandboxError) -> TestFailure {
    let origin = error.origin().unwrap_or(test_path).to_string();
    TestFailure::error(error.to_string()).at_path(origin)
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
