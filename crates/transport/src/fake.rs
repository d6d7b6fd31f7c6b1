// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable in-process workers for tests.
//!
//! `FakeLauncher` satisfies [`WorkerLauncher`] without spawning processes:
//! each "worker" is a task wired into the root bus exactly like a remote
//! peer (hello, execute, complete, cancel, shutdown, exit notification).
//! Outcomes are scripted per test path.

use crate::bus::Bus;
use crate::envelope::Envelope;
use crate::launcher::{
    LaunchError, WorkerControl, WorkerExit, WorkerHandle, WorkerLauncher, WorkerSpawnOptions,
};
use async_trait::async_trait;
use gantry_core::{Message, ProcessId, TestFailure, WorkerId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Scripted behavior for one test path.
#[derive(Debug, Clone)]
pub enum FakeWorkerScript {
    /// Complete successfully after the simulated delay.
    Pass,
    /// Fail every attempt with this message.
    Fail(String),
    /// Fail the first `n` attempts, then pass.
    FailTimes(u32, String),
    /// Never complete; acknowledge `test:cancel` with a cancelled failure.
    Hang,
    /// Never complete and swallow `test:cancel`, forcing the grace kill.
    HangIgnoringCancel,
    /// Die mid-test without reporting completion.
    Crash,
}

/// One observed dispatch, for scenario assertions.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub worker_id: WorkerId,
    pub path: String,
    pub at: Instant,
}

#[derive(Default)]
struct FakeState {
    scripts: HashMap<String, FakeWorkerScript>,
    attempts: HashMap<String, u32>,
    dispatches: Vec<DispatchRecord>,
    in_flight: usize,
    max_in_flight: usize,
}

/// In-process launcher with scripted worker behavior.
#[derive(Clone)]
pub struct FakeLauncher {
    bus: Bus,
    exit_tx: mpsc::Sender<WorkerExit>,
    state: Arc<Mutex<FakeState>>,
    /// Simulated execution time for scripted completions.
    delay: Arc<Mutex<Duration>>,
}

impl FakeLauncher {
    pub fn new(bus: Bus, exit_tx: mpsc::Sender<WorkerExit>) -> Self {
        Self {
            bus,
            exit_tx,
            state: Arc::new(Mutex::new(FakeState::default())),
            delay: Arc::new(Mutex::new(Duration::from_millis(10))),
        }
    }

    /// Script the outcome for a test path. Unscripted paths pass.
    pub fn script(&self, path: impl Into<String>, script: FakeWorkerScript) {
        self.state.lock().scripts.insert(path.into(), script);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn dispatches(&self) -> Vec<DispatchRecord> {
        self.state.lock().dispatches.clone()
    }

    /// Highest number of concurrently executing tests observed.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    fn begin_execution(&self, worker_id: &WorkerId, path: &str) -> FakeWorkerScript {
        let mut state = self.state.lock();
        state.dispatches.push(DispatchRecord {
            worker_id: worker_id.clone(),
            path: path.to_string(),
            at: Instant::now(),
        });
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);

        let attempt = state.attempts.entry(path.to_string()).or_insert(0);
        *attempt += 1;
        let attempt = *attempt;

        match state.scripts.get(path).cloned() {
            None => FakeWorkerScript::Pass,
            Some(FakeWorkerScript::FailTimes(n, message)) => {
                if attempt <= n {
                    FakeWorkerScript::Fail(message)
                } else {
                    FakeWorkerScript::Pass
                }
            }
            Some(script) => script,
        }
    }

    fn end_execution(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

#[async_trait]
impl WorkerLauncher for FakeLauncher {
    async fn spawn(&self, options: WorkerSpawnOptions) -> Result<WorkerHandle, LaunchError> {
        let worker_id = options.worker_id.clone();
        let process_id = worker_id.process_id();

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        self.bus.register_peer(process_id.clone());
        self.bus.connect_peer(process_id.clone(), outbound_tx).await;

        // Hello, exactly like a freshly booted process.
        let inbound = self.bus.inbound_sender();
        let _ = inbound
            .send(Envelope::new(
                process_id.clone(),
                Some(ProcessId::root()),
                Message::WorkerHello {
                    worker_id: worker_id.clone(),
                },
            ))
            .await;

        let (kill_tx, kill_rx) = mpsc::channel::<()>(1);
        let launcher = self.clone();
        let task_worker = worker_id.clone();
        tokio::spawn(async move {
            let code = run_fake_worker(&launcher, &task_worker, outbound_rx, kill_rx).await;
            launcher.bus.unregister_peer(&task_worker.process_id());
            let _ = launcher
                .exit_tx
                .send(WorkerExit {
                    worker_id: task_worker,
                    code,
                })
                .await;
        });

        Ok(WorkerHandle::new(
            worker_id,
            None,
            Arc::new(FakeControl { kill_tx }),
        ))
    }
}

struct FakeControl {
    kill_tx: mpsc::Sender<()>,
}

#[async_trait]
impl WorkerControl for FakeControl {
    async fn kill(&self) {
        let _ = self.kill_tx.send(()).await;
    }
}

enum ExecEnd {
    Completed(bool, Option<TestFailure>),
    Crashed,
    Killed,
}

async fn run_fake_worker(
    launcher: &FakeLauncher,
    worker_id: &WorkerId,
    mut rx: mpsc::Receiver<Envelope>,
    mut kill_rx: mpsc::Receiver<()>,
) -> Option<i32> {
    let process_id = worker_id.process_id();
    let inbound = launcher.bus.inbound_sender();

    loop {
        let envelope = tokio::select! {
            env = rx.recv() => match env {
                Some(env) => env,
                None => return None,
            },
            _ = kill_rx.recv() => return None,
        };

        match envelope.message {
            Message::Shutdown => return Some(0),
            Message::ExecuteTest { test } => {
                let script = launcher.begin_execution(worker_id, &test.path);
                let delay = *launcher.delay.lock();
                let end = simulate(script, delay, &test.path, &mut rx, &mut kill_rx).await;
                launcher.end_execution();

                match end {
                    ExecEnd::Completed(success, error) => {
                        let _ = inbound
                            .send(Envelope::new(
                                process_id.clone(),
                                Some(ProcessId::root()),
                                Message::TestComplete { success, error },
                            ))
                            .await;
                    }
                    ExecEnd::Crashed => return Some(101),
                    ExecEnd::Killed => return None,
                }
            }
            _ => {}
        }
    }
}

async fn simulate(
    script: FakeWorkerScript,
    delay: Duration,
    path: &str,
    rx: &mut mpsc::Receiver<Envelope>,
    kill_rx: &mut mpsc::Receiver<()>,
) -> ExecEnd {
    match script {
        FakeWorkerScript::Pass => match sleep_or_cancel(delay, false, rx, kill_rx).await {
            SleepEnd::Elapsed => ExecEnd::Completed(true, None),
            SleepEnd::Cancelled(reason) => cancelled(path, reason),
            SleepEnd::Killed => ExecEnd::Killed,
        },
        FakeWorkerScript::Fail(message) => match sleep_or_cancel(delay, false, rx, kill_rx).await {
            SleepEnd::Elapsed => ExecEnd::Completed(
                false,
                Some(TestFailure::error(message).at_path(path.to_string())),
            ),
            SleepEnd::Cancelled(reason) => cancelled(path, reason),
            SleepEnd::Killed => ExecEnd::Killed,
        },
        FakeWorkerScript::Hang => {
            match sleep_or_cancel(Duration::from_secs(3600), false, rx, kill_rx).await {
                SleepEnd::Cancelled(reason) => cancelled(path, reason),
                _ => ExecEnd::Killed,
            }
        }
        FakeWorkerScript::HangIgnoringCancel => {
            let _ = sleep_or_cancel(Duration::from_secs(3600), true, rx, kill_rx).await;
            ExecEnd::Killed
        }
        FakeWorkerScript::Crash => {
            tokio::time::sleep(delay.min(Duration::from_millis(5))).await;
            ExecEnd::Crashed
        }
        // FailTimes is resolved to Pass/Fail by begin_execution.
        FakeWorkerScript::FailTimes(_, message) => ExecEnd::Completed(
            false,
            Some(TestFailure::error(message).at_path(path.to_string())),
        ),
    }
}

fn cancelled(path: &str, reason: gantry_core::CancelReason) -> ExecEnd {
    ExecEnd::Completed(
        false,
        Some(
            TestFailure::cancelled(format!("cancelled: {reason}")).at_path(path.to_string()),
        ),
    )
}

enum SleepEnd {
    Elapsed,
    Cancelled(gantry_core::CancelReason),
    Killed,
}

async fn sleep_or_cancel(
    delay: Duration,
    ignore_cancel: bool,
    rx: &mut mpsc::Receiver<Envelope>,
    kill_rx: &mut mpsc::Receiver<()>,
) -> SleepEnd {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return SleepEnd::Elapsed,
            env = rx.recv() => match env {
                None => return SleepEnd::Killed,
                Some(envelope) => {
                    if let Message::CancelTest { reason } = envelope.message {
                        if !ignore_cancel {
                            return SleepEnd::Cancelled(reason);
                        }
                    }
                }
            },
            _ = kill_rx.recv() => return SleepEnd::Killed,
        }
    }
}
