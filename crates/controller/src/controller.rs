// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run controller: queue × pool, retries, timeouts, bail.

use crate::hooks;
use crate::pool::WorkerPool;
use crate::scheduler::{Scheduler, TimerKind};
use gantry_core::{
    CancelReason, Clock, FailureCause, HookRegistry, Message, MessageKind, QueuedTest, RunConfig,
    RunSummary, TestFailure, TestReport, TestStatus, WorkerId,
};
use gantry_logger::LogCollector;
use gantry_store::StoreServer;
use gantry_transport::{Bus, LaunchError, WorkerExit, WorkerLauncher, WorkerSpawnOptions};
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Idle poll ceiling when no timer is pending.
const IDLE_TICK: Duration = Duration::from_secs(3600);

/// Terminal controller failures: unable to even start the run (exit 2).
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Mutable state of one run. Owned by the dispatch loop; nothing else
/// mutates the queue or the pool.
struct RunState {
    queue: VecDeque<QueuedTest>,
    pool: WorkerPool,
    in_flight: HashMap<WorkerId, QueuedTest>,
    /// Workers sent `test:cancel` whose test is already resolved; the ack
    /// frees them.
    cancelling: HashSet<WorkerId>,
    /// Workers killed deliberately between tests (restart_worker).
    restarting: HashSet<WorkerId>,
    /// Workers killed for missing their cancel grace; they respawn on
    /// exit while budget remains.
    killed_for_cancel: HashSet<WorkerId>,
    /// Failed tests waiting out their retry delay.
    retry_pending: HashMap<String, QueuedTest>,
    results: HashMap<String, TestReport>,
    order: Vec<String>,
    scheduler: Scheduler,
    bail_tripped: bool,
    global_timeout_hit: bool,
    shutting_down: bool,
}

impl RunState {
    fn new(restart_limit: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            pool: WorkerPool::new(restart_limit),
            in_flight: HashMap::new(),
            cancelling: HashSet::new(),
            restarting: HashSet::new(),
            killed_for_cancel: HashSet::new(),
            retry_pending: HashMap::new(),
            results: HashMap::new(),
            order: Vec::new(),
            scheduler: Scheduler::new(),
            bail_tripped: false,
            global_timeout_hit: false,
            shutting_down: false,
        }
    }

    fn drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty() && self.retry_pending.is_empty()
    }

    /// First terminal verdict wins; a test is reported exactly once.
    fn record(&mut self, path: &str, status: TestStatus, retries_used: u32) {
        self.results
            .entry(path.to_string())
            .or_insert_with(|| TestReport {
                path: path.to_string(),
                status,
                retries_used,
                logs: Vec::new(),
            });
    }
}

/// Schedules tests across the worker pool and aggregates the verdicts.
pub struct RunController<L: WorkerLauncher, C: Clock> {
    bus: Bus,
    launcher: L,
    clock: C,
    config: RunConfig,
    hooks: HookRegistry,
    collector: LogCollector,
    store: Option<StoreServer>,
}

impl<L, C> RunController<L, C>
where
    L: WorkerLauncher,
    C: Clock,
{
    pub fn new(bus: Bus, launcher: L, clock: C, config: RunConfig, hooks: HookRegistry) -> Self {
        Self {
            bus,
            launcher,
            clock,
            config,
            hooks,
            collector: LogCollector::new(),
            store: None,
        }
    }

    /// Wire the root store server so worker exits release its locks.
    pub fn with_store(mut self, store: StoreServer) -> Self {
        self.store = Some(store);
        self
    }

    pub fn collector(&self) -> &LogCollector {
        &self.collector
    }

    /// Execute the whole run. `exit_rx` is the launcher's exit channel.
    pub async fn run(
        &self,
        tests: Vec<QueuedTest>,
        mut exit_rx: mpsc::Receiver<WorkerExit>,
    ) -> Result<RunSummary, ControllerError> {
        let started = self.clock.now();
        self.collector.attach(&self.bus);

        let (complete_tx, mut complete_rx) = mpsc::unbounded_channel();
        self.bus.on(MessageKind::TestComplete, move |message, source| {
            if let Message::TestComplete { success, error } = message {
                let _ = complete_tx.send((WorkerId::new(source.as_str()), success, error));
            }
        });
        self.bus.on(MessageKind::WorkerHello, |message, _| {
            if let Message::WorkerHello { worker_id } = message {
                tracing::debug!(worker_id = %worker_id, "worker ready");
            }
        });

        hooks::call(
            &self.hooks,
            hooks::BEFORE_RUN,
            json!({ "test_count": tests.len() }),
        )
        .await;

        let mut state = RunState::new(self.config.worker_restart_limit);
        for test in tests {
            state.order.push(test.path.clone());
            state.queue.push_back(test);
        }

        if let Some(run_timeout) = self.config.run_timeout() {
            state
                .scheduler
                .set(TimerKind::GlobalTimeout, run_timeout, self.clock.now());
        }

        // Ramp the pool up to min(worker_limit, queue length).
        let target = self.config.worker_limit.effective(state.queue.len());
        for _ in 0..target {
            let worker_id = state.pool.allocate_id();
            let handle = self.launcher.spawn(self.spawn_options(worker_id)).await?;
            state.pool.insert(handle);
        }
        tracing::info!(workers = target, queued = state.queue.len(), "run started");

        self.dispatch(&mut state).await;

        while !state.drained() {
            let deadline = state
                .scheduler
                .next_deadline()
                .map(tokio::time::Instant::from_std)
                .unwrap_or_else(|| tokio::time::Instant::now() + IDLE_TICK);

            tokio::select! {
                completion = complete_rx.recv() => {
                    let Some((worker_id, success, error)) = completion else { break };
                    self.handle_completion(&mut state, worker_id, success, error).await;
                }
                exit = exit_rx.recv() => {
                    let Some(exit) = exit else { break };
                    self.handle_exit(&mut state, exit).await;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.handle_timers(&mut state).await;
                }
            }
        }

        self.shutdown(&mut state, &mut exit_rx).await;

        let mut reports = Vec::new();
        for path in &state.order {
            let mut report = state.results.remove(path).unwrap_or_else(|| TestReport {
                path: path.clone(),
                status: TestStatus::Skipped,
                retries_used: 0,
                logs: Vec::new(),
            });
            report.logs = self.collector.take_logs(path);
            reports.push(report);
        }
        let summary = RunSummary {
            reports,
            global_timeout_hit: state.global_timeout_hit,
            duration_ms: (self.clock.now() - started).as_millis() as u64,
        };

        hooks::call(
            &self.hooks,
            hooks::AFTER_RUN,
            json!({
                "passed": summary.passed(),
                "failed": summary.failed(),
                "skipped": summary.skipped(),
                "exit_code": summary.exit_code(),
            }),
        )
        .await;

        Ok(summary)
    }

    fn spawn_options(&self, worker_id: WorkerId) -> WorkerSpawnOptions {
        WorkerSpawnOptions {
            worker_id,
            debug: self.config.debug,
            debug_port_range: self.config.debug_port_range,
        }
    }

    /// Hand queued tests to free workers until one side runs out.
    async fn dispatch(&self, state: &mut RunState) {
        loop {
            if state.bail_tripped || state.shutting_down || state.queue.is_empty() {
                return;
            }
            let Some(worker_id) = state.pool.free_workers().into_iter().next() else {
                return;
            };
            let Some(test) = state.queue.pop_front() else {
                return;
            };

            if hooks::vetoed(
                &self.hooks,
                hooks::SHOULD_NOT_START,
                json!({ "path": test.path, "veto": false }),
            )
            .await
            {
                tracing::info!(path = %test.path, "start vetoed by hook");
                state.record(&test.path, TestStatus::Skipped, test.retry_count);
                continue;
            }

            hooks::call(
                &self.hooks,
                hooks::BEFORE_TEST,
                json!({ "path": test.path, "retry": test.retry_count }),
            )
            .await;

            tracing::info!(worker_id = %worker_id, path = %test.path, retry = test.retry_count, "dispatching test");
            self.collector.begin_test(worker_id.as_str(), test.path.clone());
            state.pool.mark_busy(&worker_id, &test.path);
            state.scheduler.set(
                TimerKind::TestTimeout {
                    worker_id: worker_id.clone(),
                },
                self.config.test_timeout(),
                self.clock.now(),
            );
            let message = Message::ExecuteTest { test: test.clone() };
            state.in_flight.insert(worker_id.clone(), test);

            if let Err(e) = self.bus.send(&worker_id.process_id(), message).await {
                tracing::warn!(worker_id = %worker_id, error = %e, "dispatch failed");
                state.scheduler.cancel_worker(&worker_id);
                self.collector.end_test(worker_id.as_str());
                if let Some(test) = state.in_flight.remove(&worker_id) {
                    let failure = TestFailure::crashed(format!("dispatch failed: {e}"))
                        .at_path(test.path.clone());
                    self.apply_failure_policy(state, test, failure).await;
                }
                state.pool.remove(&worker_id);
            }
        }
    }

    async fn handle_completion(
        &self,
        state: &mut RunState,
        worker_id: WorkerId,
        success: bool,
        error: Option<TestFailure>,
    ) {
        state.scheduler.cancel_worker(&worker_id);
        self.collector.end_test(worker_id.as_str());
        let was_cancelling = state.cancelling.remove(&worker_id);

        let Some(test) = state.in_flight.remove(&worker_id) else {
            // Ack for a test the controller already resolved (timeout).
            if was_cancelling && !state.shutting_down {
                state.pool.mark_free(&worker_id);
                self.dispatch(state).await;
            }
            return;
        };

        hooks::call(
            &self.hooks,
            hooks::AFTER_TEST,
            json!({ "path": test.path, "success": success }),
        )
        .await;

        if success {
            tracing::info!(path = %test.path, retries = test.retry_count, "test passed");
            state.record(&test.path, TestStatus::Passed, test.retry_count);

            if self.config.restart_worker && !state.shutting_down {
                // Kill and respawn before this slot becomes dispatchable.
                let handle = state.pool.handle(&worker_id).cloned();
                state.restarting.insert(worker_id.clone());
                state.pool.remove(&worker_id);
                if let Some(handle) = handle {
                    handle.kill().await;
                }
                return;
            }
        } else {
            let failure = error.unwrap_or_else(|| {
                TestFailure::error("test reported failure with no error").at_path(test.path.clone())
            });
            self.apply_failure_policy(state, test, failure).await;
        }

        state.pool.mark_free(&worker_id);
        self.dispatch(state).await;
    }

    /// Retry if budget and hooks allow; otherwise record the terminal
    /// verdict and, when configured, trip bail.
    async fn apply_failure_policy(
        &self,
        state: &mut RunState,
        mut test: QueuedTest,
        failure: TestFailure,
    ) {
        let path = test.path.clone();
        let retryable = failure.cause != FailureCause::Cancelled
            && !state.bail_tripped
            && !state.shutting_down
            && test.retry_count < self.config.retry_count;

        if retryable {
            let veto = hooks::vetoed(
                &self.hooks,
                hooks::SHOULD_NOT_RETRY,
                json!({ "path": path, "error": failure.message, "veto": false }),
            )
            .await;
            if !veto {
                hooks::call(
                    &self.hooks,
                    hooks::BEFORE_RETRY,
                    json!({ "path": path, "retry": test.retry_count + 1 }),
                )
                .await;
                tracing::info!(
                    path = %path,
                    retry = test.retry_count + 1,
                    delay_ms = self.config.retry_delay_ms,
                    "scheduling retry"
                );
                test.note_retry(failure);
                state.scheduler.set(
                    TimerKind::Retry {
                        test_path: path.clone(),
                    },
                    self.config.retry_delay(),
                    self.clock.now(),
                );
                state.retry_pending.insert(path, test);
                return;
            }
        }

        tracing::info!(path = %path, cause = ?failure.cause, "test failed terminally");
        let status = match failure.cause {
            FailureCause::Cancelled => TestStatus::Cancelled {
                reason: failure.message.clone(),
            },
            _ => TestStatus::Failed { failure },
        };
        state.record(&path, status, test.retry_count);

        if self.config.bail && !state.bail_tripped {
            self.trip_bail(state, CancelReason::Bail).await;
        }
    }

    /// Stop dispatching atomically: cancel in-flight tests and report
    /// everything still queued (or waiting on a retry) as skipped.
    async fn trip_bail(&self, state: &mut RunState, reason: CancelReason) {
        state.bail_tripped = true;
        if reason == CancelReason::GlobalTimeout {
            state.global_timeout_hit = true;
        }
        tracing::warn!(reason = %reason, "bail tripped; cancelling in-flight tests");

        let busy: Vec<WorkerId> = state.in_flight.keys().cloned().collect();
        for worker_id in busy {
            if let Err(e) = self
                .bus
                .send(&worker_id.process_id(), Message::CancelTest { reason })
                .await
            {
                tracing::warn!(worker_id = %worker_id, error = %e, "cancel send failed");
            }
            state.scheduler.set(
                TimerKind::CancelGrace {
                    worker_id: worker_id.clone(),
                },
                self.config.cancel_grace(),
                self.clock.now(),
            );
        }

        let queued: Vec<QueuedTest> = state.queue.drain(..).collect();
        for test in queued {
            state.record(&test.path, TestStatus::Skipped, test.retry_count);
        }
        let pending: Vec<String> = state.retry_pending.keys().cloned().collect();
        for path in pending {
            state.scheduler.cancel(&TimerKind::Retry {
                test_path: path.clone(),
            });
            if let Some(test) = state.retry_pending.remove(&path) {
                state.record(&test.path, TestStatus::Skipped, test.retry_count);
            }
        }
    }

    async fn handle_timers(&self, state: &mut RunState) {
        for kind in state.scheduler.fired(self.clock.now()) {
            match kind {
                TimerKind::TestTimeout { worker_id } => {
                    self.handle_test_timeout(state, worker_id).await;
                }
                TimerKind::CancelGrace { worker_id } => {
                    self.handle_cancel_grace(state, worker_id).await;
                }
                TimerKind::Retry { test_path } => {
                    if let Some(test) = state.retry_pending.remove(&test_path) {
                        // Retries land at the tail, never preempting
                        // fresh tests.
                        state.queue.push_back(test);
                    }
                }
                TimerKind::GlobalTimeout => {
                    self.trip_bail(state, CancelReason::GlobalTimeout).await;
                }
            }
        }
        self.dispatch(state).await;
    }

    /// The test is resolved as a timeout failure now; the worker gets a
    /// cancel and a grace window to acknowledge.
    async fn handle_test_timeout(&self, state: &mut RunState, worker_id: WorkerId) {
        let Some(test) = state.in_flight.remove(&worker_id) else {
            return;
        };
        tracing::warn!(worker_id = %worker_id, path = %test.path, "test timed out");
        self.collector.end_test(worker_id.as_str());
        state.cancelling.insert(worker_id.clone());

        let failure = TestFailure::timeout(format!(
            "test exceeded {} ms",
            self.config.test_timeout_ms
        ))
        .at_path(test.path.clone());
        self.apply_failure_policy(state, test, failure).await;

        if let Err(e) = self
            .bus
            .send(
                &worker_id.process_id(),
                Message::CancelTest {
                    reason: CancelReason::Timeout,
                },
            )
            .await
        {
            tracing::warn!(worker_id = %worker_id, error = %e, "cancel send failed");
        }
        state.scheduler.set(
            TimerKind::CancelGrace {
                worker_id: worker_id.clone(),
            },
            self.config.cancel_grace(),
            self.clock.now(),
        );
    }

    /// The worker never acknowledged its cancel: kill it. The exit event
    /// drives the respawn.
    async fn handle_cancel_grace(&self, state: &mut RunState, worker_id: WorkerId) {
        let unacked_cancel = state.cancelling.remove(&worker_id);
        let in_flight = state.in_flight.remove(&worker_id);
        if !unacked_cancel && in_flight.is_none() {
            return;
        }
        tracing::warn!(worker_id = %worker_id, "cancel not acknowledged in time; killing worker");

        if let Some(test) = in_flight {
            // A bail-cancelled test whose worker went mute.
            self.collector.end_test(worker_id.as_str());
            state.record(
                &test.path,
                TestStatus::Cancelled {
                    reason: "cancelled: worker did not acknowledge".to_string(),
                },
                test.retry_count,
            );
        }

        state.killed_for_cancel.insert(worker_id.clone());
        if let Some(handle) = state.pool.handle(&worker_id) {
            handle.kill().await;
        }
    }

    async fn handle_exit(&self, state: &mut RunState, exit: WorkerExit) {
        let worker_id = exit.worker_id.clone();
        state.scheduler.cancel_worker(&worker_id);
        state.cancelling.remove(&worker_id);
        if let Some(store) = &self.store {
            store.release_owner(&worker_id.process_id());
        }

        if state.shutting_down {
            state.pool.mark_terminated(&worker_id);
            return;
        }

        if state.restarting.remove(&worker_id) {
            // Deliberate restart between tests; respawn the same slot.
            self.respawn(state, worker_id).await;
            self.dispatch(state).await;
            return;
        }

        let killed_for_cancel = state.killed_for_cancel.remove(&worker_id);
        let in_flight = state.in_flight.remove(&worker_id);
        let was_busy = in_flight.is_some() || killed_for_cancel;
        if let Some(test) = in_flight {
            tracing::warn!(worker_id = %worker_id, path = %test.path, code = ?exit.code, "worker crashed mid-test");
            self.collector.end_test(worker_id.as_str());
            let failure = TestFailure::crashed(format!(
                "worker exited unexpectedly (code {:?})",
                exit.code
            ))
            .at_path(test.path.clone());
            self.apply_failure_policy(state, test, failure).await;
        }

        if was_busy && state.pool.note_crash(&worker_id) {
            self.respawn(state, worker_id).await;
        } else {
            // An idle peer going away just shrinks the pool.
            tracing::info!(worker_id = %worker_id, code = ?exit.code, "worker left the pool");
            state.pool.remove(&worker_id);
        }

        self.fail_unservable(state);
        self.dispatch(state).await;
    }

    async fn respawn(&self, state: &mut RunState, worker_id: WorkerId) {
        match self.launcher.spawn(self.spawn_options(worker_id.clone())).await {
            Ok(handle) => {
                tracing::info!(worker_id = %worker_id, "worker respawned");
                state.pool.insert(handle);
            }
            Err(e) => {
                tracing::error!(worker_id = %worker_id, error = %e, "respawn failed");
                state.pool.remove(&worker_id);
            }
        }
    }

    /// With no workers left, nothing queued can ever run.
    fn fail_unservable(&self, state: &mut RunState) {
        if !state.pool.is_empty() || !state.restarting.is_empty() {
            return;
        }
        if state.queue.is_empty() && state.retry_pending.is_empty() {
            return;
        }
        tracing::error!("worker pool exhausted; failing remaining tests");
        let queued: Vec<QueuedTest> = state.queue.drain(..).collect();
        let pending: Vec<String> = state.retry_pending.keys().cloned().collect();
        for test in queued {
            let failure =
                TestFailure::crashed("worker pool exhausted").at_path(test.path.clone());
            state.record(&test.path, TestStatus::Failed { failure }, test.retry_count);
        }
        for path in pending {
            state.scheduler.cancel(&TimerKind::Retry {
                test_path: path.clone(),
            });
            if let Some(test) = state.retry_pending.remove(&path) {
                let failure =
                    TestFailure::crashed("worker pool exhausted").at_path(test.path.clone());
                state.record(&test.path, TestStatus::Failed { failure }, test.retry_count);
            }
        }
    }

    /// Orderly teardown: `worker:shutdown` to everyone, a grace window for
    /// clean exits, then kill.
    async fn shutdown(&self, state: &mut RunState, exit_rx: &mut mpsc::Receiver<WorkerExit>) {
        state.shutting_down = true;
        let live = state.pool.live_workers();
        if !live.is_empty() {
            tracing::info!(workers = live.len(), "shutting down worker pool");
        }
        for worker_id in &live {
            if let Err(e) = self
                .bus
                .send(&worker_id.process_id(), Message::Shutdown)
                .await
            {
                tracing::debug!(worker_id = %worker_id, error = %e, "shutdown send failed");
            }
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace();
        while !state.pool.live_workers().is_empty() {
            match tokio::time::timeout_at(deadline, exit_rx.recv()).await {
                Ok(Some(exit)) => {
                    if let Some(store) = &self.store {
                        store.release_owner(&exit.worker_id.process_id());
                    }
                    state.pool.mark_terminated(&exit.worker_id);
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }

        for worker_id in state.pool.live_workers() {
            tracing::warn!(worker_id = %worker_id, "worker missed shutdown grace; killing");
            if let Some(handle) = state.pool.handle(&worker_id) {
                handle.kill().await;
            }
            state.pool.mark_terminated(&worker_id);
        }

        if let Some(store) = &self.store {
            store.close();
        }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
