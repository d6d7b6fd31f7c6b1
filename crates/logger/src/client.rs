// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side (and root-side) logging client.

use gantry_core::{Clock, LogEntry, LogEntryKind, Message, ProcessId, StepUid};
use gantry_transport::Bus;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

#[derive(Default)]
struct ClientState {
    stack: Vec<StepUid>,
    batch: Vec<LogEntry>,
}

/// Structured logger with step framing.
///
/// While a step is open, entries accumulate locally; when the outermost
/// step closes, the whole tree goes out as a single batch so the root can
/// reconstruct it. Outside any step, entries forward one by one.
#[derive(Clone)]
pub struct LogClient<C: Clock> {
    bus: Bus,
    environment: String,
    clock: C,
    state: Arc<Mutex<ClientState>>,
}

impl<C: Clock> LogClient<C> {
    pub fn new(bus: Bus, environment: impl Into<String>, clock: C) -> Self {
        Self {
            bus,
            environment: environment.into(),
            clock,
            state: Arc::new(Mutex::new(ClientState::default())),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Depth of the current step stack.
    pub fn step_depth(&self) -> usize {
        self.state.lock().stack.len()
    }

    pub async fn log(&self, message: impl Into<String>) {
        self.entry(LogEntryKind::Log, message.into(), Vec::new()).await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.entry(LogEntryKind::Info, message.into(), Vec::new()).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.entry(LogEntryKind::Warn, message.into(), Vec::new()).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.entry(LogEntryKind::Error, message.into(), Vec::new()).await;
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.entry(LogEntryKind::Debug, message.into(), Vec::new()).await;
    }

    /// Log a produced media file (a screenshot, a download).
    pub async fn media(&self, path: impl Into<String>) {
        let path = path.into();
        self.entry(
            LogEntryKind::Media,
            path.clone(),
            vec![serde_json::Value::String(path)],
        )
        .await;
    }

    /// Log arbitrary structured values alongside the message.
    pub async fn log_with(&self, message: impl Into<String>, content: Vec<serde_json::Value>) {
        self.entry(LogEntryKind::Log, message.into(), content).await;
    }

    /// Open a step scope. The step entry carries the parent step uid that
    /// was on top of the stack at the call.
    pub async fn start_step(&self, message: impl Into<String>) -> StepUid {
        let uid = StepUid::new(uuid::Uuid::new_v4().to_string());
        let mut entry = LogEntry::new(LogEntryKind::Step, self.clock.epoch_ms(), message)
            .with_environment(self.environment.clone());
        entry.step_uid = Some(uid.clone());

        {
            let mut state = self.state.lock();
            entry.parent_step_uid = state.stack.last().cloned();
            state.stack.push(uid.clone());
            state.batch.push(entry);
        }
        uid
    }

    /// Close the innermost step. When the stack empties, the batched tree
    /// is flushed as one report.
    pub async fn end_step(&self) {
        let flushed = {
            let mut state = self.state.lock();
            state.stack.pop();
            if state.stack.is_empty() {
                std::mem::take(&mut state.batch)
            } else {
                Vec::new()
            }
        };
        self.send_batch(flushed).await;
    }

    /// `start_step`, run `body`, `end_step`, with the pop guaranteed on
    /// every exit path: if `body` is cancelled mid-flight, the guard pops
    /// the stack synchronously and the batch drains on the next flush.
    pub async fn step<F, T>(&self, message: impl Into<String>, body: F) -> T
    where
        F: Future<Output = T>,
    {
        self.start_step(message).await;
        let mut guard = StepGuard {
            state: Arc::clone(&self.state),
            armed: true,
        };
        let result = body.await;
        guard.armed = false;
        drop(guard);
        self.end_step().await;
        result
    }

    /// Flush whatever is batched, regardless of stack state. Called on
    /// test teardown so a cancelled step tree still reaches the root.
    pub async fn flush(&self) {
        let flushed = {
            let mut state = self.state.lock();
            state.stack.clear();
            std::mem::take(&mut state.batch)
        };
        self.send_batch(flushed).await;
    }

    async fn entry(&self, kind: LogEntryKind, message: String, content: Vec<serde_json::Value>) {
        let mut entry = LogEntry::new(kind, self.clock.epoch_ms(), message)
            .with_content(content)
            .with_environment(self.environment.clone());

        let batched = {
            let mut state = self.state.lock();
            entry.parent_step_uid = state.stack.last().cloned();
            if entry.parent_step_uid.is_some() {
                state.batch.push(entry.clone());
                true
            } else {
                false
            }
        };

        if !batched {
            self.forward(Message::LogReport { entry }).await;
        }
    }

    async fn send_batch(&self, entries: Vec<LogEntry>) {
        if entries.is_empty() {
            return;
        }
        self.forward(Message::LogReportBatch { entries }).await;
    }

    async fn forward(&self, message: Message) {
        let result = if self.bus.is_child() {
            self.bus.send(&ProcessId::root(), message).await
        } else {
            self.bus.broadcast_local(message).await
        };
        if let Err(e) = result {
            // Logging must never break the run.
            tracing::warn!(error = %e, "log forwarding failed");
        }
    }
}

/// Pops one step frame on drop unless defused. Keeps the stack LIFO even
/// when a step body is cancelled at a suspension point.
pub struct StepGuard {
    state: Arc<Mutex<ClientState>>,
    armed: bool,
}

impl Drop for StepGuard {
    fn drop(&mut self) {
        if self.armed {
            self.state.lock().stack.pop();
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
