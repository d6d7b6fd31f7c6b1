// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Root-side log collection.
//!
//! Subscribes to `log:report` and `log:report-batch`, preserves per-worker
//! order, re-emits entries through `tracing`, and groups them under the
//! test currently running on the originating worker so the final report
//! can attach them.

use gantry_core::{LogEntry, LogLevel, Message, MessageKind};
use gantry_transport::Bus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct CollectorState {
    /// environment -> path of the test currently running there.
    current: HashMap<String, String>,
    /// test path -> entries collected for it (across attempts).
    by_test: HashMap<String, Vec<LogEntry>>,
    /// Entries that arrived with no test assigned to their environment.
    unassigned: Vec<LogEntry>,
}

/// Collects worker log traffic for the final report.
#[derive(Clone, Default)]
pub struct LogCollector {
    state: Arc<Mutex<CollectorState>>,
}

impl LogCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to log reports on the root bus.
    pub fn attach(&self, bus: &Bus) {
        for kind in [MessageKind::LogReport, MessageKind::LogReportBatch] {
            let collector = self.clone();
            bus.on(kind, move |message, _source| match message {
                Message::LogReport { entry } => collector.record(entry),
                Message::LogReportBatch { entries } => {
                    for entry in entries {
                        collector.record(entry);
                    }
                }
                _ => {}
            });
        }
    }

    /// Associate an environment (worker) with the test it is about to run.
    pub fn begin_test(&self, environment: impl Into<String>, test_path: impl Into<String>) {
        self.state
            .lock()
            .current
            .insert(environment.into(), test_path.into());
    }

    /// Clear the environment's current-test association.
    pub fn end_test(&self, environment: &str) {
        self.state.lock().current.remove(environment);
    }

    /// Entries collected for a test, in arrival order.
    pub fn logs_for(&self, test_path: &str) -> Vec<LogEntry> {
        self.state
            .lock()
            .by_test
            .get(test_path)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove and return the entries collected for a test.
    pub fn take_logs(&self, test_path: &str) -> Vec<LogEntry> {
        self.state
            .lock()
            .by_test
            .remove(test_path)
            .unwrap_or_default()
    }

    /// Entries that could not be attributed to any test.
    pub fn unassigned(&self) -> Vec<LogEntry> {
        self.state.lock().unassigned.clone()
    }

    fn record(&self, entry: LogEntry) {
        emit(&entry);
        let mut state = self.state.lock();
        let test_path = entry
            .environment
            .as_ref()
            .and_then(|env| state.current.get(env).cloned());
        match test_path {
            Some(path) => state.by_test.entry(path).or_default().push(entry),
            None => state.unassigned.push(entry),
        }
    }
}

/// Re-emit a worker entry through the root's tracing subscriber.
fn emit(entry: &LogEntry) {
    let environment = entry.environment.as_deref().unwrap_or("root");
    match entry.level {
        LogLevel::Error => {
            tracing::error!(environment, kind = entry.kind.as_str(), "{}", entry.formatted_message)
        }
        LogLevel::Warning => {
            tracing::warn!(environment, kind = entry.kind.as_str(), "{}", entry.formatted_message)
        }
        LogLevel::Debug | LogLevel::Verbose => {
            tracing::debug!(environment, kind = entry.kind.as_str(), "{}", entry.formatted_message)
        }
        LogLevel::Info => {
            tracing::info!(environment, kind = entry.kind.as_str(), "{}", entry.formatted_message)
        }
    }
}

#[cfg(test)]
#[path = "collector_tests.rs"]
mod tests;
