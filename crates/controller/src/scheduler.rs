// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deadline management for the dispatch loop.

use gantry_core::WorkerId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What a timer means when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Per-test timeout for the test running on this worker.
    TestTimeout { worker_id: WorkerId },
    /// Window a cancelled worker gets to acknowledge before being killed.
    CancelGrace { worker_id: WorkerId },
    /// A failed test waiting out its retry delay.
    Retry { test_path: String },
    /// Whole-run budget.
    GlobalTimeout,
}

/// Manages timers for the run controller.
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<TimerKind, Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or reset) a timer.
    pub fn set(&mut self, kind: TimerKind, duration: Duration, now: Instant) {
        self.timers.insert(kind, now + duration);
    }

    pub fn cancel(&mut self, kind: &TimerKind) {
        self.timers.remove(kind);
    }

    /// Cancel every timer tied to a worker.
    pub fn cancel_worker(&mut self, worker_id: &WorkerId) {
        self.timers.retain(|kind, _| match kind {
            TimerKind::TestTimeout { worker_id: w } | TimerKind::CancelGrace { worker_id: w } => {
                w != worker_id
            }
            _ => true,
        });
    }

    /// Remove and return every timer that has fired.
    pub fn fired(&mut self, now: Instant) -> Vec<TimerKind> {
        let fired: Vec<TimerKind> = self
            .timers
            .iter()
            .filter(|(_, fires_at)| **fires_at <= now)
            .map(|(kind, _)| kind.clone())
            .collect();
        for kind in &fired {
            self.timers.remove(kind);
        }
        fired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().min().copied()
    }

    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
