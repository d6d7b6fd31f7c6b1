// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller-side bookkeeping for one pooled worker.

use crate::WorkerId;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a pooled worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Ready to accept a test.
    Free,
    /// Executing a test.
    Busy,
    /// Exited unexpectedly; may be restarted while budget remains.
    Crashed,
    /// Shut down; never dispatched to again.
    Terminated,
}

/// One worker in the pool. Owned and mutated only by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: WorkerId,
    pub state: WorkerState,
    /// Path of the in-flight test while `Busy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_test_path: Option<String>,
    /// Times this slot has been respawned after a crash.
    #[serde(default)]
    pub restart_count: u32,
}

impl WorkerRecord {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            state: WorkerState::Free,
            current_test_path: None,
            restart_count: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == WorkerState::Free
    }

    pub fn is_busy(&self) -> bool {
        self.state == WorkerState::Busy
    }

    /// Transition to Busy for the given test path.
    pub fn dispatch(&mut self, test_path: impl Into<String>) {
        self.state = WorkerState::Busy;
        self.current_test_path = Some(test_path.into());
    }

    /// Transition back to Free, clearing the in-flight test.
    pub fn release(&mut self) {
        self.state = WorkerState::Free;
        self.current_test_path = None;
    }
}

#[cfg(test)]
#[path = "worker_record_tests.rs"]
mod tests;
