// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pool bookkeeping.

use gantry_core::{WorkerId, WorkerRecord, WorkerState};
use gantry_transport::WorkerHandle;
use std::collections::HashMap;

/// The controller's view of its workers. Owned and mutated only by the
/// dispatch loop.
pub struct WorkerPool {
    records: HashMap<WorkerId, WorkerRecord>,
    handles: HashMap<WorkerId, WorkerHandle>,
    restart_limit: u32,
    next_index: u32,
}

impl WorkerPool {
    pub fn new(restart_limit: u32) -> Self {
        Self {
            records: HashMap::new(),
            handles: HashMap::new(),
            restart_limit,
            next_index: 0,
        }
    }

    /// Next worker id for ramp-up (`w-1`, `w-2`, ...).
    pub fn allocate_id(&mut self) -> WorkerId {
        self.next_index += 1;
        WorkerId::new(format!("w-{}", self.next_index))
    }

    /// Insert a freshly spawned worker as Free.
    pub fn insert(&mut self, handle: WorkerHandle) {
        let worker_id = handle.worker_id.clone();
        self.records
            .entry(worker_id.clone())
            .and_modify(|record| {
                record.state = WorkerState::Free;
                record.current_test_path = None;
            })
            .or_insert_with(|| WorkerRecord::new(worker_id.clone()));
        self.handles.insert(worker_id, handle);
    }

    /// Free workers, ordered by id for deterministic dispatch.
    pub fn free_workers(&self) -> Vec<WorkerId> {
        let mut free: Vec<WorkerId> = self
            .records
            .values()
            .filter(|r| r.is_free())
            .map(|r| r.worker_id.clone())
            .collect();
        free.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        free
    }

    pub fn mark_busy(&mut self, worker_id: &WorkerId, test_path: &str) {
        if let Some(record) = self.records.get_mut(worker_id) {
            record.dispatch(test_path);
        }
    }

    pub fn mark_free(&mut self, worker_id: &WorkerId) {
        if let Some(record) = self.records.get_mut(worker_id) {
            record.release();
        }
    }

    /// Record a crash. Returns true when the restart budget allows a
    /// respawn, charging one restart.
    pub fn note_crash(&mut self, worker_id: &WorkerId) -> bool {
        match self.records.get_mut(worker_id) {
            None => false,
            Some(record) => {
                record.state = WorkerState::Crashed;
                record.current_test_path = None;
                if record.restart_count < self.restart_limit {
                    record.restart_count += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Drop a worker from the pool entirely.
    pub fn remove(&mut self, worker_id: &WorkerId) {
        self.records.remove(worker_id);
        self.handles.remove(worker_id);
    }

    pub fn mark_terminated(&mut self, worker_id: &WorkerId) {
        if let Some(record) = self.records.get_mut(worker_id) {
            record.state = WorkerState::Terminated;
            record.current_test_path = None;
        }
        self.handles.remove(worker_id);
    }

    pub fn handle(&self, worker_id: &WorkerId) -> Option<&WorkerHandle> {
        self.handles.get(worker_id)
    }

    pub fn record(&self, worker_id: &WorkerId) -> Option<&WorkerRecord> {
        self.records.get(worker_id)
    }

    /// Ids of workers that are not terminated or crashed.
    pub fn live_workers(&self) -> Vec<WorkerId> {
        self.records
            .values()
            .filter(|r| matches!(r.state, WorkerState::Free | WorkerState::Busy))
            .map(|r| r.worker_id.clone())
            .collect()
    }

    pub fn busy_count(&self) -> usize {
        self.records.values().filter(|r| r.is_busy()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.live_workers().is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
