// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gantry-core: data model, message registry, and shared substrate for the
//! gantry test-run controller.

pub mod clock;
pub mod config;
pub mod dependency;
pub mod hook;
pub mod id;
pub mod log_entry;
pub mod message;
pub mod report;
pub mod store_file;
pub mod test_unit;
pub mod worker_record;

pub use clock::{Clock, SystemClock};
pub use config::{RunConfig, RunConfigOverlay, StoreCaps, WorkerLimit};
pub use dependency::{ClosureError, DependencyDict, FileNode};
pub use hook::{Hook, HookError, HookPayload, HookRegistry};
pub use id::{IdGen, ShortId, UuidIdGen};
pub use log_entry::{LogEntry, LogEntryKind, LogLevel};
pub use message::{CancelReason, Message, MessageKind};
pub use report::{FailureCause, RunSummary, TestFailure, TestReport, TestStatus};
pub use store_file::{FileClass, FileHint, FileMeta, FsError, FsErrorKind, StoreHandle};
pub use test_unit::QueuedTest;
pub use worker_record::{WorkerRecord, WorkerState};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
#[cfg(any(test, feature = "test-support"))]
pub use id::SequentialIdGen;

crate::define_id! {
    /// Identifier of a process on the transport (the root or one worker).
    pub struct ProcessId;
}

impl ProcessId {
    /// Well-known id of the root process.
    pub fn root() -> Self {
        Self::new("root")
    }

    /// Whether this id addresses the root process.
    pub fn is_root(&self) -> bool {
        self.0 == "root"
    }
}

crate::define_id! {
    /// Unique identifier for a worker instance.
    pub struct WorkerId;
}

impl WorkerId {
    /// The process id a worker with this id registers under.
    pub fn process_id(&self) -> ProcessId {
        ProcessId::new(self.as_str())
    }
}

crate::define_id! {
    /// Identifier of an open log step scope.
    pub struct StepUid;
}

crate::define_id! {
    /// Token identifying a held FS-store path reservation.
    pub struct LockToken;
}

crate::define_id! {
    /// Correlation id for request/response message pairs.
    pub struct RequestId;
}
