// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message registry for the transport bus.
//!
//! Every message crossing a process boundary is a variant of [`Message`]:
//! senders construct, receivers pattern-match. Serializes with
//! `{"type": "scope:name", ...fields}` format. [`MessageKind`] is the
//! tag-only discriminant used for subscriptions.

use crate::{
    FileClass, FileHint, FileMeta, FsError, LockToken, LogEntry, QueuedTest, RequestId,
    StoreHandle, TestFailure, WorkerId,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Why a running test is being cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Per-test timeout expired.
    Timeout,
    /// Bail tripped after another test's terminal failure.
    Bail,
    /// Global run timeout expired.
    GlobalTimeout,
    /// The run is shutting down.
    Shutdown,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::Timeout => "timeout",
            CancelReason::Bail => "bail",
            CancelReason::GlobalTimeout => "global timeout",
            CancelReason::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages recognized by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    // -- worker lifecycle --
    /// First message a worker sends after connecting; marks it ready.
    #[serde(rename = "worker:hello")]
    WorkerHello { worker_id: WorkerId },

    /// Root tells every worker (or one) to finish up and exit 0.
    #[serde(rename = "worker:shutdown")]
    Shutdown,

    // -- test execution --
    #[serde(rename = "test:execute")]
    ExecuteTest { test: QueuedTest },

    #[serde(rename = "test:complete")]
    TestComplete {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<TestFailure>,
    },

    #[serde(rename = "test:cancel")]
    CancelTest { reason: CancelReason },

    // -- logging --
    #[serde(rename = "log:report")]
    LogReport { entry: LogEntry },

    #[serde(rename = "log:report-batch")]
    LogReportBatch { entries: Vec<LogEntry> },

    // -- fs-store --
    #[serde(rename = "fs:acquire")]
    FsAcquire {
        request_id: RequestId,
        class: FileClass,
        #[serde(default)]
        hint: FileHint,
    },

    #[serde(rename = "fs:acquired")]
    FsAcquired {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handle: Option<StoreHandle>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<FsError>,
    },

    #[serde(rename = "fs:release")]
    FsRelease {
        request_id: RequestId,
        token: LockToken,
    },

    #[serde(rename = "fs:delete")]
    FsDelete {
        request_id: RequestId,
        token: LockToken,
    },

    /// Acknowledges a release or delete.
    #[serde(rename = "fs:released")]
    FsReleased {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<FsError>,
    },

    #[serde(rename = "fs:list")]
    FsList { request_id: RequestId },

    #[serde(rename = "fs:listed")]
    FsListed {
        request_id: RequestId,
        paths: Vec<PathBuf>,
    },

    #[serde(rename = "fs:stat")]
    FsStat {
        request_id: RequestId,
        token: LockToken,
    },

    #[serde(rename = "fs:statted")]
    FsStatted {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<FileMeta>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<FsError>,
    },

    // -- routing --
    /// Child-to-root request to re-fan a message to every peer.
    #[serde(rename = "broadcast")]
    Broadcast { message: Box<Message> },
}

impl Message {
    /// The tag-only discriminant for subscription matching.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::WorkerHello { .. } => MessageKind::WorkerHello,
            Message::Shutdown => MessageKind::Shutdown,
            Message::ExecuteTest { .. } => MessageKind::ExecuteTest,
            Message::TestComplete { .. } => MessageKind::TestComplete,
            Message::CancelTest { .. } => MessageKind::CancelTest,
            Message::LogReport { .. } => MessageKind::LogReport,
            Message::LogReportBatch { .. } => MessageKind::LogReportBatch,
            Message::FsAcquire { .. } => MessageKind::FsAcquire,
            Message::FsAcquired { .. } => MessageKind::FsAcquired,
            Message::FsRelease { .. } => MessageKind::FsRelease,
            Message::FsDelete { .. } => MessageKind::FsDelete,
            Message::FsReleased { .. } => MessageKind::FsReleased,
            Message::FsList { .. } => MessageKind::FsList,
            Message::FsListed { .. } => MessageKind::FsListed,
            Message::FsStat { .. } => MessageKind::FsStat,
            Message::FsStatted { .. } => MessageKind::FsStatted,
            Message::Broadcast { .. } => MessageKind::Broadcast,
        }
    }

    /// Correlation id for request/response pairs, when the variant has one.
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Message::FsAcquire { request_id, .. }
            | Message::FsAcquired { request_id, .. }
            | Message::FsRelease { request_id, .. }
            | Message::FsDelete { request_id, .. }
            | Message::FsReleased { request_id, .. }
            | Message::FsList { request_id }
            | Message::FsListed { request_id, .. }
            | Message::FsStat { request_id, .. }
            | Message::FsStatted { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

/// Tag of a [`Message`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    WorkerHello,
    Shutdown,
    ExecuteTest,
    TestComplete,
    CancelTest,
    LogReport,
    LogReportBatch,
    FsAcquire,
    FsAcquired,
    FsRelease,
    FsDelete,
    FsReleased,
    FsList,
    FsListed,
    FsStat,
    FsStatted,
    Broadcast,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::WorkerHello => "worker:hello",
            MessageKind::Shutdown => "worker:shutdown",
            MessageKind::ExecuteTest => "test:execute",
            MessageKind::TestComplete => "test:complete",
            MessageKind::CancelTest => "test:cancel",
            MessageKind::LogReport => "log:report",
            MessageKind::LogReportBatch => "log:report-batch",
            MessageKind::FsAcquire => "fs:acquire",
            MessageKind::FsAcquired => "fs:acquired",
            MessageKind::FsRelease => "fs:release",
            MessageKind::FsDelete => "fs:delete",
            MessageKind::FsReleased => "fs:released",
            MessageKind::FsList => "fs:list",
            MessageKind::FsListed => "fs:listed",
            MessageKind::FsStat => "fs:stat",
            MessageKind::FsStatted => "fs:statted",
            MessageKind::Broadcast => "broadcast",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
