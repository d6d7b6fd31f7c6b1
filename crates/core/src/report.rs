// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-test verdicts and the aggregated run summary.

use crate::LogEntry;
use serde::{Deserialize, Serialize};

/// Why a test attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// User code threw, rejected, or asserted.
    Error,
    /// Per-test timeout expired.
    Timeout,
    /// Controller-initiated abort.
    Cancelled,
    /// The worker process died mid-test.
    Crashed,
}

/// A failed test attempt, serializable across the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub cause: FailureCause,
    pub message: String,
    /// Source file the failure originated in, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl TestFailure {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            cause: FailureCause::Error,
            message: message.into(),
            path: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            cause: FailureCause::Timeout,
            message: message.into(),
            path: None,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            cause: FailureCause::Cancelled,
            message: message.into(),
            path: None,
        }
    }

    pub fn crashed(message: impl Into<String>) -> Self {
        Self {
            cause: FailureCause::Crashed,
            message: message.into(),
            path: None,
        }
    }

    pub fn at_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl std::fmt::Display for TestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{:?}: {} ({})", self.cause, self.message, path),
            None => write!(f, "{:?}: {}", self.cause, self.message),
        }
    }
}

/// Terminal verdict for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed { failure: TestFailure },
    Cancelled { reason: String },
    Skipped,
}

impl TestStatus {
    pub fn is_passed(&self) -> bool {
        matches!(self, TestStatus::Passed)
    }

    /// Whether this verdict counts against the exit code.
    pub fn is_failure(&self) -> bool {
        matches!(self, TestStatus::Failed { .. } | TestStatus::Cancelled { .. })
    }
}

/// Final record for one test: verdict, retries used, and collected logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub path: String,
    pub status: TestStatus,
    pub retries_used: u32,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// Aggregate of an entire run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub reports: Vec<TestReport>,
    pub global_timeout_hit: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|r| r.status.is_passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.status.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.status, TestStatus::Skipped))
            .count()
    }

    /// Process exit code for this summary: 0 all passed, 1 any terminal
    /// failure, 3 global timeout.
    pub fn exit_code(&self) -> i32 {
        if self.global_timeout_hit {
            3
        } else if self.failed() > 0 {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
