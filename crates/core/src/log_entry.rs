// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured log entries produced by the logger client.

use crate::StepUid;
use serde::{Deserialize, Serialize};

/// What kind of entry this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryKind {
    Log,
    Info,
    Warn,
    Error,
    Debug,
    Step,
    Media,
}

impl LogEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEntryKind::Log => "log",
            LogEntryKind::Info => "info",
            LogEntryKind::Warn => "warn",
            LogEntryKind::Error => "error",
            LogEntryKind::Debug => "debug",
            LogEntryKind::Step => "step",
            LogEntryKind::Media => "media",
        }
    }

    /// Default severity for entries of this kind.
    pub fn default_level(&self) -> LogLevel {
        match self {
            LogEntryKind::Log | LogEntryKind::Step | LogEntryKind::Media => LogLevel::Info,
            LogEntryKind::Info => LogLevel::Info,
            LogEntryKind::Warn => LogLevel::Warning,
            LogEntryKind::Error => LogLevel::Error,
            LogEntryKind::Debug => LogLevel::Debug,
        }
    }
}

/// Severity attached to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warning,
    Error,
}

/// One structured log record.
///
/// Entries carrying a `step_uid` open a step scope; entries logged while a
/// step is open carry that step's uid as `parent_step_uid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Milliseconds since the Unix epoch.
    pub time_ms: u64,
    pub kind: LogEntryKind,
    pub level: LogLevel,
    /// Raw logged values, JSON-encoded.
    #[serde(default)]
    pub content: Vec<serde_json::Value>,
    pub formatted_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_uid: Option<StepUid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_step_uid: Option<StepUid>,
    /// Originating environment (worker id, or "root").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl LogEntry {
    /// Build an entry of `kind` with its default level.
    pub fn new(kind: LogEntryKind, time_ms: u64, message: impl Into<String>) -> Self {
        Self {
            time_ms,
            kind,
            level: kind.default_level(),
            content: Vec::new(),
            formatted_message: message.into(),
            step_uid: None,
            parent_step_uid: None,
            environment: None,
        }
    }

    pub fn with_content(mut self, content: Vec<serde_json::Value>) -> Self {
        self.content = content;
        self
    }

    pub fn with_parent_step(mut self, parent: Option<StepUid>) -> Self {
        self.parent_step_uid = parent;
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Whether this entry opens a step scope.
    pub fn is_step(&self) -> bool {
        self.kind == LogEntryKind::Step
    }
}

#[cfg(test)]
#[path = "log_entry_tests.rs"]
mod tests;
