// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The unit of work handed to a worker.

use crate::{DependencyDict, TestFailure};
use serde::{Deserialize, Serialize};

/// A test source file plus everything a worker needs to run it in
/// isolation. Created by the controller on enqueue; only the controller
/// mutates it (retry bookkeeping).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTest {
    /// Absolute path of the entry file.
    pub path: String,
    /// Entry file source text.
    pub content: String,
    /// Closed require-closure of the entry.
    #[serde(default)]
    pub dependencies: DependencyDict,
    /// Test parameters forwarded into the sandbox host context.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub parameters: serde_json::Value,
    /// Environment-specific parameters forwarded alongside `parameters`.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub env_parameters: serde_json::Value,
    /// Number of retries already consumed.
    #[serde(default)]
    pub retry_count: u32,
    /// Failures recorded by previous attempts.
    #[serde(default)]
    pub retry_errors: Vec<TestFailure>,
}

impl QueuedTest {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            dependencies: DependencyDict::new(),
            parameters: serde_json::Value::Null,
            env_parameters: serde_json::Value::Null,
            retry_count: 0,
            retry_errors: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: DependencyDict) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Record a failed attempt and consume one retry.
    pub fn note_retry(&mut self, failure: TestFailure) {
        self.retry_count += 1;
        self.retry_errors.push(failure);
    }
}

#[cfg(test)]
#[path = "test_unit_tests.rs"]
mod tests;
