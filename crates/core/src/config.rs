// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run configuration: TOML file, environment overlay, flag overrides.

use crate::FileClass;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Size of the worker pool: a process count, or `local` for one in-process
/// worker wired over local bus channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLimit {
    Count(usize),
    Local,
}

impl WorkerLimit {
    /// Pool size to ramp to for `queued` tests.
    pub fn effective(&self, queued: usize) -> usize {
        if queued == 0 {
            return 0;
        }
        match self {
            WorkerLimit::Count(n) => (*n).min(queued),
            WorkerLimit::Local => 1,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, WorkerLimit::Local)
    }
}

impl std::fmt::Display for WorkerLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerLimit::Count(n) => write!(f, "{n}"),
            WorkerLimit::Local => f.write_str("local"),
        }
    }
}

impl std::str::FromStr for WorkerLimit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("local") {
            return Ok(WorkerLimit::Local);
        }
        s.parse::<usize>()
            .map(WorkerLimit::Count)
            .map_err(|_| ConfigError::InvalidWorkerLimit(s.to_string()))
    }
}

impl Serialize for WorkerLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WorkerLimit::Count(n) => serializer.serialize_u64(*n as u64),
            WorkerLimit::Local => serializer.serialize_str("local"),
        }
    }
}

impl<'de> Deserialize<'de> for WorkerLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = WorkerLimit;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a worker count or the string \"local\"")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(WorkerLimit::Count(v as usize))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
                if v < 0 {
                    return Err(E::custom("worker limit cannot be negative"));
                }
                Ok(WorkerLimit::Count(v as usize))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// Per-class concurrency caps for the FS-store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreCaps {
    pub text: usize,
    pub binary: usize,
    pub screenshot: usize,
}

impl Default for StoreCaps {
    fn default() -> Self {
        Self {
            text: 10,
            binary: 10,
            screenshot: 10,
        }
    }
}

impl StoreCaps {
    pub fn for_class(&self, class: FileClass) -> usize {
        match class {
            FileClass::Text => self.text,
            FileClass::Binary => self.binary,
            FileClass::Screenshot => self.screenshot,
        }
    }
}

/// Configuration or launch failure (exit code 2).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid worker limit {0:?}: expected a number or \"local\"")]
    InvalidWorkerLimit(String),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("debug port range is empty")]
    EmptyPortRange,
}

fn default_worker_limit() -> WorkerLimit {
    WorkerLimit::Count(2)
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_test_timeout_ms() -> u64 {
    30_000
}

fn default_shutdown_grace_ms() -> u64 {
    3_000
}

fn default_cancel_grace_ms() -> u64 {
    2_000
}

fn default_worker_restart_limit() -> u32 {
    3
}

fn default_debug_port_range() -> [u16; 2] {
    [9229, 9240]
}

fn default_engine() -> String {
    "noop".to_string()
}

/// Everything the run controller needs to know, merged from `gantry.toml`,
/// the optional environment overlay, and CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Glob selecting test entry files.
    pub tests: Option<String>,
    pub worker_limit: WorkerLimit,
    /// Retries granted to each test beyond its first attempt.
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    /// Stop dispatching after the first terminal failure.
    pub bail: bool,
    pub test_timeout_ms: u64,
    /// Whole-run budget; `None` disables the global timeout.
    pub run_timeout_ms: Option<u64>,
    pub shutdown_grace_ms: u64,
    /// How long a cancelled worker gets to acknowledge before being killed.
    pub cancel_grace_ms: u64,
    /// Respawn each worker between tests.
    pub restart_worker: bool,
    /// Crash restarts allowed per worker slot.
    pub worker_restart_limit: u32,
    pub debug: bool,
    pub debug_port_range: [u16; 2],
    pub store_root: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    /// Script engine the workers evaluate test modules with.
    pub engine: String,
    /// Plugin names recorded for host embeddings; the core does not load them.
    pub plugins: Vec<String>,
    pub store_caps: StoreCaps,
    /// Environment parameters forwarded to every test.
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub env_parameters: serde_json::Value,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tests: None,
            worker_limit: default_worker_limit(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            bail: false,
            test_timeout_ms: default_test_timeout_ms(),
            run_timeout_ms: None,
            shutdown_grace_ms: default_shutdown_grace_ms(),
            cancel_grace_ms: default_cancel_grace_ms(),
            restart_worker: false,
            worker_restart_limit: default_worker_restart_limit(),
            debug: false,
            debug_port_range: default_debug_port_range(),
            store_root: None,
            log_dir: None,
            engine: default_engine(),
            plugins: Vec::new(),
            store_caps: StoreCaps::default(),
            env_parameters: serde_json::Value::Null,
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Partial configuration layered over a base [`RunConfig`]. Used for the
/// environment overlay file and for CLI flag overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfigOverlay {
    pub tests: Option<String>,
    pub worker_limit: Option<WorkerLimit>,
    pub retry_count: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub bail: Option<bool>,
    pub test_timeout_ms: Option<u64>,
    pub run_timeout_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
    pub cancel_grace_ms: Option<u64>,
    pub restart_worker: Option<bool>,
    pub worker_restart_limit: Option<u32>,
    pub debug: Option<bool>,
    pub debug_port_range: Option<[u16; 2]>,
    pub store_root: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub engine: Option<String>,
    pub plugins: Option<Vec<String>>,
    pub store_caps: Option<StoreCaps>,
    pub env_parameters: Option<serde_json::Value>,
}

impl RunConfigOverlay {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply every set field onto `config`.
    pub fn apply(self, config: &mut RunConfig) {
        // Options that stay optional on the target keep their overlay value.
        if let Some(tests) = self.tests {
            config.tests = Some(tests);
        }
        if let Some(store_root) = self.store_root {
            config.store_root = Some(store_root);
        }
        if let Some(log_dir) = self.log_dir {
            config.log_dir = Some(log_dir);
        }
        if let Some(run_timeout_ms) = self.run_timeout_ms {
            config.run_timeout_ms = Some(run_timeout_ms);
        }
        if let Some(env_parameters) = self.env_parameters {
            config.env_parameters = env_parameters;
        }
        if let Some(worker_limit) = self.worker_limit {
            config.worker_limit = worker_limit;
        }
        if let Some(retry_count) = self.retry_count {
            config.retry_count = retry_count;
        }
        if let Some(retry_delay_ms) = self.retry_delay_ms {
            config.retry_delay_ms = retry_delay_ms;
        }
        if let Some(bail) = self.bail {
            config.bail = bail;
        }
        if let Some(test_timeout_ms) = self.test_timeout_ms {
            config.test_timeout_ms = test_timeout_ms;
        }
        if let Some(shutdown_grace_ms) = self.shutdown_grace_ms {
            config.shutdown_grace_ms = shutdown_grace_ms;
        }
        if let Some(cancel_grace_ms) = self.cancel_grace_ms {
            config.cancel_grace_ms = cancel_grace_ms;
        }
        if let Some(restart_worker) = self.restart_worker {
            config.restart_worker = restart_worker;
        }
        if let Some(worker_restart_limit) = self.worker_restart_limit {
            config.worker_restart_limit = worker_restart_limit;
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }
        if let Some(debug_port_range) = self.debug_port_range {
            config.debug_port_range = debug_port_range;
        }
        if let Some(engine) = self.engine {
            config.engine = engine;
        }
        if let Some(plugins) = self.plugins {
            config.plugins = plugins;
        }
        if let Some(store_caps) = self.store_caps {
            config.store_caps = store_caps;
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
