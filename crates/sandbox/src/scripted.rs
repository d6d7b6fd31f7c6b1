// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Programmable engine for tests.
//!
//! Module bodies and entry runs are scripted per path, so sandbox and
//! worker behavior can be driven deterministically without a language
//! runtime. Unscripted modules behave like [`crate::NoOpEngine`].

use crate::engine::{EvaluatedModule, ModuleCtx, ModuleScope, ScriptEngine};
use crate::error::SandboxError;
use crate::sandbox::HostHandle;
use async_trait::async_trait;
use gantry_core::TestFailure;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One scripted step of a module body.
#[derive(Debug, Clone)]
pub enum ScriptOp {
    /// Set an export field.
    Export(String, serde_json::Value),
    /// Require a request and discard the result.
    Require(String),
    /// Require a request and export a snapshot of its exports under `key`.
    RequireInto(String, String),
}

/// Scripted behavior of one module body.
#[derive(Debug, Clone)]
pub enum ModuleScript {
    Ops(Vec<ScriptOp>),
    /// Evaluation throws.
    Fail(String),
}

/// Scripted behavior of an entry run.
#[derive(Debug, Clone)]
pub enum RunScript {
    Pass,
    Fail(String),
    /// Fail the first `n` runs of this path, then pass.
    FailTimes(u32, String),
    SleepThenPass(Duration),
    /// Never completes; only cancellation ends it.
    Hang,
}

#[derive(Default)]
struct ScriptedState {
    modules: HashMap<String, ModuleScript>,
    runs: HashMap<String, RunScript>,
    attempts: HashMap<String, u32>,
    evaluated: Vec<String>,
    ran: Vec<String>,
}

/// Engine with per-path scripted behavior and an evaluation log.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_module(&self, path: impl Into<String>, script: ModuleScript) -> &Self {
        self.state.lock().modules.insert(path.into(), script);
        self
    }

    pub fn script_run(&self, path: impl Into<String>, script: RunScript) -> &Self {
        self.state.lock().runs.insert(path.into(), script);
        self
    }

    /// Paths evaluated, in evaluation order.
    pub fn evaluated(&self) -> Vec<String> {
        self.state.lock().evaluated.clone()
    }

    /// Entries run, in order.
    pub fn ran(&self) -> Vec<String> {
        self.state.lock().ran.clone()
    }
}

#[async_trait]
impl ScriptEngine for ScriptedEngine {
    fn evaluate(
        &self,
        module: &ModuleCtx<'_>,
        scope: &mut dyn ModuleScope,
    ) -> Result<(), SandboxError> {
        let script = {
            let mut state = self.state.lock();
            state.evaluated.push(module.path.to_string());
            state.modules.get(module.path).cloned()
        };

        match script {
            None => {
                for request in scope.requests() {
                    scope.require(&request)?;
                }
                Ok(())
            }
            Some(ModuleScript::Fail(message)) => Err(SandboxError::TestFailed(message)),
            Some(ModuleScript::Ops(ops)) => {
                for op in ops {
                    match op {
                        ScriptOp::Export(key, value) => scope.exports().set(key, value),
                        ScriptOp::Require(request) => {
                            scope.require(&request)?;
                        }
                        ScriptOp::RequireInto(key, request) => {
                            let exports = scope.require(&request)?;
                            scope.exports().set(key, exports.snapshot());
                        }
                    }
                }
                Ok(())
            }
        }
    }

    async fn run_entry(
        &self,
        entry: &EvaluatedModule,
        _host: &HostHandle,
    ) -> Result<(), TestFailure> {
        let script = {
            let mut state = self.state.lock();
            state.ran.push(entry.path.clone());
            let attempt = state.attempts.entry(entry.path.clone()).or_insert(0);
            *attempt += 1;
            let attempt = *attempt;
            match state.runs.get(&entry.path).cloned() {
                Some(RunScript::FailTimes(n, message)) if attempt <= n => {
                    Some(RunScript::Fail(message))
                }
                Some(RunScript::FailTimes(..)) => Some(RunScript::Pass),
                other => other,
            }
        };

        match script.unwrap_or(RunScript::Pass) {
            RunScript::Pass => Ok(()),
            RunScript::Fail(message) => {
                Err(TestFailure::error(message).at_path(entry.path.clone()))
            }
            // Resolved above.
            RunScript::FailTimes(_, message) => {
                Err(TestFailure::error(message).at_path(entry.path.clone()))
            }
            RunScript::SleepThenPass(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            RunScript::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}
